//! Hardware readiness polling.
//!
//! The SPI transport and the link bring-up both wait on hardware flags. The
//! readiness check and the pause between checks are injected so the waits can
//! be driven deterministically by fakes.

use embedded_hal::delay::DelayNs;

/// Busy-waits until `ready` returns `true`. There is no timeout.
#[inline]
pub fn spin_until(mut ready: impl FnMut() -> bool) {
    while !ready() {
        core::hint::spin_loop();
    }
}

/// Calls `attempt` until it produces a value.
///
/// `attempt` receives the zero-based attempt number. Between attempts the
/// caller's `delay` is asked to wait `interval_us` (skipped when it is zero).
/// With `max_attempts` set, gives up after that many attempts and returns the
/// number made.
pub fn poll_until<T, D: DelayNs>(
    delay: &mut D,
    interval_us: u32,
    max_attempts: Option<u32>,
    mut attempt: impl FnMut(u32) -> Option<T>,
) -> Result<T, u32> {
    let mut attempts: u32 = 0;
    loop {
        if let Some(value) = attempt(attempts) {
            return Ok(value);
        }
        attempts = attempts.saturating_add(1);
        if max_attempts.is_some_and(|max| attempts >= max) {
            return Err(attempts);
        }
        if interval_us > 0 {
            delay.delay_us(interval_us);
        }
    }
}

/// A delay that returns immediately, for tight polling loops.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct CountingDelay {
        waited_us: u32,
    }

    impl DelayNs for CountingDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.waited_us += ns / 1000;
        }
    }

    #[test]
    fn spin_until_checks_until_ready() {
        let mut checks = 0;
        spin_until(|| {
            checks += 1;
            checks == 4
        });
        assert_eq!(checks, 4);
    }

    #[test]
    fn poll_until_waits_between_attempts() {
        let mut delay = CountingDelay::default();
        let found = poll_until(&mut delay, 100, None, |n| (n == 3).then_some(n));
        assert_eq!(found, Ok(3));
        assert_eq!(delay.waited_us, 300);
    }

    #[test]
    fn poll_until_gives_up_after_budget() {
        let found: Result<(), u32> = poll_until(&mut NoDelay, 0, Some(5), |_| None);
        assert_eq!(found, Err(5));
    }
}
