//! # Link Bring-Up
//!
//! One-shot sequence run on the boot task before any network traffic:
//! initialize the chip, wait for the physical link, then push the static
//! network identity.
//!
//! ```text
//! Uninitialized -> ChipReset -> AwaitingLink -> Configured
//! ```
//!
//! Under [`ErrorPolicy::Continue`] a failed chip initialization is reported
//! on the console and the sequence carries on. The link wait is unbounded
//! unless [`LinkConfig::max_polls`] is set: the device cannot do anything
//! useful without a link.

use embedded_hal::delay::DelayNs;
use embedded_io::Write;

use crate::config::{ErrorPolicy, NetworkIdentity};
use crate::error::LinkError;
use crate::fmt::{Debug2Format, error, info, warn};
use crate::poll::poll_until;
use crate::w5500::{LinkChip, LinkStatus};

/// Where a bring-up currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkState {
    Uninitialized,
    ChipReset,
    AwaitingLink,
    Configured,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkConfig {
    /// Pause between two link status polls, `0` for a tight loop.
    pub poll_interval_us: u32,
    /// Give up after this many polls. `None` waits forever.
    pub max_polls: Option<u32>,
    pub policy: ErrorPolicy,
}

impl LinkConfig {
    pub const DEFAULT: Self = Self {
        poll_interval_us: 0,
        max_polls: None,
        policy: ErrorPolicy::Continue,
    };
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Outcome of a completed bring-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkReport {
    /// Whether the chip accepted its initialization.
    pub chip_initialized: bool,
    /// Link polls that did not report "up".
    pub failed_polls: u32,
}

pub struct LinkBringUp<'a> {
    identity: &'a NetworkIdentity,
    config: LinkConfig,
    state: LinkState,
}

impl<'a> LinkBringUp<'a> {
    pub fn new(identity: &'a NetworkIdentity, config: LinkConfig) -> Self {
        Self {
            identity,
            config,
            state: LinkState::Uninitialized,
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    /// Runs the sequence to completion.
    ///
    /// Console write failures are ignored.
    pub fn run<C, W, D>(
        &mut self,
        chip: &mut C,
        console: &mut W,
        delay: &mut D,
    ) -> Result<LinkReport, LinkError<C::Error>>
    where
        C: LinkChip,
        W: Write,
        D: DelayNs,
    {
        self.state = LinkState::ChipReset;
        let chip_initialized = match chip.init() {
            Ok(()) => true,
            Err(e) => {
                error!("chip init failed: {:?}", Debug2Format(&e));
                let _ = console.write_all(b"WIZCHIP Initialized fail.\r\n");
                if self.config.policy == ErrorPolicy::Strict {
                    return Err(LinkError::ChipInit(e));
                }
                false
            }
        };

        self.state = LinkState::AwaitingLink;
        let mut failed_polls = 0;
        let polled = poll_until(
            delay,
            self.config.poll_interval_us,
            self.config.max_polls,
            |_| match chip.phy_link() {
                Ok(LinkStatus::Up) => Some(()),
                Ok(LinkStatus::Down) => {
                    failed_polls += 1;
                    let _ = console.write_all(b"PHY Link down.\r\n");
                    None
                }
                Err(e) => {
                    failed_polls += 1;
                    warn!("phy link status unreadable: {:?}", Debug2Format(&e));
                    let _ = console.write_all(b"Unknown PHY Link status.\r\n");
                    None
                }
            },
        );
        if let Err(polls) = polled {
            error!("link still down after {} polls", polls);
            return Err(LinkError::LinkTimeout { polls });
        }

        chip.set_net_info(self.identity);
        chip.set_mac(self.identity.mac);
        self.state = LinkState::Configured;
        info!("link up after {} failed polls", failed_polls);

        Ok(LinkReport {
            chip_initialized,
            failed_polls,
        })
    }
}
