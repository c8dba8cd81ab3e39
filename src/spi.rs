//! # SPI Byte Transport
//!
//! The W5500 driver talks to the chip exclusively through the [`ChipBus`]
//! callbacks: a critical section around each register frame, chip-select
//! framing, and blocking single-byte reads and writes.
//!
//! Two implementations are provided:
//!
//! - [`SpiByteTransport`] drives a memory-mapped SPI peripheral directly by
//!   busy-waiting on its status register, the way the chip vendor's reference
//!   firmware does.
//! - [`HalSpiTransport`] sits on top of any `embedded-hal` 1.0 [`SpiBus`].
//!
//! The byte primitives have no timeout: a stalled peripheral hangs the caller.

use embedded_hal::digital::OutputPin;
use embedded_hal::spi::SpiBus;

use crate::fmt::warn;
use crate::poll::spin_until;

/// Byte clocked out when the transport only wants to receive.
pub const DUMMY_BYTE: u8 = 0xFF;

/// The transport contract the chip driver calls back into.
///
/// The driver brackets every register frame with
/// `enter_critical, select, … , deselect, exit_critical`.
pub trait ChipBus {
    /// Blocks preemption by code sharing the bus.
    fn enter_critical(&mut self);
    /// Undoes one [`ChipBus::enter_critical`].
    fn exit_critical(&mut self);
    /// Asserts chip-select. Idempotent.
    fn select(&mut self);
    /// Releases chip-select. Idempotent.
    fn deselect(&mut self);
    /// Clocks one dummy byte out and returns the byte clocked in.
    fn read_byte(&mut self) -> u8;
    /// Clocks one byte out, discarding the byte clocked in.
    fn write_byte(&mut self, byte: u8);

    /// Reads `buf.len()` bytes.
    fn read_burst(&mut self, buf: &mut [u8]) {
        for byte in buf {
            *byte = self.read_byte();
        }
    }

    /// Writes all of `data`.
    fn write_burst(&mut self, data: &[u8]) {
        for byte in data {
            self.write_byte(*byte);
        }
    }
}

impl<B: ChipBus + ?Sized> ChipBus for &mut B {
    fn enter_critical(&mut self) {
        (**self).enter_critical()
    }

    fn exit_critical(&mut self) {
        (**self).exit_critical()
    }

    fn select(&mut self) {
        (**self).select()
    }

    fn deselect(&mut self) {
        (**self).deselect()
    }

    fn read_byte(&mut self) -> u8 {
        (**self).read_byte()
    }

    fn write_byte(&mut self, byte: u8) {
        (**self).write_byte(byte)
    }

    fn read_burst(&mut self, buf: &mut [u8]) {
        (**self).read_burst(buf)
    }

    fn write_burst(&mut self, data: &[u8]) {
        (**self).write_burst(data)
    }
}

/// A counting guard over the global `critical-section`.
///
/// Only the outermost `enter` acquires the critical section and only the
/// matching outermost `exit` releases it.
#[derive(Default)]
pub struct CriticalGuard {
    depth: u8,
    restore: Option<critical_section::RestoreState>,
}

impl CriticalGuard {
    pub const fn new() -> Self {
        Self {
            depth: 0,
            restore: None,
        }
    }

    pub fn enter(&mut self) {
        if self.depth == 0 {
            // SAFETY: released exactly once, by the `exit` that brings the
            // depth back to zero.
            self.restore = Some(unsafe { critical_section::acquire() });
        }
        self.depth = self.depth.saturating_add(1);
    }

    pub fn exit(&mut self) {
        match self.depth {
            0 => warn!("critical section exit without matching enter"),
            1 => {
                self.depth = 0;
                if let Some(restore) = self.restore.take() {
                    // SAFETY: `restore` came from the outermost `enter`.
                    unsafe { critical_section::release(restore) };
                }
            }
            _ => self.depth -= 1,
        }
    }

    /// Current nesting depth.
    pub fn depth(&self) -> u8 {
        self.depth
    }
}

impl Drop for CriticalGuard {
    fn drop(&mut self) {
        if let Some(restore) = self.restore.take() {
            warn!("critical section still held at depth {} on drop", self.depth);
            // SAFETY: `restore` came from the outermost `enter` and was not released.
            unsafe { critical_section::release(restore) };
        }
    }
}

/// Status register bits of an STM32-style SPI peripheral.
pub mod status {
    /// Receive buffer not empty.
    pub const RXNE: u16 = 0x0001;
    /// Transmit buffer empty.
    pub const TXE: u16 = 0x0002;
}

/// Register-level access to a SPI peripheral configured as master.
pub trait SpiRegisters {
    /// Reads the status register (see [`status`]).
    fn status(&self) -> u16;
    /// Writes the data register, starting a transfer.
    fn write_data(&mut self, byte: u8);
    /// Reads the data register, clearing `RXNE`.
    fn read_data(&mut self) -> u8;
}

/// Byte transport busy-waiting on the status register of a raw SPI peripheral.
pub struct SpiByteTransport<P, CS> {
    spi: P,
    cs: CS,
    guard: CriticalGuard,
}

impl<P: SpiRegisters, CS: OutputPin> SpiByteTransport<P, CS> {
    /// Takes ownership of the peripheral and the chip-select line, leaving the
    /// chip deselected.
    pub fn new(spi: P, mut cs: CS) -> Self {
        if cs.set_high().is_err() {
            warn!("chip select release failed");
        }
        Self {
            spi,
            cs,
            guard: CriticalGuard::new(),
        }
    }

    /// Critical section nesting depth, zero between frames.
    pub fn critical_depth(&self) -> u8 {
        self.guard.depth()
    }

    pub fn release(self) -> (P, CS) {
        (self.spi, self.cs)
    }

    fn transfer(&mut self, byte: u8) -> u8 {
        spin_until(|| self.spi.status() & status::TXE != 0);
        self.spi.write_data(byte);
        spin_until(|| self.spi.status() & status::RXNE != 0);
        self.spi.read_data()
    }
}

impl<P: SpiRegisters, CS: OutputPin> ChipBus for SpiByteTransport<P, CS> {
    fn enter_critical(&mut self) {
        self.guard.enter();
    }

    fn exit_critical(&mut self) {
        self.guard.exit();
    }

    fn select(&mut self) {
        if self.cs.set_low().is_err() {
            warn!("chip select assert failed");
        }
    }

    fn deselect(&mut self) {
        if self.cs.set_high().is_err() {
            warn!("chip select release failed");
        }
    }

    fn read_byte(&mut self) -> u8 {
        self.transfer(DUMMY_BYTE)
    }

    fn write_byte(&mut self, byte: u8) {
        let _ = self.transfer(byte);
    }
}

/// Byte transport over an `embedded-hal` SPI bus and a chip-select pin.
pub struct HalSpiTransport<SPI, CS> {
    spi: SPI,
    cs: CS,
    guard: CriticalGuard,
}

impl<SPI: SpiBus, CS: OutputPin> HalSpiTransport<SPI, CS> {
    pub fn new(spi: SPI, mut cs: CS) -> Self {
        if cs.set_high().is_err() {
            warn!("chip select release failed");
        }
        Self {
            spi,
            cs,
            guard: CriticalGuard::new(),
        }
    }

    pub fn release(self) -> (SPI, CS) {
        (self.spi, self.cs)
    }
}

impl<SPI: SpiBus, CS: OutputPin> ChipBus for HalSpiTransport<SPI, CS> {
    fn enter_critical(&mut self) {
        self.guard.enter();
    }

    fn exit_critical(&mut self) {
        self.guard.exit();
    }

    fn select(&mut self) {
        if self.cs.set_low().is_err() {
            warn!("chip select assert failed");
        }
    }

    fn deselect(&mut self) {
        if self.spi.flush().is_err() {
            warn!("spi flush failed");
        }
        if self.cs.set_high().is_err() {
            warn!("chip select release failed");
        }
    }

    fn read_byte(&mut self) -> u8 {
        let mut byte = [DUMMY_BYTE];
        if self.spi.transfer_in_place(&mut byte).is_err() {
            warn!("spi read failed");
        }
        byte[0]
    }

    fn write_byte(&mut self, byte: u8) {
        self.write_burst(&[byte]);
    }

    fn read_burst(&mut self, buf: &mut [u8]) {
        buf.fill(DUMMY_BYTE);
        if self.spi.transfer_in_place(buf).is_err() {
            warn!("spi burst read failed");
        }
    }

    fn write_burst(&mut self, data: &[u8]) {
        if self.spi.write(data).is_err() {
            warn!("spi write failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::RefCell;
    use core::convert::Infallible;
    use std::collections::VecDeque;
    use std::vec::Vec;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Event {
        Status(u16),
        Write(u8),
        Read(u8),
    }

    /// A SPI peripheral whose status register walks through a script.
    struct ScriptedSpi {
        statuses: RefCell<VecDeque<u16>>,
        events: RefCell<Vec<Event>>,
        incoming: VecDeque<u8>,
    }

    impl ScriptedSpi {
        fn new(statuses: &[u16], incoming: &[u8]) -> Self {
            Self {
                statuses: RefCell::new(statuses.iter().copied().collect()),
                events: RefCell::new(Vec::new()),
                incoming: incoming.iter().copied().collect(),
            }
        }
    }

    impl SpiRegisters for ScriptedSpi {
        fn status(&self) -> u16 {
            let value = self
                .statuses
                .borrow_mut()
                .pop_front()
                .unwrap_or(status::TXE | status::RXNE);
            self.events.borrow_mut().push(Event::Status(value));
            value
        }

        fn write_data(&mut self, byte: u8) {
            self.events.borrow_mut().push(Event::Write(byte));
        }

        fn read_data(&mut self) -> u8 {
            let byte = self.incoming.pop_front().unwrap_or(0);
            self.events.borrow_mut().push(Event::Read(byte));
            byte
        }
    }

    #[derive(Default)]
    struct Pin {
        levels: Vec<bool>,
    }

    impl embedded_hal::digital::ErrorType for Pin {
        type Error = Infallible;
    }

    impl OutputPin for Pin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            self.levels.push(false);
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            self.levels.push(true);
            Ok(())
        }
    }

    #[test]
    fn read_waits_for_each_ready_flag() {
        const IDLE: u16 = 0;
        let spi = ScriptedSpi::new(
            &[IDLE, IDLE, status::TXE, status::TXE, status::TXE, status::RXNE],
            &[0xA5],
        );
        let mut transport = SpiByteTransport::new(spi, Pin::default());
        assert_eq!(transport.read_byte(), 0xA5);

        let (spi, _) = transport.release();
        let events = spi.events.into_inner();
        assert_eq!(
            events,
            [
                Event::Status(IDLE),
                Event::Status(IDLE),
                Event::Status(status::TXE),
                Event::Write(DUMMY_BYTE),
                Event::Status(status::TXE),
                Event::Status(status::TXE),
                Event::Status(status::RXNE),
                Event::Read(0xA5),
            ]
        );
    }

    #[test]
    fn write_drains_the_received_byte() {
        let spi = ScriptedSpi::new(&[status::TXE, 0, status::RXNE], &[0x11]);
        let mut transport = SpiByteTransport::new(spi, Pin::default());
        transport.write_byte(0x42);

        let (spi, _) = transport.release();
        let events = spi.events.into_inner();
        assert_eq!(events[1], Event::Write(0x42));
        assert_eq!(events.last(), Some(&Event::Read(0x11)));
        assert!(spi.incoming.is_empty());
    }

    #[test]
    fn chip_select_is_active_low() {
        let spi = ScriptedSpi::new(&[], &[]);
        let mut transport = SpiByteTransport::new(spi, Pin::default());
        transport.select();
        transport.select();
        transport.deselect();
        let (_, pin) = transport.release();
        assert_eq!(pin.levels, [true, false, false, true]);
    }

    #[test]
    fn critical_guard_counts_nesting() {
        let spi = ScriptedSpi::new(&[], &[]);
        let mut transport = SpiByteTransport::new(spi, Pin::default());
        transport.enter_critical();
        transport.enter_critical();
        assert_eq!(transport.critical_depth(), 2);
        transport.exit_critical();
        assert_eq!(transport.critical_depth(), 1);
        transport.exit_critical();
        assert_eq!(transport.critical_depth(), 0);
        // An unbalanced exit is ignored.
        transport.exit_critical();
        assert_eq!(transport.critical_depth(), 0);
    }

    #[test]
    fn dropping_a_held_guard_releases_the_critical_section() {
        std::thread::spawn(|| {
            let mut guard = CriticalGuard::new();
            guard.enter();
            guard.enter();
            drop(guard);
        })
        .join()
        .unwrap();

        let (tx, rx) = std::sync::mpsc::channel();
        std::thread::spawn(move || critical_section::with(|_| tx.send(()).unwrap()));
        assert!(rx.recv_timeout(std::time::Duration::from_secs(1)).is_ok());
    }

    /// A chip-select line whose driver always fails.
    struct BrokenPin;

    impl embedded_hal::digital::ErrorType for BrokenPin {
        type Error = embedded_hal::digital::ErrorKind;
    }

    impl OutputPin for BrokenPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            Err(embedded_hal::digital::ErrorKind::Other)
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            Err(embedded_hal::digital::ErrorKind::Other)
        }
    }

    /// An `embedded-hal` bus that answers reads from a queue.
    #[derive(Default)]
    struct RecordingBus {
        incoming: VecDeque<u8>,
        clocked_out: Vec<u8>,
        flushes: usize,
    }

    impl embedded_hal::spi::ErrorType for RecordingBus {
        type Error = Infallible;
    }

    impl SpiBus for RecordingBus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            for word in words {
                *word = self.incoming.pop_front().unwrap_or(0);
            }
            Ok(())
        }

        fn write(&mut self, words: &[u8]) -> Result<(), Infallible> {
            self.clocked_out.extend_from_slice(words);
            Ok(())
        }

        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), Infallible> {
            self.clocked_out.extend_from_slice(write);
            self.read(read)
        }

        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), Infallible> {
            self.clocked_out.extend_from_slice(words);
            self.read(words)
        }

        fn flush(&mut self) -> Result<(), Infallible> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn hal_transport_clocks_dummy_bytes_for_reads() {
        let bus = RecordingBus {
            incoming: [0x04, 0x01, 0x02].into_iter().collect(),
            ..RecordingBus::default()
        };
        let mut transport = HalSpiTransport::new(bus, Pin::default());
        transport.select();
        transport.write_burst(&[0x00, 0x39, 0x00]);
        assert_eq!(transport.read_byte(), 0x04);
        let mut buf = [0u8; 2];
        transport.read_burst(&mut buf);
        transport.deselect();

        assert_eq!(buf, [0x01, 0x02]);
        let (bus, pin) = transport.release();
        assert_eq!(bus.clocked_out, [0x00, 0x39, 0x00, DUMMY_BYTE, DUMMY_BYTE, DUMMY_BYTE]);
        assert_eq!(bus.flushes, 1);
        assert_eq!(pin.levels, [true, false, true]);
    }

    #[test]
    fn pin_failures_do_not_interrupt_the_frame() {
        let bus = RecordingBus {
            incoming: [0x07].into_iter().collect(),
            ..RecordingBus::default()
        };
        let mut transport = HalSpiTransport::new(bus, BrokenPin);
        transport.select();
        assert_eq!(transport.read_byte(), 0x07);
        transport.deselect();

        let (bus, _) = transport.release();
        assert_eq!(bus.clocked_out, [DUMMY_BYTE]);
        assert_eq!(bus.flushes, 1);
    }
}
