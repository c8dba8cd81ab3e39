//! # W5500 Driver
//!
//! A register-access driver for the WIZnet W5500 Ethernet offload chip. The
//! chip runs the TCP/IP stack itself; the driver only moves bytes in and out
//! of its registers and socket buffers through the [`ChipBus`] callbacks.
//!
//! Every SPI frame is `address (2 bytes) | control | data…`, bracketed by
//! `enter_critical, select … deselect, exit_critical`.

pub(crate) mod registers;
mod socket;

#[cfg(test)]
pub(crate) mod fake;

use core::net::Ipv4Addr;

use registers::{block, common, control, socket as sreg};

use crate::config::NetworkIdentity;
use crate::error::ChipError;
use crate::fmt::{debug, trace};
use crate::poll::spin_until;
use crate::spi::ChipBus;

pub use socket::W5500Socket;

/// Physical link state reported by the PHY.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkStatus {
    Up,
    Down,
}

/// The chip operations the link bring-up depends on.
pub trait LinkChip {
    type Error: core::fmt::Debug;

    /// Resets the chip and applies its static configuration.
    fn init(&mut self) -> Result<(), Self::Error>;

    /// Reads the physical link state.
    fn phy_link(&mut self) -> Result<LinkStatus, Self::Error>;

    /// Pushes the network identity into the chip.
    fn set_net_info(&mut self, identity: &NetworkIdentity);

    /// Programs the chip's source hardware address.
    fn set_mac(&mut self, mac: [u8; 6]);
}

impl<C: LinkChip + ?Sized> LinkChip for &mut C {
    type Error = C::Error;

    fn init(&mut self) -> Result<(), Self::Error> {
        (**self).init()
    }

    fn phy_link(&mut self) -> Result<LinkStatus, Self::Error> {
        (**self).phy_link()
    }

    fn set_net_info(&mut self, identity: &NetworkIdentity) {
        (**self).set_net_info(identity)
    }

    fn set_mac(&mut self, mac: [u8; 6]) {
        (**self).set_mac(mac)
    }
}

/// Per-socket buffer sizes in KB, applied by [`W5500::init`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct W5500Config {
    pub tx_buffer_kb: [u8; 8],
    pub rx_buffer_kb: [u8; 8],
}

impl W5500Config {
    /// 2 KB for every socket in both directions.
    pub const DEFAULT: Self = Self {
        tx_buffer_kb: [2; 8],
        rx_buffer_kb: [2; 8],
    };

    fn fits(sizes: &[u8; 8]) -> bool {
        sizes.iter().map(|kb| u16::from(*kb)).sum::<u16>() <= registers::BUFFER_MEMORY_KB
    }
}

impl Default for W5500Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// W5500 driver owning its byte transport.
pub struct W5500<B> {
    bus: B,
    config: W5500Config,
    net_info: Option<NetworkIdentity>,
}

impl<B: ChipBus> W5500<B> {
    pub fn new(bus: B, config: W5500Config) -> Self {
        Self {
            bus,
            config,
            net_info: None,
        }
    }

    pub fn release(self) -> B {
        self.bus
    }

    #[cfg(test)]
    pub(crate) fn bus_mut(&mut self) -> &mut B {
        &mut self.bus
    }

    /// Reads `buf.len()` bytes starting at `addr` in `block`.
    pub fn read(&mut self, block: u8, addr: u16, buf: &mut [u8]) {
        let [hi, lo] = addr.to_be_bytes();
        self.bus.enter_critical();
        self.bus.select();
        self.bus.write_burst(&[hi, lo, control(block, false)]);
        self.bus.read_burst(buf);
        self.bus.deselect();
        self.bus.exit_critical();
    }

    /// Writes `data` starting at `addr` in `block`.
    pub fn write(&mut self, block: u8, addr: u16, data: &[u8]) {
        let [hi, lo] = addr.to_be_bytes();
        self.bus.enter_critical();
        self.bus.select();
        self.bus.write_burst(&[hi, lo, control(block, true)]);
        self.bus.write_burst(data);
        self.bus.deselect();
        self.bus.exit_critical();
    }

    fn read_u8(&mut self, block: u8, addr: u16) -> u8 {
        let mut byte = [0];
        self.read(block, addr, &mut byte);
        byte[0]
    }

    fn write_u8(&mut self, block: u8, addr: u16, value: u8) {
        self.write(block, addr, &[value]);
    }

    fn read_u16(&mut self, block: u8, addr: u16) -> u16 {
        let mut bytes = [0; 2];
        self.read(block, addr, &mut bytes);
        u16::from_be_bytes(bytes)
    }

    fn write_u16(&mut self, block: u8, addr: u16, value: u16) {
        self.write(block, addr, &value.to_be_bytes());
    }

    /// Reads a 16-bit counter the chip may update mid-read until two
    /// consecutive reads agree.
    fn read_u16_stable(&mut self, block: u8, addr: u16) -> u16 {
        let mut previous = self.read_u16(block, addr);
        loop {
            let current = self.read_u16(block, addr);
            if current == previous {
                return current;
            }
            previous = current;
        }
    }

    pub fn version(&mut self) -> u8 {
        self.read_u8(block::COMMON, common::VERSIONR)
    }

    /// The identity last pushed with [`LinkChip::set_net_info`].
    pub fn net_info(&self) -> Option<&NetworkIdentity> {
        self.net_info.as_ref()
    }

    // --- Sockets ---

    fn check_socket(sn: u8) -> Result<(), ChipError> {
        if sn < registers::SOCKETS {
            Ok(())
        } else {
            Err(ChipError::InvalidSocket(sn))
        }
    }

    /// Issues a socket command and waits for the chip to accept it.
    fn command(&mut self, sn: u8, cmd: u8) {
        self.write_u8(block::socket(sn), sreg::CR, cmd);
        spin_until(|| self.read_u8(block::socket(sn), sreg::CR) == 0);
    }

    pub fn socket_status(&mut self, sn: u8) -> Result<u8, ChipError> {
        Self::check_socket(sn)?;
        Ok(self.read_u8(block::socket(sn), sreg::SR))
    }

    /// Reads the socket interrupt flags and clears those that are set.
    pub fn take_socket_interrupts(&mut self, sn: u8) -> Result<u8, ChipError> {
        Self::check_socket(sn)?;
        let flags = self.read_u8(block::socket(sn), sreg::IR);
        if flags != 0 {
            self.write_u8(block::socket(sn), sreg::IR, flags);
        }
        Ok(flags)
    }

    /// Closes `sn` and reopens it as a TCP socket bound to `local_port`.
    pub fn socket_open_tcp(&mut self, sn: u8, local_port: u16) -> Result<(), ChipError> {
        self.socket_close(sn)?;
        self.write_u8(block::socket(sn), sreg::MR, sreg::MR_TCP);
        self.write_u16(block::socket(sn), sreg::PORT, local_port);
        self.command(sn, sreg::CMD_OPEN);

        let status = self.read_u8(block::socket(sn), sreg::SR);
        if status != sreg::SOCK_INIT {
            return Err(ChipError::SocketState(status));
        }
        debug!("socket {} open on port {}", sn, local_port);
        Ok(())
    }

    /// Starts a TCP connect; completion is reported through the socket
    /// interrupt flags (see [`W5500::take_socket_interrupts`]).
    pub fn socket_connect_start(&mut self, sn: u8, host: Ipv4Addr, port: u16) -> Result<(), ChipError> {
        Self::check_socket(sn)?;
        let status = self.read_u8(block::socket(sn), sreg::SR);
        if status != sreg::SOCK_INIT {
            return Err(ChipError::SocketState(status));
        }
        self.write(block::socket(sn), sreg::DIPR, &host.octets());
        self.write_u16(block::socket(sn), sreg::DPORT, port);
        self.command(sn, sreg::CMD_CONNECT);
        Ok(())
    }

    /// Copies as much of `data` as fits into the TX buffer and issues SEND.
    ///
    /// Returns the number of bytes queued; `0` means the buffer is full.
    pub fn socket_write(&mut self, sn: u8, data: &[u8]) -> Result<usize, ChipError> {
        Self::check_socket(sn)?;
        match self.read_u8(block::socket(sn), sreg::SR) {
            sreg::SOCK_ESTABLISHED | sreg::SOCK_CLOSE_WAIT => {}
            _ => return Err(ChipError::Closed),
        }

        let free = usize::from(self.read_u16_stable(block::socket(sn), sreg::TX_FSR));
        let len = data.len().min(free);
        if len == 0 {
            return Ok(0);
        }

        // The chip wraps the pointer inside the socket's buffer by itself.
        let ptr = self.read_u16(block::socket(sn), sreg::TX_WR);
        self.write(block::socket_tx(sn), ptr, &data[..len]);
        self.write_u16(block::socket(sn), sreg::TX_WR, ptr.wrapping_add(len as u16));
        self.command(sn, sreg::CMD_SEND);
        trace!("socket {} queued {} bytes", sn, len);
        Ok(len)
    }

    /// Bytes waiting in the RX buffer.
    pub fn socket_available(&mut self, sn: u8) -> Result<usize, ChipError> {
        Self::check_socket(sn)?;
        Ok(usize::from(self.read_u16_stable(block::socket(sn), sreg::RX_RSR)))
    }

    /// Moves up to `buf.len()` received bytes out of the RX buffer.
    ///
    /// Returns `0` when nothing is waiting on an open connection and
    /// [`ChipError::Closed`] when nothing is waiting and the peer is gone.
    pub fn socket_read(&mut self, sn: u8, buf: &mut [u8]) -> Result<usize, ChipError> {
        let available = self.socket_available(sn)?;
        if available == 0 {
            return match self.read_u8(block::socket(sn), sreg::SR) {
                sreg::SOCK_ESTABLISHED => Ok(0),
                _ => Err(ChipError::Closed),
            };
        }

        let len = available.min(buf.len());
        let ptr = self.read_u16(block::socket(sn), sreg::RX_RD);
        self.read(block::socket_rx(sn), ptr, &mut buf[..len]);
        self.write_u16(block::socket(sn), sreg::RX_RD, ptr.wrapping_add(len as u16));
        self.command(sn, sreg::CMD_RECV);
        trace!("socket {} read {} bytes", sn, len);
        Ok(len)
    }

    /// Sends FIN to the peer.
    pub fn socket_disconnect(&mut self, sn: u8) -> Result<(), ChipError> {
        Self::check_socket(sn)?;
        self.command(sn, sreg::CMD_DISCON);
        Ok(())
    }

    /// Closes the socket immediately and clears its interrupt flags.
    pub fn socket_close(&mut self, sn: u8) -> Result<(), ChipError> {
        Self::check_socket(sn)?;
        self.command(sn, sreg::CMD_CLOSE);
        self.write_u8(block::socket(sn), sreg::IR, 0xFF);
        spin_until(|| self.read_u8(block::socket(sn), sreg::SR) == sreg::SOCK_CLOSED);
        Ok(())
    }
}

impl<B: ChipBus> LinkChip for W5500<B> {
    type Error = ChipError;

    /// Soft-resets the chip and programs the socket buffer sizes.
    fn init(&mut self) -> Result<(), ChipError> {
        if !W5500Config::fits(&self.config.tx_buffer_kb) || !W5500Config::fits(&self.config.rx_buffer_kb) {
            return Err(ChipError::BufferSizeOverflow);
        }

        self.write_u8(block::COMMON, common::MR, common::MR_RST);
        spin_until(|| self.read_u8(block::COMMON, common::MR) & common::MR_RST == 0);

        let config = self.config;
        for sn in 0..registers::SOCKETS {
            self.write_u8(block::socket(sn), sreg::TXBUF_SIZE, config.tx_buffer_kb[usize::from(sn)]);
            self.write_u8(block::socket(sn), sreg::RXBUF_SIZE, config.rx_buffer_kb[usize::from(sn)]);
        }
        Ok(())
    }

    fn phy_link(&mut self) -> Result<LinkStatus, ChipError> {
        if self.version() != common::CHIP_VERSION {
            return Err(ChipError::NotResponding);
        }
        if self.read_u8(block::COMMON, common::PHYCFGR) & common::PHY_LNK != 0 {
            Ok(LinkStatus::Up)
        } else {
            Ok(LinkStatus::Down)
        }
    }

    fn set_net_info(&mut self, identity: &NetworkIdentity) {
        self.write(block::COMMON, common::SHAR, &identity.mac);
        self.write(block::COMMON, common::GAR, &identity.gateway.octets());
        self.write(block::COMMON, common::SUBR, &identity.subnet.octets());
        self.write(block::COMMON, common::SIPR, &identity.ip.octets());
        self.net_info = Some(*identity);
    }

    fn set_mac(&mut self, mac: [u8; 6]) {
        self.write(block::COMMON, common::SHAR, &mac);
    }
}
