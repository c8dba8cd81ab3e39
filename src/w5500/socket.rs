//! A W5500 hardware socket as an MQTT transport.

use core::net::Ipv4Addr;

use embassy_futures::yield_now;

use super::W5500;
use super::registers::socket as sreg;
use crate::error::ChipError;
use crate::fmt::{debug, warn};
use crate::spi::ChipBus;
use crate::transport::{MqttTransport, NetworkConnect};

/// One TCP socket slot of a [`W5500`], owning the chip.
///
/// The chip's register polling never blocks the executor: between two polls
/// the socket yields to other tasks.
pub struct W5500Socket<B> {
    chip: W5500<B>,
    sn: u8,
    local_port: u16,
}

impl<B: ChipBus> W5500Socket<B> {
    pub fn new(chip: W5500<B>, sn: u8, local_port: u16) -> Self {
        Self {
            chip,
            sn,
            local_port,
        }
    }

    pub fn chip(&mut self) -> &mut W5500<B> {
        &mut self.chip
    }

    pub fn into_chip(self) -> W5500<B> {
        self.chip
    }

    /// Waits until one of `done` is raised, failing on a chip timeout.
    async fn wait_for(&mut self, done: u8) -> Result<(), ChipError> {
        loop {
            let flags = self.chip.take_socket_interrupts(self.sn)?;
            if flags & done != 0 {
                return Ok(());
            }
            if flags & sreg::IR_TIMEOUT != 0 {
                return Err(ChipError::Timeout);
            }
            if self.chip.socket_status(self.sn)? == sreg::SOCK_CLOSED {
                return Err(ChipError::Closed);
            }
            yield_now().await;
        }
    }
}

impl<B: ChipBus> MqttTransport for W5500Socket<B> {
    type Error = ChipError;

    async fn send(&mut self, buf: &[u8]) -> Result<(), ChipError> {
        let mut sent = 0;
        while sent < buf.len() {
            let queued = self.chip.socket_write(self.sn, &buf[sent..])?;
            if queued == 0 {
                yield_now().await;
                continue;
            }
            self.wait_for(sreg::IR_SENDOK).await?;
            sent += queued;
        }
        Ok(())
    }

    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, ChipError> {
        loop {
            let n = self.chip.socket_read(self.sn, buf)?;
            if n > 0 {
                return Ok(n);
            }
            yield_now().await;
        }
    }
}

impl<B: ChipBus> NetworkConnect for W5500Socket<B> {
    async fn connect(&mut self, host: Ipv4Addr, port: u16) -> Result<(), ChipError> {
        self.chip.socket_open_tcp(self.sn, self.local_port)?;
        self.chip.socket_connect_start(self.sn, host, port)?;
        match self.wait_for(sreg::IR_CON).await {
            Ok(()) => {
                debug!("socket {} connected", self.sn);
                Ok(())
            }
            Err(e) => {
                warn!("socket {} connect failed: {:?}", self.sn, e);
                let _ = self.chip.socket_close(self.sn);
                Err(e)
            }
        }
    }

    async fn close(&mut self) -> Result<(), ChipError> {
        if self.chip.socket_status(self.sn)? == sreg::SOCK_ESTABLISHED {
            self.chip.socket_disconnect(self.sn)?;
        }
        self.chip.socket_close(self.sn)
    }
}
