//! # MQTT Transport Abstraction
//!
//! This module defines the `MqttTransport` trait, which abstracts the underlying
//! communication channel, allowing the MQTT client to be hardware and
//! network-stack agnostic. The W5500 socket in [`crate::w5500`] implements it
//! for the bridge; tests drive the client through scripted doubles.
//!
//! With the Rust 2024 Edition, these traits use native `async fn`, removing the
//! need for the `#[async_trait]` macro.

use core::net::Ipv4Addr;

/// A placeholder error type used in contexts where the actual transport error is not known,
/// such as in the `EncodePacket` trait.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ErrorPlaceHolder;

/// A marker trait for transport-related errors.
pub trait TransportError: core::fmt::Debug {}

// Allow the placeholder to be treated as a transport error for generic contexts.
impl TransportError for ErrorPlaceHolder {}

/// A trait representing a transport for MQTT packets.
#[allow(async_fn_in_trait)]
pub trait MqttTransport {
    /// The error type returned by the transport.
    type Error: core::fmt::Debug;

    /// Sends a buffer of data over the transport.
    async fn send(&mut self, buf: &[u8]) -> Result<(), Self::Error>;

    /// Receives data from the transport into a buffer.
    ///
    /// Waits until at least one byte is available and returns the number of
    /// bytes read.
    async fn recv(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;
}

/// A transport that has to open a connection to the broker before use.
#[allow(async_fn_in_trait)]
pub trait NetworkConnect: MqttTransport {
    /// Opens a TCP connection to `host:port`.
    async fn connect(&mut self, host: Ipv4Addr, port: u16) -> Result<(), Self::Error>;

    /// Closes the connection. Closing an already closed connection is a no-op.
    async fn close(&mut self) -> Result<(), Self::Error>;
}
