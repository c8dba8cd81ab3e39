//! # Error Types
//!
//! This module defines the error types used throughout the bridge: MQTT client
//! failures (from transport issues to protocol violations), W5500 chip driver
//! failures, and the failures a strict link bring-up can abort with.

use crate::transport;

/// The primary error enum for the MQTT client.
///
/// It is generic over the transport error type `T`, allowing it to wrap
/// specific errors from the underlying transport (a W5500 socket, a UART, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MqttError<T> {
    /// An error occurred in the underlying transport layer.
    Transport(T),
    /// A protocol-level error occurred, indicating a violation of the MQTT specification.
    Protocol(ProtocolError),
    /// The connection was refused by the broker. The enclosed code provides the reason.
    ConnectionRefused(ConnectReasonCode),
    /// The client is not currently connected to the broker.
    NotConnected,
    /// The buffer provided for an operation was too small.
    BufferTooSmall,
    /// An operation timed out.
    Timeout,
}

/// Implements the `From` trait to allow for automatic conversion of any transport
/// error into an `MqttError`. This is what allows the `?` operator to work
/// seamlessly on `Result`s from the transport layer.
impl<T: transport::TransportError> From<T> for MqttError<T> {
    fn from(err: T) -> Self {
        MqttError::Transport(err)
    }
}

impl<T> MqttError<T> {
    /// Converts an `MqttError` raised by packet logic (which never carries a
    /// transport error) into an `MqttError` over the client's transport error.
    pub fn cast_transport_error(other: MqttError<transport::ErrorPlaceHolder>) -> MqttError<T> {
        match other {
            MqttError::Protocol(p) => MqttError::Protocol(p),
            MqttError::ConnectionRefused(c) => MqttError::ConnectionRefused(c),
            MqttError::NotConnected => MqttError::NotConnected,
            MqttError::BufferTooSmall => MqttError::BufferTooSmall,
            MqttError::Timeout => MqttError::Timeout,
            // Packet encoding and decoding never touch the transport.
            MqttError::Transport(_) => MqttError::Protocol(ProtocolError::MalformedPacket),
        }
    }

    /// The numeric result code printed on the console for this failure.
    ///
    /// Library failures are negative, broker refusals carry the positive
    /// CONNACK return code. Success is reported as `0` by [`result_code`].
    pub fn code(&self) -> i32 {
        match self {
            MqttError::ConnectionRefused(reason) => i32::from(reason.as_u8()),
            MqttError::BufferTooSmall => -2,
            _ => -1,
        }
    }
}

/// Maps an operation outcome onto the console result code (`0` on success).
pub fn result_code<V, T>(result: &Result<V, MqttError<T>>) -> i32 {
    match result {
        Ok(_) => 0,
        Err(e) => e.code(),
    }
}

/// Represents the return codes of a connection refusal (`CONNACK`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ConnectReasonCode {
    /// The connection was accepted.
    Success,
    /// The broker does not support the requested MQTT protocol version.
    UnacceptableProtocolVersion,
    /// The client identifier is not valid.
    IdentifierRejected,
    /// The broker is unavailable.
    ServerUnavailable,
    /// The username or password is not valid.
    BadUserNameOrPassword,
    /// The client is not authorized to connect.
    NotAuthorized,
    /// An unknown or unspecified error occurred.
    Other(u8),
}

impl ConnectReasonCode {
    /// The raw return code as sent by the broker.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::UnacceptableProtocolVersion => 1,
            Self::IdentifierRejected => 2,
            Self::ServerUnavailable => 3,
            Self::BadUserNameOrPassword => 4,
            Self::NotAuthorized => 5,
            Self::Other(val) => val,
        }
    }
}

impl From<u8> for ConnectReasonCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Success,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

/// Enumerates specific MQTT protocol errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ProtocolError {
    /// An invalid packet type was received.
    InvalidPacketType(u8),
    /// The server sent an invalid or unexpected response.
    InvalidResponse,
    /// The connection was closed by the broker.
    ConnectionClosed,
    /// A packet was received that was not correctly formed.
    MalformedPacket,
    /// The payload of a message exceeds the maximum allowable size.
    PayloadTooLarge,
    /// A string was not valid UTF-8.
    InvalidUtf8String,
    /// The broker answered a SUBSCRIBE with the failure return code `0x80`.
    SubscriptionRejected,
    /// No free slot is left to record another subscription.
    TooManySubscriptions,
}

/// Failures reported by the W5500 chip driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChipError {
    /// The requested TX or RX buffer sizes add up to more than the chip's 16 KB.
    BufferSizeOverflow,
    /// The chip did not answer with the expected version; it is absent or the
    /// bus is misconfigured.
    NotResponding,
    /// The socket slot number is out of range.
    InvalidSocket(u8),
    /// The socket did not reach the expected state after a command.
    SocketState(u8),
    /// The peer did not answer in time (connect or send timeout raised by the chip).
    Timeout,
    /// The connection was closed by the peer or the chip.
    Closed,
}

impl transport::TransportError for ChipError {}

/// Failures that abort a link bring-up under the strict policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum LinkError<E> {
    /// The chip initialization command failed.
    ChipInit(E),
    /// The link was still down after the configured number of polls.
    LinkTimeout {
        /// Number of polls that were made.
        polls: u32,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn refusal_codes_are_positive() {
        let refused: MqttError<ChipError> =
            MqttError::ConnectionRefused(ConnectReasonCode::from(5));
        assert_eq!(refused.code(), 5);
        assert_eq!(ConnectReasonCode::from(0x42), ConnectReasonCode::Other(0x42));
        assert_eq!(ConnectReasonCode::Other(0x42).as_u8(), 0x42);
    }

    #[test]
    fn library_failures_are_negative() {
        let ok: Result<(), MqttError<ChipError>> = Ok(());
        let timeout: Result<(), MqttError<ChipError>> = Err(MqttError::Timeout);
        let overflow: Result<(), MqttError<ChipError>> = Err(MqttError::BufferTooSmall);
        let closed: Result<(), MqttError<ChipError>> =
            Err(MqttError::Transport(ChipError::Closed));
        assert_eq!(result_code(&ok), 0);
        assert_eq!(result_code(&timeout), -1);
        assert_eq!(result_code(&overflow), -2);
        assert_eq!(result_code(&closed), -1);
    }

    #[test]
    fn placeholder_errors_cast_without_panicking() {
        let cast: MqttError<ChipError> =
            MqttError::cast_transport_error(MqttError::Transport(transport::ErrorPlaceHolder));
        assert_eq!(cast, MqttError::Protocol(ProtocolError::MalformedPacket));
        let cast: MqttError<ChipError> = MqttError::cast_transport_error(MqttError::Timeout);
        assert_eq!(cast, MqttError::Timeout);
    }
}
