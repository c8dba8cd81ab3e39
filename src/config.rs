//! Static configuration of the bridge.
//!
//! Everything here is compile-time data in the firmware: the chip's network
//! identity, the MQTT session options and the console display options. Each
//! record has a `const DEFAULT` so it can live in a `static`.

use core::net::Ipv4Addr;

use crate::packet::{MqttVersion, QoS};

/// The only topic the bridge subscribes to.
pub const SUBSCRIBE_TOPIC: &str = "hello/wiznet";

/// How the chip obtains its IPv4 configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressingMode {
    /// Addresses are taken verbatim from [`NetworkIdentity`].
    Static,
    /// Addresses are leased by a DHCP client running on top of the chip.
    Dhcp,
}

/// The static network record pushed into the chip once the link is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkIdentity {
    pub mac: [u8; 6],
    pub ip: Ipv4Addr,
    pub subnet: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub dns: Ipv4Addr,
    pub mode: AddressingMode,
}

impl NetworkIdentity {
    pub const DEFAULT: Self = Self {
        mac: [0x0C, 0x29, 0xAB, 0x7C, 0x00, 0x01],
        ip: Ipv4Addr::new(192, 168, 1, 199),
        subnet: Ipv4Addr::new(255, 255, 255, 0),
        gateway: Ipv4Addr::new(192, 168, 1, 1),
        dns: Ipv4Addr::new(0, 0, 0, 0),
        mode: AddressingMode::Static,
    };
}

impl Default for NetworkIdentity {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// What to do when a fallible step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorPolicy {
    /// Report the result and carry on as if it had succeeded.
    Continue,
    /// Abort bring-up on chip failures and reconnect the session on protocol failures.
    Strict,
}

/// How incoming payloads are rendered on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayOptions<'a> {
    /// Write payloads back to back, without [`DisplayOptions::delimiter`].
    pub no_delimiter: bool,
    /// Written after every payload unless `no_delimiter` is set.
    pub delimiter: &'a str,
    /// Echo every payload as a diagnostic line before the regular output.
    pub show_topics: bool,
}

impl DisplayOptions<'static> {
    pub const DEFAULT: Self = Self {
        no_delimiter: false,
        delimiter: "\n",
        show_topics: false,
    };
}

impl Default for DisplayOptions<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Options of the MQTT session loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a str>,
    pub qos: QoS,
    pub host: Ipv4Addr,
    pub port: u16,
    pub topic: &'a str,
    pub display: DisplayOptions<'a>,
    /// Keep-alive in seconds, sent in CONNECT.
    ///
    /// The same number, in milliseconds, bounds each protocol service window.
    pub keep_alive: u16,
    pub clean_session: bool,
    pub version: MqttVersion,
    /// Chip socket slot used for the broker connection.
    pub socket: u8,
    /// Local TCP port of the broker connection.
    pub local_port: u16,
    /// How long connect and subscribe wait for their acknowledgement.
    pub command_timeout_ms: u32,
    /// Sleep between two protocol service windows.
    pub poll_interval_ms: u32,
    pub policy: ErrorPolicy,
    /// Pause before reconnecting under [`ErrorPolicy::Strict`].
    pub reconnect_delay_ms: u32,
}

impl SessionOptions<'static> {
    pub const DEFAULT: Self = Self {
        client_id: "wiznet-mqtt",
        username: None,
        password: None,
        qos: QoS::AtMostOnce,
        host: Ipv4Addr::new(10, 104, 15, 84),
        port: 1883,
        topic: SUBSCRIBE_TOPIC,
        display: DisplayOptions::DEFAULT,
        keep_alive: 60,
        clean_session: true,
        version: MqttVersion::V3_1,
        socket: 0,
        local_port: 50000,
        command_timeout_ms: 1000,
        poll_interval_ms: 500,
        policy: ErrorPolicy::Continue,
        reconnect_delay_ms: 5000,
    };
}

impl Default for SessionOptions<'static> {
    fn default() -> Self {
        Self::DEFAULT
    }
}
