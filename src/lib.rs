//! # MQTT Bridge for the WIZnet W5500
//!
//! `myrtio-w5500-mqtt` is a `no_std`, allocation-free firmware library that
//! subscribes a microcontroller to one MQTT topic through a WIZnet W5500
//! Ethernet offload chip and prints every message it receives on a console
//! stream. It is built on the [Embassy](https://embassy.dev/) async ecosystem.
//!
//! ## Layers
//!
//! - [`spi`]: the byte-level bus contract the chip driver calls back into,
//!   with a busy-waiting register-level implementation and one over
//!   `embedded-hal` 1.0.
//! - [`w5500`]: register access, link status and TCP sockets of the chip.
//! - [`link`]: the one-shot boot sequence (chip init, link wait, addresses).
//! - [`client`]: a subscribe-side MQTT 3.1 / 3.1.1 client over any
//!   [`MqttTransport`].
//! - [`dispatch`]: renders received payloads on the console.
//! - [`session`]: the long-lived connect, subscribe, service loop.
//! - [`bridge`]: wires the pieces together for board code.
//!
//! ## Usage
//!
//! ```ignore
//! let bus = HalSpiTransport::new(spi, cs);
//! let mut chip = W5500::new(bus, W5500Config::DEFAULT);
//! bridge::init(&mut chip, &NetworkIdentity::DEFAULT, &mut serial, &mut delay, ErrorPolicy::Continue)?;
//!
//! // On a dedicated task:
//! let mut session = bridge::session(chip, serial, embassy_time::Delay, SessionOptions::DEFAULT);
//! session.run(&STOP).await;
//! ```
//!
//! ## Logging
//!
//! Diagnostics go through `log` or `defmt`, selected with the cargo features
//! of the same name. Without either, logging compiles away. Console output is
//! separate and always written.

#![cfg_attr(not(test), no_std)]

pub(crate) mod fmt;

pub mod bridge;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod link;
pub mod packet;
pub mod poll;
pub mod session;
pub mod spi;
pub mod transport;
pub mod util;
pub mod w5500;

#[cfg(test)]
pub(crate) mod testing;

// Re-export key types for easier access at the crate root.
pub use client::{ConnectOptions, MessageHandler, MqttClient};
pub use config::{DisplayOptions, ErrorPolicy, NetworkIdentity, SessionOptions};
pub use dispatch::Dispatcher;
pub use error::{ChipError, LinkError, MqttError};
pub use link::{LinkBringUp, LinkReport, LinkState};
pub use packet::QoS;
pub use session::{Session, SessionState, StopSignal};
pub use spi::{ChipBus, HalSpiTransport, SpiByteTransport};
pub use transport::{MqttTransport, NetworkConnect};
pub use w5500::{W5500, W5500Config, W5500Socket};
