//! Wiring of the chip, the link bring-up and the session loop.
//!
//! Board glue stays outside the crate: it builds the [`ChipBus`] for its SPI
//! peripheral, calls [`init`] once from the boot task, then spawns a task
//! that runs the [`Session`] returned by [`session`].

use embassy_time::Duration;
use embedded_hal::delay::DelayNs;
use embedded_io::Write;

use crate::client::MqttClient;
use crate::config::{ErrorPolicy, NetworkIdentity, SessionOptions};
use crate::error::LinkError;
use crate::link::{LinkBringUp, LinkConfig, LinkReport};
use crate::session::Session;
use crate::spi::ChipBus;
use crate::w5500::{LinkChip, W5500, W5500Socket};

/// Size of the outgoing packet buffer.
pub const COMMAND_BUFFER: usize = 100;
/// Size of the inbound packet buffer.
pub const MESSAGE_BUFFER: usize = 2048;

/// The MQTT client the bridge runs over a W5500 socket.
pub type BridgeClient<B> = MqttClient<W5500Socket<B>, COMMAND_BUFFER, MESSAGE_BUFFER>;

/// Brings the chip's link up and pushes `identity` into it.
///
/// Link polling is a tight loop without a budget, as the bridge has no use
/// without a link.
pub fn init<C, W, D>(
    chip: &mut C,
    identity: &NetworkIdentity,
    console: &mut W,
    delay: &mut D,
    policy: ErrorPolicy,
) -> Result<LinkReport, LinkError<C::Error>>
where
    C: LinkChip,
    W: Write,
    D: DelayNs,
{
    let config = LinkConfig {
        policy,
        ..LinkConfig::DEFAULT
    };
    LinkBringUp::new(identity, config).run(chip, console, delay)
}

/// Builds the session loop over socket `options.socket` of `chip`.
pub fn session<'a, B, W, D>(
    chip: W5500<B>,
    console: W,
    delay: D,
    options: SessionOptions<'a>,
) -> Session<'a, BridgeClient<B>, W, D>
where
    B: ChipBus,
    W: Write,
    D: embedded_hal_async::delay::DelayNs,
{
    let socket = W5500Socket::new(chip, options.socket, options.local_port);
    let timeout = Duration::from_millis(u64::from(options.command_timeout_ms));
    Session::new(MqttClient::new(socket, timeout), console, delay, options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poll::NoDelay;
    use crate::session::SessionState;
    use crate::testing::TestConsole;
    use crate::w5500::W5500Config;
    use crate::w5500::fake::FakeW5500;
    use embassy_futures::block_on;

    struct Immediate;

    impl embedded_hal_async::delay::DelayNs for Immediate {
        async fn delay_ns(&mut self, _ns: u32) {}
    }

    #[test]
    fn boots_subscribes_and_prints_a_message() {
        let mut bus = FakeW5500::new();
        bus.script_phy(&[0x00, 0x01]);
        // Broker side of the conversation, queued before the socket opens.
        bus.inject_rx(0, &[0x20, 0x02, 0x00, 0x00]);
        bus.inject_rx(0, &[0x90, 0x03, 0x00, 0x01, 0x00]);
        bus.inject_rx(
            0,
            &[
                0x30, 19, 0, 12, b'h', b'e', b'l', b'l', b'o', b'/', b'w', b'i', b'z', b'n', b'e',
                b't', b'h', b'e', b'y', b'!', b'!',
            ],
        );

        let mut chip = W5500::new(bus, W5500Config::DEFAULT);
        let mut console = TestConsole::default();
        let report = init(
            &mut chip,
            &NetworkIdentity::DEFAULT,
            &mut console,
            &mut NoDelay,
            ErrorPolicy::Continue,
        )
        .unwrap();
        assert_eq!(report.failed_polls, 1);

        let mut session = session(chip, console, Immediate, SessionOptions::DEFAULT);
        let states = block_on(async {
            [
                session.step().await,
                session.step().await,
                session.step().await,
                session.step().await,
            ]
        });
        assert_eq!(
            states,
            [
                SessionState::HandshakingMqtt,
                SessionState::Subscribing,
                SessionState::Yielding,
                SessionState::Yielding,
            ]
        );

        let (client, console) = session.into_parts();
        assert_eq!(
            console.text(),
            "PHY Link down.\r\n\
             MQTT Connected 0\r\n\
             MQTT Subscribing to hello/wiznet\r\n\
             MQTT Subscribed 0\r\n\
             hey!!\n\
             hey!!\n"
        );

        let bus = client.into_transport().into_chip().release();
        let sent = bus.sent(0);
        assert_eq!(sent[0], 0x10);
        assert_eq!(&sent[4..10], b"MQIsdp");
    }
}
