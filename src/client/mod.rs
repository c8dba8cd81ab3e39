//! # MQTT Client
//!
//! A small, subscribe-side MQTT 3.1 / 3.1.1 client over any [`MqttTransport`].
//!
//! The client owns two fixed buffers: `TX` bytes for outgoing packets and `RX`
//! bytes for reassembling inbound ones. Nothing is allocated.
//!
//! ```ignore
//! let mut client = MqttClient::<_, 100, 2048>::new(socket, Duration::from_millis(1000));
//! client.open(broker, 1883).await?;
//! client.connect(&ConnectOptions::new("wiznet-mqtt")).await?;
//! client.subscribe("hello/wiznet", QoS::AtMostOnce).await?;
//! loop {
//!     client.yield_for(Duration::from_millis(60), &mut handler).await?;
//! }
//! ```

mod registry;

pub use registry::{MAX_TOPIC_LEN, TopicRegistry};

use core::net::Ipv4Addr;

use embassy_time::{Duration, Instant, Timer};
use futures::future::{Either, select};

use crate::error::{MqttError, ProtocolError};
use crate::fmt::{debug, trace, warn};
use crate::packet::{
    self, AckKind, AckPacket, Connect, Disconnect, EncodePacket, MqttPacket, MqttVersion, PingReq,
    Publish, QoS, SubAck, Subscribe,
};
use crate::transport::{MqttTransport, NetworkConnect};
use crate::util::Partial;

/// Filters one client can be subscribed to at a time.
pub const MAX_SUBSCRIPTIONS: usize = 4;

/// Receives the PUBLISH packets routed to a session.
///
/// Called synchronously from [`MqttClient::yield_for`] while the keep-alive is
/// being serviced, so it must not block for long.
pub trait MessageHandler {
    fn on_message(&mut self, msg: &Publish<'_>);
}

impl<H: MessageHandler + ?Sized> MessageHandler for &mut H {
    fn on_message(&mut self, msg: &Publish<'_>) {
        (**self).on_message(msg)
    }
}

/// Parameters of the CONNECT handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectOptions<'a> {
    pub client_id: &'a str,
    pub username: Option<&'a str>,
    pub password: Option<&'a [u8]>,
    /// Keep-alive in seconds, `0` disables pings.
    pub keep_alive: u16,
    pub clean_session: bool,
    pub version: MqttVersion,
}

impl<'a> ConnectOptions<'a> {
    /// A 3.1.1 clean session with a 60 second keep-alive.
    pub fn new(client_id: &'a str) -> Self {
        Self {
            client_id,
            username: None,
            password: None,
            keep_alive: 60,
            clean_session: true,
            version: MqttVersion::V3_1_1,
        }
    }
}

pub struct MqttClient<T, const TX: usize, const RX: usize> {
    transport: T,
    tx: [u8; TX],
    rx: [u8; RX],
    rx_len: usize,
    /// Bytes of an oversized packet still to be skipped on the stream.
    discard: usize,
    command_timeout: Duration,
    keep_alive: Duration,
    last_sent: Instant,
    ping_outstanding: bool,
    connected: bool,
    last_packet_id: u16,
    topics: TopicRegistry<MAX_SUBSCRIPTIONS>,
}

impl<T, const TX: usize, const RX: usize> MqttClient<T, TX, RX>
where
    T: MqttTransport,
{
    /// Wraps `transport`. `command_timeout` bounds the wait for CONNACK and SUBACK.
    pub fn new(transport: T, command_timeout: Duration) -> Self {
        Self {
            transport,
            tx: [0; TX],
            rx: [0; RX],
            rx_len: 0,
            discard: 0,
            command_timeout,
            keep_alive: Duration::from_secs(0),
            last_sent: Instant::now(),
            ping_outstanding: false,
            connected: false,
            last_packet_id: 0,
            topics: TopicRegistry::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn topics(&self) -> &TopicRegistry<MAX_SUBSCRIPTIONS> {
        &self.topics
    }

    pub fn transport(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Performs the CONNECT / CONNACK handshake.
    ///
    /// A non-zero CONNACK return code is reported as
    /// [`MqttError::ConnectionRefused`].
    pub async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), MqttError<T::Error>> {
        self.connected = false;
        self.ping_outstanding = false;
        self.rx_len = 0;
        self.discard = 0;
        self.topics.clear();
        self.keep_alive = Duration::from_secs(u64::from(options.keep_alive));

        let mut connect = Connect::new(options.client_id, options.keep_alive, options.clean_session);
        connect.version = options.version;
        connect.username = options.username;
        connect.password = options.password;
        self.send_packet(&connect).await?;

        let deadline = Instant::now() + self.command_timeout;
        loop {
            let len = self.read_packet(deadline).await?.ok_or(MqttError::Timeout)?;
            let connack = packet::decode(&self.rx[..len]).map(|packet| match packet {
                MqttPacket::ConnAck(ack) => Some(ack),
                _ => None,
            });
            self.consume(len);

            let Some(ack) = connack.map_err(MqttError::cast_transport_error)? else {
                debug!("skipping packet while waiting for CONNACK");
                continue;
            };
            if ack.return_code != 0 {
                warn!("broker refused connection: {}", ack.return_code);
                return Err(MqttError::ConnectionRefused(ack.return_code.into()));
            }
            self.connected = true;
            debug!("connected, session present: {}", ack.session_present);
            return Ok(());
        }
    }

    /// Subscribes to `topic` and waits for the SUBACK.
    ///
    /// On success the filter is recorded, so matching PUBLISH packets reach the
    /// handler passed to [`MqttClient::yield_for`].
    pub async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        if !self.topics.contains(topic) && self.topics.len() == MAX_SUBSCRIPTIONS {
            return Err(MqttError::Protocol(ProtocolError::TooManySubscriptions));
        }

        let packet_id = self.next_packet_id();
        self.send_packet(&Subscribe::new(packet_id, topic, qos)).await?;

        let deadline = Instant::now() + self.command_timeout;
        loop {
            let len = self.read_packet(deadline).await?.ok_or(MqttError::Timeout)?;
            let suback = packet::decode(&self.rx[..len]).map(|packet| match packet {
                MqttPacket::SubAck(ack) if ack.packet_id == packet_id => Some(ack),
                _ => None,
            });
            self.consume(len);

            let Some(ack) = suback.map_err(MqttError::cast_transport_error)? else {
                debug!("skipping packet while waiting for SUBACK {}", packet_id);
                continue;
            };
            return match ack.return_codes.first() {
                Some(&SubAck::FAILURE) | None => {
                    warn!("subscription to {} rejected", topic);
                    Err(MqttError::Protocol(ProtocolError::SubscriptionRejected))
                }
                Some(granted) => {
                    debug!("subscribed to {} with QoS {}", topic, granted);
                    if !self.topics.add_topic(topic) {
                        return Err(MqttError::Protocol(ProtocolError::TooManySubscriptions));
                    }
                    Ok(())
                }
            };
        }
    }

    /// Services the session for `window`.
    ///
    /// Inbound packets are handled as they complete: matching PUBLISH packets
    /// go to `handler` and are acknowledged according to their QoS. A PINGREQ
    /// is sent once the keep-alive interval has passed since the last
    /// transmission; if the broker still has not answered the previous ping by
    /// then, the session is considered lost and [`MqttError::Timeout`] returned.
    pub async fn yield_for<H: MessageHandler>(
        &mut self,
        window: Duration,
        handler: &mut H,
    ) -> Result<(), MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }

        let deadline = Instant::now() + window;
        loop {
            self.service_keep_alive().await?;

            let wake = match self.keep_alive_deadline() {
                Some(ping_due) if ping_due < deadline => ping_due,
                _ => deadline,
            };
            match self.read_packet(wake).await? {
                Some(len) => self.handle_inbound(len, handler).await?,
                None if Instant::now() >= deadline => return Ok(()),
                None => {}
            }
        }
    }

    /// Sends DISCONNECT. The transport stays open.
    pub async fn disconnect(&mut self) -> Result<(), MqttError<T::Error>> {
        if !self.connected {
            return Err(MqttError::NotConnected);
        }
        self.connected = false;
        self.send_packet(&Disconnect).await
    }

    fn next_packet_id(&mut self) -> u16 {
        self.last_packet_id = match self.last_packet_id.wrapping_add(1) {
            0 => 1,
            id => id,
        };
        self.last_packet_id
    }

    fn keep_alive_deadline(&self) -> Option<Instant> {
        if self.keep_alive.as_ticks() == 0 {
            None
        } else {
            Some(self.last_sent + self.keep_alive)
        }
    }

    async fn service_keep_alive(&mut self) -> Result<(), MqttError<T::Error>> {
        match self.keep_alive_deadline() {
            Some(due) if Instant::now() >= due => {}
            _ => return Ok(()),
        }
        if self.ping_outstanding {
            warn!("no PINGRESP within the keep-alive interval");
            self.connected = false;
            return Err(MqttError::Timeout);
        }
        trace!("sending PINGREQ");
        self.send_packet(&PingReq).await?;
        self.ping_outstanding = true;
        Ok(())
    }

    async fn handle_inbound<H: MessageHandler>(
        &mut self,
        len: usize,
        handler: &mut H,
    ) -> Result<(), MqttError<T::Error>> {
        let reply = match packet::decode(&self.rx[..len]) {
            Ok(MqttPacket::Publish(publish)) => {
                if self.topics.matches(publish.topic) {
                    handler.on_message(&publish);
                } else {
                    debug!("dropping message on unsubscribed topic {}", publish.topic);
                }
                Ok(match (publish.qos, publish.packet_id) {
                    (QoS::AtLeastOnce, Some(packet_id)) => Some(AckPacket {
                        kind: AckKind::PubAck,
                        packet_id,
                    }),
                    (QoS::ExactlyOnce, Some(packet_id)) => Some(AckPacket {
                        kind: AckKind::PubRec,
                        packet_id,
                    }),
                    _ => None,
                })
            }
            Ok(MqttPacket::PubRel(ack)) => Ok(Some(AckPacket {
                kind: AckKind::PubComp,
                packet_id: ack.packet_id,
            })),
            Ok(MqttPacket::PingResp) => {
                trace!("PINGRESP");
                self.ping_outstanding = false;
                Ok(None)
            }
            Ok(_) => {
                debug!("ignoring unexpected packet");
                Ok(None)
            }
            Err(e) => Err(e),
        };
        self.consume(len);

        if let Some(ack) = reply.map_err(MqttError::cast_transport_error)? {
            self.send_packet(&ack).await?;
        }
        Ok(())
    }

    async fn send_packet<P: EncodePacket>(&mut self, packet: &P) -> Result<(), MqttError<T::Error>> {
        let len = packet
            .encode(&mut self.tx)
            .map_err(MqttError::cast_transport_error)?;
        if let Err(e) = self.transport.send(&self.tx[..len]).await {
            self.connected = false;
            return Err(MqttError::Transport(e));
        }
        self.last_sent = Instant::now();
        Ok(())
    }

    /// Waits until a complete packet sits at the start of the receive buffer
    /// and returns its length, or `None` once `deadline` has passed.
    ///
    /// A packet longer than the buffer is reported as
    /// [`MqttError::BufferTooSmall`]; its remaining bytes are skipped on later
    /// reads so framing resumes at the next packet.
    async fn read_packet(&mut self, deadline: Instant) -> Result<Option<usize>, MqttError<T::Error>> {
        loop {
            if self.discard > 0 {
                let skipped = self.discard.min(self.rx_len);
                self.consume(skipped);
                self.discard -= skipped;
            }

            if self.discard == 0 {
                match packet::packet_length(&self.rx[..self.rx_len]) {
                    Ok(Partial::Complete(len)) if len > RX => {
                        warn!("inbound packet of {} bytes exceeds the buffer", len);
                        self.discard = len - self.rx_len;
                        self.rx_len = 0;
                        return Err(MqttError::BufferTooSmall);
                    }
                    Ok(Partial::Complete(len)) if len <= self.rx_len => return Ok(Some(len)),
                    Ok(_) => {}
                    Err(e) => {
                        self.rx_len = 0;
                        return Err(MqttError::cast_transport_error(e));
                    }
                }
            }

            let recv = self.transport.recv(&mut self.rx[self.rx_len..]);
            let timer = Timer::at(deadline);
            match select(core::pin::pin!(recv), core::pin::pin!(timer)).await {
                Either::Left((Ok(0), _)) => {
                    self.connected = false;
                    return Err(MqttError::Protocol(ProtocolError::ConnectionClosed));
                }
                Either::Left((Ok(n), _)) => self.rx_len += n,
                Either::Left((Err(e), _)) => {
                    self.connected = false;
                    return Err(MqttError::Transport(e));
                }
                Either::Right(((), _)) => return Ok(None),
            }
        }
    }

    fn consume(&mut self, len: usize) {
        self.rx.copy_within(len..self.rx_len, 0);
        self.rx_len -= len;
    }
}

impl<T, const TX: usize, const RX: usize> MqttClient<T, TX, RX>
where
    T: NetworkConnect,
{
    /// Opens the transport connection to the broker.
    pub async fn open(&mut self, host: Ipv4Addr, port: u16) -> Result<(), MqttError<T::Error>> {
        self.rx_len = 0;
        self.discard = 0;
        self.transport
            .connect(host, port)
            .await
            .map_err(MqttError::Transport)
    }

    /// Sends DISCONNECT if the session is up, then closes the transport.
    pub async fn close(&mut self) -> Result<(), MqttError<T::Error>> {
        if self.connected {
            let _ = self.disconnect().await;
        }
        self.connected = false;
        self.rx_len = 0;
        self.discard = 0;
        self.transport.close().await.map_err(MqttError::Transport)
    }
}
