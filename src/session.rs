//! # MQTT Session Loop
//!
//! The long-lived task that keeps the bridge subscribed:
//!
//! ```text
//! ConnectingTcp -> HandshakingMqtt -> Subscribing -> Yielding -> Yielding -> ...
//! ```
//!
//! Each result code is printed on the console. Under [`ErrorPolicy::Continue`]
//! a failure never changes the sequence: the loop moves on as if the step had
//! succeeded. Under [`ErrorPolicy::Strict`] any failure closes the connection
//! and, after `reconnect_delay_ms`, the sequence restarts at `ConnectingTcp`.
//!
//! Between two service windows the task sleeps `poll_interval_ms`, which is
//! what lets lower-priority tasks run.

use core::fmt::Debug;
use core::net::Ipv4Addr;

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use embedded_io::Write;

use crate::client::{ConnectOptions, MessageHandler, MqttClient};
use crate::config::{ErrorPolicy, SessionOptions};
use crate::dispatch::Dispatcher;
use crate::error::{MqttError, result_code};
use crate::fmt::{Debug2Format, debug, info, warn};
use crate::packet::QoS;
use crate::transport::NetworkConnect;

/// Ends [`Session::run`] when signalled.
pub type StopSignal = Signal<CriticalSectionRawMutex, ()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionState {
    ConnectingTcp,
    HandshakingMqtt,
    Subscribing,
    Yielding,
    Stopped,
}

/// The client operations the session loop drives.
#[allow(async_fn_in_trait)]
pub trait SessionClient {
    type TransportError: Debug;

    async fn open(&mut self, host: Ipv4Addr, port: u16) -> Result<(), MqttError<Self::TransportError>>;

    async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), MqttError<Self::TransportError>>;

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError<Self::TransportError>>;

    async fn yield_for<H: MessageHandler>(
        &mut self,
        window: Duration,
        handler: &mut H,
    ) -> Result<(), MqttError<Self::TransportError>>;

    async fn close(&mut self) -> Result<(), MqttError<Self::TransportError>>;
}

impl<T, const TX: usize, const RX: usize> SessionClient for MqttClient<T, TX, RX>
where
    T: NetworkConnect,
{
    type TransportError = T::Error;

    async fn open(&mut self, host: Ipv4Addr, port: u16) -> Result<(), MqttError<T::Error>> {
        MqttClient::open(self, host, port).await
    }

    async fn connect(&mut self, options: &ConnectOptions<'_>) -> Result<(), MqttError<T::Error>> {
        MqttClient::connect(self, options).await
    }

    async fn subscribe(&mut self, topic: &str, qos: QoS) -> Result<(), MqttError<T::Error>> {
        MqttClient::subscribe(self, topic, qos).await
    }

    async fn yield_for<H: MessageHandler>(
        &mut self,
        window: Duration,
        handler: &mut H,
    ) -> Result<(), MqttError<T::Error>> {
        MqttClient::yield_for(self, window, handler).await
    }

    async fn close(&mut self) -> Result<(), MqttError<T::Error>> {
        MqttClient::close(self).await
    }
}

/// Counters kept across the session's lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub connects: u32,
    pub reconnects: u32,
    pub failed_yields: u32,
}

pub struct Session<'a, C, W, D> {
    client: C,
    dispatcher: Dispatcher<'a, W>,
    delay: D,
    options: SessionOptions<'a>,
    state: SessionState,
    pause_ms: Option<u32>,
    stats: SessionStats,
}

impl<'a, C, W, D> Session<'a, C, W, D>
where
    C: SessionClient,
    W: Write,
    D: DelayNs,
{
    pub fn new(client: C, console: W, delay: D, options: SessionOptions<'a>) -> Self {
        Self {
            client,
            dispatcher: Dispatcher::new(console, options.display),
            delay,
            options,
            state: SessionState::ConnectingTcp,
            pause_ms: None,
            stats: SessionStats::default(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    pub fn dispatcher(&self) -> &Dispatcher<'a, W> {
        &self.dispatcher
    }

    pub fn client(&mut self) -> &mut C {
        &mut self.client
    }

    pub fn into_parts(self) -> (C, W) {
        (self.client, self.dispatcher.release())
    }

    /// Runs until `stop` is signalled, then closes the connection.
    ///
    /// The signal is checked between steps and raced against every sleep.
    pub async fn run(&mut self, stop: &StopSignal) {
        info!("session loop started");
        while !stop.signaled() && self.state != SessionState::Stopped {
            self.step().await;
            if let Some(ms) = self.pause_ms.take()
                && let Either::Second(()) = select(self.delay.delay_ms(ms), stop.wait()).await
            {
                break;
            }
        }
        if let Err(e) = self.client.close().await {
            debug!("close on stop failed: {:?}", Debug2Format(&e));
        }
        self.state = SessionState::Stopped;
        info!("session loop stopped");
    }

    /// Performs the action of the current state and moves to the next one.
    ///
    /// Does not sleep: the pause that should follow is left for [`Session::run`]
    /// and also reported by [`Session::pending_pause_ms`].
    pub async fn step(&mut self) -> SessionState {
        self.pause_ms = None;
        self.state = match self.state {
            SessionState::ConnectingTcp => self.open().await,
            SessionState::HandshakingMqtt => self.handshake().await,
            SessionState::Subscribing => self.subscribe().await,
            SessionState::Yielding => self.service().await,
            SessionState::Stopped => SessionState::Stopped,
        };
        self.state
    }

    /// The sleep owed after the last step, in milliseconds.
    pub fn pending_pause_ms(&self) -> Option<u32> {
        self.pause_ms
    }

    async fn open(&mut self) -> SessionState {
        let result = self.client.open(self.options.host, self.options.port).await;
        match &result {
            Ok(()) => debug!("tcp connected to port {}", self.options.port),
            Err(e) => warn!("tcp connect failed: {:?}", Debug2Format(&e)),
        }
        self.advance(result.is_ok(), SessionState::HandshakingMqtt).await
    }

    async fn handshake(&mut self) -> SessionState {
        self.dispatcher.set_topic_echo(true);

        let options = ConnectOptions {
            client_id: self.options.client_id,
            username: self.options.username,
            password: self.options.password.map(str::as_bytes),
            keep_alive: self.options.keep_alive,
            clean_session: self.options.clean_session,
            version: self.options.version,
        };
        let result = self.client.connect(&options).await;
        let rc = result_code(&result);
        let _ = write!(self.dispatcher.console(), "MQTT Connected {}\r\n", rc);
        if result.is_ok() {
            self.stats.connects = self.stats.connects.saturating_add(1);
        }
        self.advance(result.is_ok(), SessionState::Subscribing).await
    }

    async fn subscribe(&mut self) -> SessionState {
        let topic = self.options.topic;
        let _ = write!(self.dispatcher.console(), "MQTT Subscribing to {}\r\n", topic);
        let result = self.client.subscribe(topic, self.options.qos).await;
        let rc = result_code(&result);
        let _ = write!(self.dispatcher.console(), "MQTT Subscribed {}\r\n", rc);
        self.advance(result.is_ok(), SessionState::Yielding).await
    }

    async fn service(&mut self) -> SessionState {
        // The keep-alive figure doubles as the service window, in milliseconds.
        let window = Duration::from_millis(u64::from(self.options.keep_alive));
        let result = self.client.yield_for(window, &mut self.dispatcher).await;
        if let Err(e) = &result {
            self.stats.failed_yields = self.stats.failed_yields.saturating_add(1);
            debug!("yield failed: {:?}", Debug2Format(&e));
        }
        let next = self.advance(result.is_ok(), SessionState::Yielding).await;
        if next == SessionState::Yielding {
            self.pause_ms = Some(self.options.poll_interval_ms);
        }
        next
    }

    /// Picks the state after a step according to the error policy.
    async fn advance(&mut self, succeeded: bool, next: SessionState) -> SessionState {
        if succeeded || self.options.policy == ErrorPolicy::Continue {
            return next;
        }
        warn!("step failed, reconnecting in {} ms", self.options.reconnect_delay_ms);
        if let Err(e) = self.client.close().await {
            debug!("close before reconnect failed: {:?}", Debug2Format(&e));
        }
        self.stats.reconnects = self.stats.reconnects.saturating_add(1);
        self.pause_ms = Some(self.options.reconnect_delay_ms);
        SessionState::ConnectingTcp
    }
}
