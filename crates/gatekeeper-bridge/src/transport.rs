//! # MQTT Transport
//!
//! MQTT client with automatic reconnection and backoff.
//!
//! ## Connection Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      MQTT Connection States                             │
//! │                                                                         │
//! │  ┌────────────┐    connect()    ┌────────────┐                         │
//! │  │Disconnected│ ──────────────► │ Connecting │                         │
//! │  └────────────┘                 └─────┬──────┘                         │
//! │        ▲                              │                                 │
//! │        │                    ConnAck   │   error / timeout               │
//! │        │                        ┌─────┴─────┐  (fatal at startup)       │
//! │        │                        ▼           ▼                           │
//! │        │              ┌────────────┐  ┌────────────┐                   │
//! │        │              │ Connected  │  │  startup   │                   │
//! │        │              └─────┬──────┘  │  aborted   │                   │
//! │        │                    │         └────────────┘                   │
//! │        │              poll error                                        │
//! │        │                    ▼                                           │
//! │        │              ┌────────────┐  timer   ┌────────────┐           │
//! │        │              │  Backoff   │ ───────► │Reconnecting│           │
//! │        │              └────────────┘          └─────┬──────┘           │
//! │        │                    ▲                       │ ConnAck →        │
//! │        │                    └──── error ────────────┘ re-subscribe,    │
//! │        │                                              Connected        │
//! │     shutdown / max_retries                                              │
//! │                                                                         │
//! │  BACKOFF STRATEGY (Exponential with Jitter)                            │
//! │  ───────────────────────────────────────────                           │
//! │  Attempt 1: 500ms, Attempt 2: 1s, Attempt 3: 2s ... Max: 60s           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Inbound publishes are forwarded in arrival order over a bounded channel.
//! Outbound publishes use QoS 0 (at most once).

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::InboundMessage;

// =============================================================================
// Publisher
// =============================================================================

/// Outbound half of the transport.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publishes a payload on a topic.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()>;
}

// =============================================================================
// Transport State
// =============================================================================

/// Connection state for the MQTT transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected.
    Disconnected,
    /// Attempting the first connection.
    Connecting,
    /// Connected and subscribed.
    Connected,
    /// Waiting before reconnection attempt.
    Backoff,
    /// Reconnection in progress.
    Reconnecting,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Disconnected => write!(f, "disconnected"),
            ConnectionState::Connecting => write!(f, "connecting"),
            ConnectionState::Connected => write!(f, "connected"),
            ConnectionState::Backoff => write!(f, "backoff"),
            ConnectionState::Reconnecting => write!(f, "reconnecting"),
        }
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the MQTT transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// MQTT client id.
    pub client_id: String,

    /// Broker host.
    pub host: String,

    /// Broker port.
    pub port: u16,

    /// Optional `(username, password)`.
    pub credentials: Option<(String, String)>,

    /// Topics subscribed on every (re)connect.
    pub subscriptions: Vec<String>,

    /// MQTT keep-alive.
    pub keep_alive: Duration,

    /// Timeout for the first connection.
    pub connect_timeout: Duration,

    /// Initial backoff duration.
    pub initial_backoff: Duration,

    /// Maximum backoff duration.
    pub max_backoff: Duration,

    /// Maximum consecutive reconnection failures (0 = infinite).
    pub max_retries: u32,

    /// Capacity of the inbound message channel.
    pub channel_capacity: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            client_id: String::new(),
            host: "localhost".to_string(),
            port: 1883,
            credentials: None,
            subscriptions: Vec::new(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(60),
            max_retries: 0, // Infinite
            channel_capacity: 100,
        }
    }
}

impl TransportConfig {
    /// Builds the transport config from the `[node]` and `[broker]` sections.
    pub fn from_bridge_config(config: &BridgeConfig, subscriptions: Vec<String>) -> Self {
        let broker = &config.broker;
        let credentials = match (&broker.username, &broker.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            (Some(user), None) => Some((user.clone(), String::new())),
            _ => None,
        };

        TransportConfig {
            client_id: config.node.id.clone(),
            host: broker.host.clone(),
            port: broker.port,
            credentials,
            subscriptions,
            keep_alive: Duration::from_secs(broker.keep_alive_secs),
            connect_timeout: Duration::from_secs(broker.connect_timeout_secs),
            initial_backoff: Duration::from_millis(broker.initial_backoff_ms),
            max_backoff: Duration::from_secs(broker.max_backoff_secs),
            max_retries: broker.max_retries,
            ..Default::default()
        }
    }

    fn mqtt_options(&self) -> MqttOptions {
        let mut options = MqttOptions::new(&self.client_id, &self.host, self.port);
        // rumqttc rejects keep-alive below 5 s
        options.set_keep_alive(self.keep_alive.max(Duration::from_secs(5)));
        options.set_clean_session(true);
        if let Some((user, pass)) = &self.credentials {
            options.set_credentials(user, pass);
        }
        options
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle for interacting with the transport from other components.
#[derive(Clone)]
pub struct TransportHandle {
    /// MQTT request sender.
    client: AsyncClient,

    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,

    /// Shutdown signal.
    shutdown_tx: mpsc::Sender<()>,
}

impl TransportHandle {
    /// Returns the current connection state.
    pub async fn state(&self) -> ConnectionState {
        *self.state.read().await
    }

    /// Triggers graceful shutdown.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| BridgeError::ChannelError("Failed to send shutdown signal".into()))
    }
}

#[async_trait]
impl Publisher for TransportHandle {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        debug!(topic = %topic, bytes = payload.len(), "Publishing");
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await?;
        Ok(())
    }
}

// =============================================================================
// MQTT Transport
// =============================================================================

/// MQTT transport with automatic reconnection.
///
/// ## Usage
/// ```rust,ignore
/// let config = TransportConfig::from_bridge_config(&bridge_config, router.subscriptions());
/// let (handle, mut incoming_rx) = MqttTransport::connect(config).await?;
///
/// while let Some(msg) = incoming_rx.recv().await {
///     println!("{}: {} bytes", msg.topic, msg.payload.len());
/// }
/// ```
pub struct MqttTransport {
    config: TransportConfig,
    client: AsyncClient,
    eventloop: EventLoop,
    state: Arc<RwLock<ConnectionState>>,
    incoming_tx: mpsc::Sender<InboundMessage>,
    shutdown_rx: mpsc::Receiver<()>,
}

impl MqttTransport {
    /// Connects to the broker, subscribes, and spawns the background task.
    ///
    /// Fails if the first `ConnAck` does not arrive within the connect
    /// timeout; later disconnects are retried in the background.
    pub async fn connect(
        config: TransportConfig,
    ) -> BridgeResult<(TransportHandle, mpsc::Receiver<InboundMessage>)> {
        info!(
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            "Connecting to broker"
        );

        let (client, mut eventloop) = AsyncClient::new(config.mqtt_options(), 64);
        let state = Arc::new(RwLock::new(ConnectionState::Connecting));

        // Queued until the connection is up
        for topic in &config.subscriptions {
            client.subscribe(topic.as_str(), QoS::AtMostOnce).await?;
        }

        match timeout(config.connect_timeout, Self::await_connack(&mut eventloop)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                *state.write().await = ConnectionState::Disconnected;
                return Err(e);
            }
            Err(_) => {
                *state.write().await = ConnectionState::Disconnected;
                return Err(BridgeError::Timeout(config.connect_timeout.as_secs()));
            }
        }

        *state.write().await = ConnectionState::Connected;
        info!(topics = ?config.subscriptions, "Broker connected");

        let (incoming_tx, incoming_rx) = mpsc::channel(config.channel_capacity);
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let transport = MqttTransport {
            config,
            client: client.clone(),
            eventloop,
            state: state.clone(),
            incoming_tx,
            shutdown_rx,
        };

        tokio::spawn(transport.run());

        let handle = TransportHandle {
            client,
            state,
            shutdown_tx,
        };

        Ok((handle, incoming_rx))
    }

    async fn await_connack(eventloop: &mut EventLoop) -> BridgeResult<()> {
        loop {
            match eventloop.poll().await? {
                Event::Incoming(Packet::ConnAck(ack)) => return check_connack(ack.code),
                other => debug!(?other, "Event before ConnAck"),
            }
        }
    }

    /// Main transport loop.
    async fn run(mut self) {
        let mut backoff = self.create_backoff();
        let mut retry_count = 0u32;

        loop {
            let event = tokio::select! {
                event = self.eventloop.poll() => event,
                _ = self.shutdown_rx.recv() => {
                    info!("Transport received shutdown signal");
                    self.disconnect().await;
                    break;
                }
            };

            match event {
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    debug!(topic = %publish.topic, bytes = publish.payload.len(), "Received message");
                    let message = InboundMessage::new(publish.topic, publish.payload.to_vec());
                    if self.incoming_tx.send(message).await.is_err() {
                        warn!("Incoming message receiver dropped");
                        break;
                    }
                }

                Ok(Event::Incoming(Packet::ConnAck(ack))) => match check_connack(ack.code) {
                    Ok(()) => {
                        info!("Broker reconnected");
                        *self.state.write().await = ConnectionState::Connected;
                        backoff.reset();
                        retry_count = 0;
                        self.resubscribe();
                    }
                    Err(e) => {
                        warn!(error = %e, "Broker refused reconnect");
                        *self.state.write().await = ConnectionState::Backoff;
                    }
                },

                Ok(Event::Incoming(Packet::Disconnect)) => {
                    warn!("Broker sent disconnect");
                }

                Ok(_) => {}

                Err(e) => {
                    warn!(error = %e, "Broker connection lost");
                    *self.state.write().await = ConnectionState::Backoff;

                    if self.config.max_retries > 0 {
                        retry_count += 1;
                        if retry_count >= self.config.max_retries {
                            error!(
                                max_retries = self.config.max_retries,
                                "Max reconnection attempts reached"
                            );
                            break;
                        }
                    }

                    let Some(duration) = backoff.next_backoff() else {
                        error!("Backoff exhausted");
                        break;
                    };
                    debug!(?duration, attempt = retry_count, "Waiting before reconnect");

                    tokio::select! {
                        _ = tokio::time::sleep(duration) => {
                            *self.state.write().await = ConnectionState::Reconnecting;
                        }
                        _ = self.shutdown_rx.recv() => {
                            info!("Shutdown during backoff");
                            break;
                        }
                    }
                }
            }
        }

        *self.state.write().await = ConnectionState::Disconnected;
        info!("Transport stopped");
    }

    fn resubscribe(&self) {
        for topic in &self.config.subscriptions {
            // try_ variant: this task is the one draining the request queue
            if let Err(e) = self.client.try_subscribe(topic.as_str(), QoS::AtMostOnce) {
                error!(topic = %topic, error = %e, "Failed to re-subscribe");
            }
        }
    }

    /// Sends DISCONNECT and polls until it is written or a second passes.
    async fn disconnect(&mut self) {
        if self.client.try_disconnect().is_err() {
            return;
        }

        let _ = timeout(Duration::from_secs(1), async {
            loop {
                match self.eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        })
        .await;
    }

    /// Creates the exponential backoff configuration.
    fn create_backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.config.initial_backoff,
            max_interval: self.config.max_backoff,
            multiplier: 2.0,
            max_elapsed_time: None, // No limit on total time
            ..Default::default()
        }
    }
}

/// Maps a ConnAck return code to a connection result.
fn check_connack(code: ConnectReturnCode) -> BridgeResult<()> {
    if code == ConnectReturnCode::Success {
        Ok(())
    } else {
        Err(BridgeError::ConnectionFailed(format!(
            "broker refused connection: {:?}",
            code
        )))
    }
}
