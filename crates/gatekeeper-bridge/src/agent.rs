//! # Bridge Agent
//!
//! The single message loop of a node. Pulls messages off the transport one
//! at a time, routes them, and waits for each handler to finish before
//! taking the next.
//!
//! ## Agent Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        BridgeAgent Architecture                         │
//! │                                                                         │
//! │   MqttTransport ──► mpsc<InboundMessage> ──► BridgeAgent::run           │
//! │                                                  │                      │
//! │                                            Router::route                │
//! │                          ┌──────────────┬────────┴─────┬──────────────┐ │
//! │                          ▼              ▼              ▼              ▼ │
//! │                        Rfid            Pin        SyncControl     SyncData
//! │                          └──────┬───────┘              └──────┬───────┘ │
//! │                                 ▼                             ▼         │
//! │                     AuthenticationController          SyncController    │
//! │                                                                         │
//! │  Every error is logged once and counted in AgentStatus; none of them   │
//! │  stop the loop. The loop ends on shutdown or when the transport closes.│
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use gatekeeper_core::AuthState;
use gatekeeper_store::CredentialStore;

use crate::auth::{AuthOutcome, AuthenticationController};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::indicator::Indicator;
use crate::protocol::{InboundMessage, PeerTopics, Route};
use crate::remote::RemoteDirectory;
use crate::router::Router;
use crate::sync::{SyncController, SyncOutcome};
use crate::transport::{ConnectionState, Publisher, TransportHandle};

// =============================================================================
// Agent Status
// =============================================================================

/// Snapshot of the agent's counters and state.
#[derive(Debug, Clone)]
pub struct AgentStatus {
    /// Transport connection state.
    pub connection_state: ConnectionState,

    /// Current authentication session.
    pub session: AuthState,

    /// PIN checks that passed.
    pub accepted: u64,

    /// RFID or PIN steps that were rejected.
    pub rejected: u64,

    pub pulls: u64,
    pub pushes: u64,
    pub merges: u64,

    /// Messages dropped as malformed or unrouted.
    pub malformed: u64,

    /// Store, remote and other handler failures.
    pub errors: u64,

    pub last_pull: Option<DateTime<Utc>>,
    pub last_push: Option<DateTime<Utc>>,

    /// Last error message (if any).
    pub last_error: Option<String>,
}

impl Default for AgentStatus {
    fn default() -> Self {
        AgentStatus {
            connection_state: ConnectionState::Disconnected,
            session: AuthState::Idle,
            accepted: 0,
            rejected: 0,
            pulls: 0,
            pushes: 0,
            merges: 0,
            malformed: 0,
            errors: 0,
            last_pull: None,
            last_push: None,
            last_error: None,
        }
    }
}

/// What handling one message produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    Auth(AuthOutcome),
    Sync(SyncOutcome),
}

// =============================================================================
// Bridge Agent
// =============================================================================

/// Routes inbound messages to the authentication and sync controllers.
pub struct BridgeAgent {
    router: Router,
    auth: AuthenticationController,
    sync: SyncController,
    status: Arc<RwLock<AgentStatus>>,
}

impl BridgeAgent {
    pub fn new(router: Router, auth: AuthenticationController, sync: SyncController) -> Self {
        BridgeAgent {
            router,
            auth,
            sync,
            status: Arc::new(RwLock::new(AgentStatus::default())),
        }
    }

    /// Wires the controllers from configuration and the collaborators built
    /// at startup.
    pub fn from_config(
        config: &BridgeConfig,
        store: CredentialStore,
        remote: Arc<dyn RemoteDirectory>,
        indicator: Arc<dyn Indicator>,
        publisher: Arc<dyn Publisher>,
    ) -> BridgeResult<Self> {
        let router = Router::from_topics(&config.topics)?;

        let auth = AuthenticationController::new(
            store.clone(),
            indicator,
            publisher,
            PeerTopics::from_config(config),
            config.indicator_hold(),
            config.attempt_timeout(),
        );
        let sync = SyncController::new(store, remote, config.flags.clone());

        Ok(Self::new(router, auth, sync))
    }

    /// Topics the transport must subscribe to.
    pub fn subscriptions(&self) -> Vec<String> {
        self.router.subscriptions()
    }

    /// Returns the current status.
    pub async fn status(&self) -> AgentStatus {
        self.status.read().await.clone()
    }

    /// Routes one message and runs its handler to completion.
    pub async fn dispatch(&mut self, message: &InboundMessage) -> BridgeResult<MessageOutcome> {
        let route = self.router.route(&message.topic)?;
        debug!(topic = %message.topic, route = %route, "Dispatching message");

        let outcome = match route {
            Route::Rfid => MessageOutcome::Auth(self.auth.handle_rfid(&message.payload).await?),
            Route::Pin => MessageOutcome::Auth(self.auth.handle_pin(&message.payload).await?),
            Route::SyncControl => {
                MessageOutcome::Sync(self.sync.handle_control(&message.payload).await?)
            }
            Route::SyncData => {
                MessageOutcome::Sync(self.sync.handle_data(&message.payload).await?)
            }
        };

        Ok(outcome)
    }

    /// Dispatches a message, logs any failure once, and updates the status.
    pub async fn handle(&mut self, message: &InboundMessage) -> Option<MessageOutcome> {
        let result = self.dispatch(message).await;

        let mut status = self.status.write().await;
        status.session = self.auth.session_state().clone();

        match result {
            Ok(outcome) => {
                record_outcome(&mut status, &outcome);
                Some(outcome)
            }
            Err(e) => {
                warn!(topic = %message.topic, error = %e, "Message handling failed");
                if e.is_protocol_error() {
                    status.malformed += 1;
                } else {
                    status.errors += 1;
                }
                status.last_error = Some(e.to_string());
                None
            }
        }
    }

    /// Spawns the message loop.
    ///
    /// The returned task resolves to the final status once the loop stops.
    pub fn spawn(
        self,
        incoming_rx: mpsc::Receiver<InboundMessage>,
        transport: Option<TransportHandle>,
    ) -> (BridgeAgentHandle, JoinHandle<AgentStatus>) {
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        let handle = BridgeAgentHandle {
            shutdown_tx,
            status: self.status.clone(),
            transport,
        };

        let task = tokio::spawn(self.run(incoming_rx, shutdown_rx));
        (handle, task)
    }

    /// Main message loop.
    async fn run(
        mut self,
        mut incoming_rx: mpsc::Receiver<InboundMessage>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) -> AgentStatus {
        info!(topics = ?self.router.subscriptions(), "Bridge agent started");

        loop {
            tokio::select! {
                Some(()) = shutdown_rx.recv() => {
                    info!("Bridge agent received shutdown signal");
                    break;
                }
                message = incoming_rx.recv() => {
                    match message {
                        Some(message) => {
                            self.handle(&message).await;
                        }
                        None => {
                            info!("Transport channel closed");
                            break;
                        }
                    }
                }
            }
        }

        let status = self.status().await;
        info!(
            accepted = status.accepted,
            rejected = status.rejected,
            pulls = status.pulls,
            pushes = status.pushes,
            merges = status.merges,
            malformed = status.malformed,
            errors = status.errors,
            "Bridge agent stopped"
        );
        status
    }
}

fn record_outcome(status: &mut AgentStatus, outcome: &MessageOutcome) {
    match outcome {
        MessageOutcome::Auth(AuthOutcome::Accepted { .. }) => status.accepted += 1,
        MessageOutcome::Auth(AuthOutcome::Rejected(_)) => status.rejected += 1,
        MessageOutcome::Auth(AuthOutcome::RfidAccepted { .. }) => {}
        MessageOutcome::Sync(SyncOutcome::Pulled { .. }) => {
            status.pulls += 1;
            status.last_pull = Some(Utc::now());
        }
        MessageOutcome::Sync(SyncOutcome::Pushed { .. }) => {
            status.pushes += 1;
            status.last_push = Some(Utc::now());
        }
        MessageOutcome::Sync(SyncOutcome::Merged { .. }) => status.merges += 1,
        MessageOutcome::Sync(SyncOutcome::Skipped { .. } | SyncOutcome::Ignored { .. }) => {}
    }
}

// =============================================================================
// Agent Handle
// =============================================================================

/// Handle for querying and stopping a spawned agent.
#[derive(Clone)]
pub struct BridgeAgentHandle {
    shutdown_tx: mpsc::Sender<()>,
    status: Arc<RwLock<AgentStatus>>,
    transport: Option<TransportHandle>,
}

impl BridgeAgentHandle {
    /// Returns the current status, including the live connection state.
    pub async fn status(&self) -> AgentStatus {
        let mut status = self.status.read().await.clone();
        if let Some(ref transport) = self.transport {
            status.connection_state = transport.state().await;
        }
        status
    }

    /// Stops the message loop, then the transport.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        info!("Shutting down bridge agent");

        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| BridgeError::ShuttingDown)?;

        if let Some(ref transport) = self.transport {
            if let Err(e) = transport.shutdown().await {
                debug!(error = %e, "Transport already stopped");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::IndicatorSignal;
    use crate::testing::{
        memory_store, RecordingIndicator, RecordingPublisher, ScriptedRemote,
    };
    use gatekeeper_core::{CredentialSnapshot, UserRecord};

    struct Fixture {
        agent: BridgeAgent,
        store: CredentialStore,
        indicator: Arc<RecordingIndicator>,
        publisher: Arc<RecordingPublisher>,
    }

    async fn fixture(remote: ScriptedRemote) -> Fixture {
        let (_db, store) = memory_store().await;
        let mut snapshot = CredentialSnapshot::new();
        snapshot.insert("card1".into(), UserRecord::with_pin("1234"));
        store.replace_all(&snapshot).await.unwrap();

        let mut config = BridgeConfig::default();
        config.indicator.hold_ms = 1;

        let indicator = Arc::new(RecordingIndicator::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let agent = BridgeAgent::from_config(
            &config,
            store.clone(),
            Arc::new(remote),
            indicator.clone(),
            publisher.clone(),
        )
        .unwrap();

        Fixture {
            agent,
            store,
            indicator,
            publisher,
        }
    }

    #[tokio::test]
    async fn test_dispatch_routes_by_topic() {
        let mut f = fixture(ScriptedRemote::default()).await;

        let outcome = f
            .agent
            .dispatch(&InboundMessage::new("rfid-identifier", "card1"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Auth(AuthOutcome::RfidAccepted { .. })
        ));

        let outcome = f
            .agent
            .dispatch(&InboundMessage::new("sync-control-flag", "noop"))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            MessageOutcome::Sync(SyncOutcome::Ignored { .. })
        ));
    }

    #[tokio::test]
    async fn test_unrouted_topic() {
        let mut f = fixture(ScriptedRemote::default()).await;

        let err = f
            .agent
            .dispatch(&InboundMessage::new("peer-result-data", "{}"))
            .await
            .unwrap_err();
        assert!(matches!(err, BridgeError::UnroutedTopic(_)));

        assert!(f
            .agent
            .handle(&InboundMessage::new("peer-result-data", "{}"))
            .await
            .is_none());
        assert_eq!(f.agent.status().await.malformed, 1);
    }

    #[tokio::test]
    async fn test_status_counters() {
        let mut f = fixture(ScriptedRemote::default()).await;

        f.agent
            .handle(&InboundMessage::new("rfid-identifier", "card1"))
            .await;
        assert!(matches!(
            f.agent.status().await.session,
            AuthState::RfidVerified { .. }
        ));

        f.agent.handle(&InboundMessage::new("pin-entry", "1234")).await;
        f.agent.handle(&InboundMessage::new("pin-entry", "1234")).await;
        f.agent.handle(&InboundMessage::new("sync-data", "{")).await;
        f.agent
            .handle(&InboundMessage::new("sync-data", r#"{"card9":{"pin":"1"}}"#))
            .await;
        f.agent
            .handle(&InboundMessage::new("sync-control-flag", "push-start"))
            .await;

        let status = f.agent.status().await;
        assert_eq!(status.session, AuthState::Idle);
        assert_eq!(status.accepted, 1);
        assert_eq!(status.rejected, 1);
        assert_eq!(status.malformed, 1);
        assert_eq!(status.errors, 1);
        assert_eq!(status.pushes, 1);
        assert!(status.last_push.is_some());
        assert!(status.last_error.is_some());
    }

    #[tokio::test]
    async fn test_spawned_loop_processes_in_order() {
        let f = fixture(ScriptedRemote::default()).await;
        let indicator = f.indicator.clone();
        let publisher = f.publisher.clone();
        let store = f.store.clone();

        let (tx, rx) = mpsc::channel(16);
        let (handle, task) = f.agent.spawn(rx, None);

        tx.send(InboundMessage::new("rfid-identifier", "card1")).await.unwrap();
        tx.send(InboundMessage::new("sync-data", "not json")).await.unwrap();
        tx.send(InboundMessage::new("pin-entry", "1234")).await.unwrap();
        drop(tx);

        let status = task.await.unwrap();
        assert_eq!(status.accepted, 1);
        assert_eq!(status.malformed, 1);
        assert_eq!(
            indicator.signals(),
            vec![IndicatorSignal::RfidAccepted, IndicatorSignal::PinAccepted]
        );
        assert_eq!(publisher.published().len(), 2);
        assert!(store.read_staged().await.unwrap().is_none());

        // Loop already gone
        assert!(handle.shutdown().await.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_stops_loop() {
        let f = fixture(ScriptedRemote::default()).await;
        let (_tx, rx) = mpsc::channel(16);
        let (handle, task) = f.agent.spawn(rx, None);

        handle.shutdown().await.unwrap();
        let status = task.await.unwrap();
        assert_eq!(status.connection_state, ConnectionState::Disconnected);
        assert_eq!(handle.status().await.accepted, 0);
    }
}
