//! # gatekeeper-bridge: Message Bridge for Gatekeeper
//!
//! This crate connects an access point's RFID reader and PIN keypad to the
//! local credential store, the paired peer node, and the remote credential
//! directory.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Bridge Architecture                              │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                    BridgeAgent (message loop)                    │  │
//! │  │                                                                  │  │
//! │  │  One inbound message at a time, routed by topic                  │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │         ┌─────────────────────┼─────────────────────┐                  │
//! │         ▼                     ▼                     ▼                   │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────┐    │
//! │  │ MqttTransport  │  │ Authentication │  │  SyncController        │    │
//! │  │                │  │ Controller     │  │                        │    │
//! │  │ rumqttc with   │  │ RFID + PIN     │  │ pull / merge / push    │    │
//! │  │ auto-reconnect │  │ session, LEDs, │  │ against the remote     │    │
//! │  │ & backoff      │  │ peer publish   │  │ directory              │    │
//! │  └────────────────┘  └────────────────┘  └────────────────────────┘    │
//! │                               │                     │                   │
//! │                               ▼                     ▼                   │
//! │                    ┌────────────────────┐  ┌────────────────────────┐  │
//! │                    │ gatekeeper-store   │  │ FirebaseDirectory      │  │
//! │                    │ snapshot + staging │  │ (REST, reqwest)        │  │
//! │                    └────────────────────┘  └────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`agent`] - Main `BridgeAgent` message loop and status
//! - [`auth`] - RFID + PIN authentication controller
//! - [`config`] - Node configuration (TOML + environment)
//! - [`error`] - Bridge error types
//! - [`indicator`] - Feedback signal output
//! - [`protocol`] - Topics, inbound messages and control flags
//! - [`remote`] - Remote credential directory
//! - [`router`] - Topic dispatch table
//! - [`sync`] - Snapshot synchronization controller
//! - [`transport`] - MQTT client with reconnection
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatekeeper_bridge::{
//!     remote, BridgeAgent, BridgeConfig, LogIndicator, MqttTransport, Router, TransportConfig,
//! };
//!
//! let config = BridgeConfig::load(None)?;
//! let router = Router::from_topics(&config.topics)?;
//! let (transport, incoming_rx) =
//!     MqttTransport::connect(TransportConfig::from_bridge_config(&config, router.subscriptions())).await?;
//!
//! let agent = BridgeAgent::from_config(
//!     &config,
//!     db.credentials(),
//!     remote::from_settings(&config.remote)?,
//!     Arc::new(LogIndicator),
//!     Arc::new(transport.clone()),
//! )?;
//! let (handle, task) = agent.spawn(incoming_rx, Some(transport));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod agent;
pub mod auth;
pub mod config;
pub mod error;
pub mod indicator;
pub mod protocol;
pub mod remote;
pub mod router;
pub mod sync;
pub mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use agent::{AgentStatus, BridgeAgent, BridgeAgentHandle, MessageOutcome};
pub use auth::{AuthOutcome, AuthenticationController};
pub use config::{BridgeConfig, LogFormat};
pub use error::{BridgeError, BridgeResult};
pub use indicator::{Indicator, IndicatorSignal, LogIndicator};
pub use protocol::{InboundMessage, PeerTopics, Route};
pub use remote::{DisabledDirectory, FirebaseDirectory, RemoteDirectory};
pub use router::Router;
pub use sync::{SyncController, SyncOutcome};
pub use transport::{ConnectionState, MqttTransport, Publisher, TransportConfig, TransportHandle};
