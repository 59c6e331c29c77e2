//! # Bridge Protocol
//!
//! Message shapes exchanged over the broker.
//!
//! ## Topics
//! ```text
//! ┌──────────────────┬──────────┬────────────────────────────┬──────────────────────────┐
//! │ Topic            │ Dir      │ Payload                    │ Meaning                  │
//! ├──────────────────┼──────────┼────────────────────────────┼──────────────────────────┤
//! │ rfid             │ in       │ id (UTF-8, exact)          │ card presented           │
//! │ pin              │ in       │ digits (UTF-8)             │ PIN entered              │
//! │ sync_control     │ in       │ pull_start | push_start    │ sync trigger             │
//! │ sync_data        │ in       │ JSON record update         │ partial credential update│
//! │ peer_result_data │ out      │ {"<id>": <record>}         │ verified record          │
//! │ peer_result_flag │ out      │ transfer_complete          │ record transfer done     │
//! └──────────────────┴──────────┴────────────────────────────┴──────────────────────────┘
//! ```
//!
//! No rejection detail is ever published; failures surface only on the
//! indicator.

use crate::config::{BridgeConfig, FlagSettings};
use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Inbound Message
// =============================================================================

/// A message delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

impl InboundMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        InboundMessage {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Interprets a payload as UTF-8.
pub fn payload_text(payload: &[u8]) -> BridgeResult<&str> {
    std::str::from_utf8(payload)
        .map_err(|e| BridgeError::MalformedPayload(format!("payload is not UTF-8: {}", e)))
}

// =============================================================================
// Routes
// =============================================================================

/// Handler a topic is dispatched to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Rfid,
    Pin,
    SyncControl,
    SyncData,
}

impl Route {
    pub const ALL: [Route; 4] = [Route::Rfid, Route::Pin, Route::SyncControl, Route::SyncData];
}

impl std::fmt::Display for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Route::Rfid => write!(f, "rfid"),
            Route::Pin => write!(f, "pin"),
            Route::SyncControl => write!(f, "sync_control"),
            Route::SyncData => write!(f, "sync_data"),
        }
    }
}

// =============================================================================
// Control Flags
// =============================================================================

/// A parsed sync-control flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFlag {
    PullStart,
    PushStart,
    Unknown(String),
}

impl ControlFlag {
    /// Matches text exactly against the configured flag values.
    pub fn parse(text: &str, flags: &FlagSettings) -> Self {
        if text == flags.pull_start {
            ControlFlag::PullStart
        } else if text == flags.push_start {
            ControlFlag::PushStart
        } else {
            ControlFlag::Unknown(text.to_string())
        }
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Where a verified record is forwarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeerTopics {
    pub data_topic: String,
    pub flag_topic: String,
    /// Payload of the flag message.
    pub marker: String,
}

impl PeerTopics {
    pub fn from_config(config: &BridgeConfig) -> Self {
        PeerTopics {
            data_topic: config.topics.peer_result_data.clone(),
            flag_topic: config.topics.peer_result_flag.clone(),
            marker: config.flags.transfer_complete.clone(),
        }
    }
}
