//! # Bridge Error Types
//!
//! Error types for bridge operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Bridge Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Transport     │  │     Protocol            │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  MalformedPayload       │ │
//! │  │  InvalidUrl     │  │  Disconnected   │  │  UnroutedTopic          │ │
//! │  │  ConfigLoad/Save│  │  Timeout, Mqtt  │  │  DuplicateRoute         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │     Remote      │  │     Store       │                              │
//! │  │                 │  │                 │                              │
//! │  │RemoteUnavailable│  │  StoreError     │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! │                                                                         │
//! │  Inside the message loop every variant is logged and dropped.          │
//! │  Only setup failures (store, first broker connect) end the process.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use gatekeeper_core::CoreError;
use gatekeeper_store::StoreError;

/// Result type alias for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Bridge error type covering all failures outside the pure core.
#[derive(Debug, Error)]
pub enum BridgeError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    /// Invalid remote directory URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach or was refused by the broker.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Broker connection dropped.
    #[error("Disconnected from broker")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// MQTT client request failed.
    #[error("MQTT error: {0}")]
    MqttError(String),

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Payload could not be interpreted.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// Message arrived on a topic with no handler.
    #[error("No route for topic: {0}")]
    UnroutedTopic(String),

    /// Two routes claim the same topic, or one route is listed twice.
    #[error("Duplicate route: {0}")]
    DuplicateRoute(String),

    // =========================================================================
    // Remote Directory Errors
    // =========================================================================
    /// Pull or push against the remote directory failed.
    #[error("Remote directory unavailable: {0}")]
    RemoteUnavailable(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    /// Credential store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Agent is shutting down.
    #[error("Bridge agent is shutting down")]
    ShuttingDown,
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<CoreError> for BridgeError {
    fn from(err: CoreError) -> Self {
        BridgeError::MalformedPayload(err.to_string())
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::MalformedPayload(err.to_string())
    }
}

impl From<url::ParseError> for BridgeError {
    fn from(err: url::ParseError) -> Self {
        BridgeError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BridgeError {
    fn from(err: toml::ser::Error) -> Self {
        BridgeError::ConfigSaveFailed(err.to_string())
    }
}

impl From<rumqttc::ClientError> for BridgeError {
    fn from(err: rumqttc::ClientError) -> Self {
        BridgeError::MqttError(err.to_string())
    }
}

impl From<rumqttc::ConnectionError> for BridgeError {
    fn from(err: rumqttc::ConnectionError) -> Self {
        BridgeError::ConnectionFailed(err.to_string())
    }
}

impl From<reqwest::Error> for BridgeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BridgeError::RemoteUnavailable(format!("request timed out: {}", err))
        } else {
            BridgeError::RemoteUnavailable(err.to_string())
        }
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl BridgeError {
    /// Returns true if the operation may succeed when retried later.
    ///
    /// ## Retryable Errors
    /// - Broker connection failures and timeouts
    /// - Remote directory outages
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BridgeError::ConnectionFailed(_)
                | BridgeError::Disconnected
                | BridgeError::Timeout(_)
                | BridgeError::MqttError(_)
                | BridgeError::RemoteUnavailable(_)
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            BridgeError::InvalidConfig(_)
                | BridgeError::InvalidUrl(_)
                | BridgeError::ConfigLoadFailed(_)
                | BridgeError::ConfigSaveFailed(_)
                | BridgeError::DuplicateRoute(_)
        )
    }

    /// Returns true if this error was caused by an inbound message.
    pub fn is_protocol_error(&self) -> bool {
        matches!(
            self,
            BridgeError::MalformedPayload(_) | BridgeError::UnroutedTopic(_)
        )
    }
}
