//! # Error Types
//!
//! Domain-specific error types for gatekeeper-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  gatekeeper-core errors (this file)                                    │
//! │  └── CoreError        - Payloads that cannot become a record           │
//! │                                                                         │
//! │  gatekeeper-store errors (separate crate)                              │
//! │  └── StoreError       - Snapshot / staging persistence failures        │
//! │                                                                         │
//! │  gatekeeper-bridge errors (separate crate)                             │
//! │  └── BridgeError      - Config, transport, remote, dispatch            │
//! │                                                                         │
//! │  Flow: CoreError → BridgeError::MalformedPayload → logged, dropped     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rejections of an authentication attempt (unknown card, wrong PIN) are
//! not errors; see [`crate::session::Rejection`].

use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Core domain errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    /// Payload is not valid JSON or does not have the expected structure.
    ///
    /// ## When This Occurs
    /// - sync-data body is not JSON
    /// - JSON is not an object
    /// - A record field has the wrong type (e.g. `pin` is an array)
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// A required field is missing or empty.
    ///
    /// ## When This Occurs
    /// - sync-data object has no `id` and is not a single-entry envelope
    /// - `id` is an empty string
    #[error("Missing required field: {0}")]
    MissingField(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::MalformedPayload(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CoreError::MissingField("id".into());
        assert_eq!(err.to_string(), "Missing required field: id");
    }

    #[test]
    fn test_from_serde_error() {
        let err: CoreError = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert!(matches!(err, CoreError::MalformedPayload(_)));
    }
}
