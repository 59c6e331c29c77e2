//! # Store Error Types
//!
//! Error types for credential store operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error) / JSON Error (serde_json::Error)           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← Adds context and categorization            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  BridgeError::Store (gatekeeper-bridge) ← logged, message dropped      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Credential store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The persisted snapshot is missing or cannot be decoded.
    ///
    /// ## When This Occurs
    /// - A stored record is not valid UserRecord JSON
    /// - The credentials table does not exist
    #[error("Credential store corrupt or missing: {0}")]
    CorruptOrMissingStore(String),

    /// A partial update named an id that is not in the snapshot.
    ///
    /// Only a full pull may add ids.
    #[error("Unknown user id: {0}")]
    UnknownUserId(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created
    /// - File permissions issue
    /// - Pool closed during shutdown
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Internal store error.
    #[error("Internal store error: {0}")]
    Internal(String),
}

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::Database (no such table) → StoreError::CorruptOrMissingStore
/// sqlx::Error::Database (other)         → StoreError::QueryFailed
/// sqlx::Error::PoolClosed / Timeout     → StoreError::ConnectionFailed
/// Other                                 → StoreError::Internal
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("no such table") {
                    StoreError::CorruptOrMissingStore(msg.to_string())
                } else {
                    StoreError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolClosed => StoreError::ConnectionFailed("Pool is closed".to_string()),

            sqlx::Error::PoolTimedOut => {
                StoreError::ConnectionFailed("Pool acquire timed out".to_string())
            }

            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::CorruptOrMissingStore(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
