//! # gatekeeper-store: Credential Store for Gatekeeper
//!
//! This crate persists the local credential snapshot and the single-entry
//! staging slot. It uses SQLite with sqlx for async operations.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gatekeeper Data Flow                             │
//! │                                                                         │
//! │  AuthenticationController / SyncController                             │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                  gatekeeper-store (THIS CRATE)                  │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌──────────────────┐  ┌──────────────┐  │   │
//! │  │   │   Database    │    │ CredentialStore  │  │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ load/replace_all │  │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ stage/merge      │  │ 001_creds.sql│  │   │
//! │  │   └───────────────┘    └──────────────────┘  └──────────────┘  │   │
//! │  │                                                                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     SQLite Database                             │   │
//! │  │   credentials (id → record)      staging (slot 0)               │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Store error types
//! - [`repository`] - The credential repository
//!
//! ## Usage
//!
//! ```rust,ignore
//! use gatekeeper_store::{Database, StoreConfig};
//!
//! let db = Database::new(StoreConfig::new("credentials.db")).await?;
//!
//! let store = db.credentials();
//! if let Some(record) = store.stage_for_id("card1").await? {
//!     // record is now in the staging slot
//! }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{StoreError, StoreResult};
pub use pool::{Database, StoreConfig};
pub use repository::credentials::{CredentialStore, StagedRecord};
