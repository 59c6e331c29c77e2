//! # gatekeeper-core: Pure Domain Logic for Gatekeeper
//!
//! This crate is the **heart** of Gatekeeper. It contains the credential
//! model and the two-factor session rules as pure functions with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Gatekeeper Architecture                          │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 MQTT broker (rfid / pin / sync)                 │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │      gatekeeper-bridge (router, controllers, remote directory)  │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ gatekeeper-core (THIS CRATE) ★                  │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐                  │   │
//! │  │   │   types   │  │  payload  │  │  session  │                  │   │
//! │  │   │UserRecord │  │SyncUpdate │  │AuthSession│                  │   │
//! │  │   │ Snapshot  │  │ envelope  │  │verify_pin │                  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘                  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 gatekeeper-store (SQLite layer)                 │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - `UserRecord` and `CredentialSnapshot`
//! - [`payload`] - Parsing of inbound sync-data, outbound peer envelopes
//! - [`session`] - The per-attempt two-factor state machine
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use chrono::Utc;
//! use gatekeeper_core::session::{verify_pin, AuthSession};
//! use gatekeeper_core::UserRecord;
//!
//! let record = UserRecord::with_pin("1234");
//! let mut session = AuthSession::new(None);
//!
//! session.rfid_accepted("card1", Utc::now());
//! let id = session.begin_pin_check(Utc::now()).unwrap();
//!
//! assert_eq!(id, "card1");
//! assert!(verify_pin("1234", &record).is_ok());
//! assert!(session.is_idle());
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod payload;
pub mod session;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult};
pub use payload::SyncUpdate;
pub use session::{AuthSession, AuthState, Rejection};
pub use types::{CredentialSnapshot, UserRecord};
