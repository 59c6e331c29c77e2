//! # Repository Module
//!
//! Database repositories for Gatekeeper.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Controller                                                             │
//! │       │  db.credentials().stage_for_id("card1")                        │
//! │       ▼                                                                 │
//! │  CredentialStore                                                        │
//! │  ├── load / replace_all        (credentials table)                      │
//! │  ├── merge_update              (credentials table, no insert)           │
//! │  └── stage_for_id / read_staged / clear_staged   (staging slot 0)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite Database                                                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`credentials::CredentialStore`] - Snapshot and staging slot

pub mod credentials;
