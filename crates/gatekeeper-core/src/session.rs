//! # Authentication Session
//!
//! The per-attempt two-factor state machine.
//!
//! ## State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────┐      RFID found       ┌──────────────┐                       │
//! │   │ Idle │ ────────────────────► │ RfidVerified │ ◄── RFID found        │
//! │   └──────┘                       └──────────────┘     (last one wins)   │
//! │      ▲                              │        │                          │
//! │      │         any PIN message      │        │                          │
//! │      ├──────────────────────────────┘        │                          │
//! │      │         RFID miss                     │                          │
//! │      └───────────────────────────────────────┘                          │
//! │                                                                         │
//! │   PIN while Idle → Rejection::NoActiveSession                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A PIN is checked at most once per RFID presentation: `begin_pin_check`
//! always returns the session to `Idle`, whatever the outcome.
//!
//! The staged record itself lives in the credential store so the RFID and
//! PIN steps stay decoupled; this type only tracks which id is pending.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::types::UserRecord;

// =============================================================================
// Rejection
// =============================================================================

/// Why an authentication step did not succeed.
///
/// These are ordinary outcomes, surfaced only through the indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// RFID id is not in the snapshot.
    LookupMiss,
    /// Entered PIN does not match the staged record.
    VerificationMismatch,
    /// PIN arrived with no RFID presentation pending.
    NoActiveSession,
    /// PIN arrived after the configured attempt timeout.
    AttemptExpired,
    /// Session was pending but the staging slot was empty, unreadable or
    /// held a different id.
    StagedRecordMissing,
}

impl Rejection {
    /// Rejections that are expected during normal use.
    pub fn is_routine(&self) -> bool {
        matches!(self, Rejection::LookupMiss | Rejection::VerificationMismatch)
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Rejection::LookupMiss => "rfid id not found",
            Rejection::VerificationMismatch => "pin mismatch",
            Rejection::NoActiveSession => "no rfid presentation pending",
            Rejection::AttemptExpired => "attempt expired",
            Rejection::StagedRecordMissing => "staged record missing",
        };
        f.write_str(text)
    }
}

// =============================================================================
// Session State
// =============================================================================

/// Current step of the attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AuthState {
    Idle,
    RfidVerified {
        rfid_id: String,
        staged_at: DateTime<Utc>,
    },
}

/// Per-attempt scratch state, owned by the authentication controller.
#[derive(Debug, Clone)]
pub struct AuthSession {
    state: AuthState,
    attempt_timeout: Option<Duration>,
}

impl AuthSession {
    /// Creates an idle session. `attempt_timeout` of `None` waits forever
    /// for the PIN.
    pub fn new(attempt_timeout: Option<Duration>) -> Self {
        AuthSession {
            state: AuthState::Idle,
            attempt_timeout,
        }
    }

    pub fn state(&self) -> &AuthState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, AuthState::Idle)
    }

    /// Records a successful RFID lookup. Replaces any pending attempt.
    pub fn rfid_accepted(&mut self, rfid_id: impl Into<String>, now: DateTime<Utc>) {
        self.state = AuthState::RfidVerified {
            rfid_id: rfid_id.into(),
            staged_at: now,
        };
    }

    /// Records a failed RFID lookup.
    ///
    /// Returns true if a pending attempt was abandoned, in which case the
    /// caller should also discard the staged record.
    pub fn rfid_rejected(&mut self) -> bool {
        let abandoned = !self.is_idle();
        self.state = AuthState::Idle;
        abandoned
    }

    /// Consumes the pending attempt for a PIN check.
    ///
    /// Always leaves the session `Idle`. Returns the id whose staged record
    /// should be compared against the entered PIN.
    pub fn begin_pin_check(&mut self, now: DateTime<Utc>) -> Result<String, Rejection> {
        match std::mem::replace(&mut self.state, AuthState::Idle) {
            AuthState::Idle => Err(Rejection::NoActiveSession),
            AuthState::RfidVerified { rfid_id, staged_at } => {
                if let Some(timeout) = self.attempt_timeout {
                    // Clock going backwards counts as zero elapsed
                    let elapsed = now
                        .signed_duration_since(staged_at)
                        .to_std()
                        .unwrap_or(Duration::ZERO);
                    if elapsed > timeout {
                        return Err(Rejection::AttemptExpired);
                    }
                }
                Ok(rfid_id)
            }
        }
    }

    /// Drops any pending attempt.
    pub fn reset(&mut self) {
        self.state = AuthState::Idle;
    }
}

// =============================================================================
// PIN Verification
// =============================================================================

/// Compares an entered PIN against a record with exact string equality.
///
/// A record without a PIN never verifies.
pub fn verify_pin(entered: &str, record: &UserRecord) -> Result<(), Rejection> {
    if record.has_pin() && entered == record.pin {
        Ok(())
    } else {
        Err(Rejection::VerificationMismatch)
    }
}
