//! # Authentication Controller
//!
//! Drives the two-factor sequence: an RFID presentation stages the card's
//! record, the next PIN entry is checked against it exactly once.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Two-Factor Sequence                                 │
//! │                                                                         │
//! │  rfid-identifier ─► stage_for_id ─┬─ hit  ─► RfidVerified   (rfid ok)   │
//! │                                   └─ miss ─► Idle           (error)     │
//! │                                                                         │
//! │  pin-entry ─► begin_pin_check ─┬─ Idle / expired ──────────► (error)    │
//! │                                └─ read_staged, clear_staged             │
//! │                                        │                                │
//! │                                 verify_pin                              │
//! │                                   ├─ match ─► (pin ok) ─► publish       │
//! │                                   │            peer-result-data         │
//! │                                   │            peer-result-flag         │
//! │                                   └─ mismatch ─────────────► (error)    │
//! │                                                                         │
//! │  Every PIN check leaves the session Idle and the staging slot empty.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Rejections never reach the transport; they only fire the indicator.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use gatekeeper_core::payload::envelope;
use gatekeeper_core::session::verify_pin;
use gatekeeper_core::{AuthSession, AuthState, Rejection, UserRecord};
use gatekeeper_store::CredentialStore;

use crate::error::BridgeResult;
use crate::indicator::{Indicator, IndicatorSignal};
use crate::protocol::{payload_text, PeerTopics};
use crate::transport::Publisher;

/// Terminal result of one authentication step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Card found and staged; waiting for the PIN.
    RfidAccepted { rfid_id: String },
    /// PIN matched. `forwarded` is false if publishing to the peer failed.
    Accepted { rfid_id: String, forwarded: bool },
    /// Step rejected; the indicator showed an error.
    Rejected(Rejection),
}

/// Owns the authentication session and reacts to `rfid` and `pin` messages.
pub struct AuthenticationController {
    store: CredentialStore,
    session: AuthSession,
    indicator: Arc<dyn Indicator>,
    publisher: Arc<dyn Publisher>,
    peer: PeerTopics,
    hold: Duration,
}

impl AuthenticationController {
    pub fn new(
        store: CredentialStore,
        indicator: Arc<dyn Indicator>,
        publisher: Arc<dyn Publisher>,
        peer: PeerTopics,
        hold: Duration,
        attempt_timeout: Option<Duration>,
    ) -> Self {
        AuthenticationController {
            store,
            session: AuthSession::new(attempt_timeout),
            indicator,
            publisher,
            peer,
            hold,
        }
    }

    pub fn session_state(&self) -> &AuthState {
        self.session.state()
    }

    // =========================================================================
    // RFID
    // =========================================================================

    /// Handles an RFID presentation.
    ///
    /// A hit replaces any pending attempt (last card wins). A miss abandons
    /// the pending attempt and empties the staging slot.
    pub async fn handle_rfid(&mut self, payload: &[u8]) -> BridgeResult<AuthOutcome> {
        let rfid_id = match payload_text(payload) {
            Ok(text) => text.to_string(),
            Err(e) => {
                self.pulse(IndicatorSignal::Error).await;
                return Err(e);
            }
        };

        let staged = if rfid_id.is_empty() {
            None
        } else {
            match self.store.stage_for_id(&rfid_id).await {
                Ok(staged) => staged,
                Err(e) => {
                    self.pulse(IndicatorSignal::Error).await;
                    return Err(e.into());
                }
            }
        };

        if staged.is_some() {
            if !self.session.is_idle() {
                debug!(rfid_id = %rfid_id, "Replacing pending attempt");
            }
            self.session.rfid_accepted(rfid_id.as_str(), Utc::now());
            info!(rfid_id = %rfid_id, "RFID accepted");
            self.pulse(IndicatorSignal::RfidAccepted).await;
            return Ok(AuthOutcome::RfidAccepted { rfid_id });
        }

        if self.session.rfid_rejected() {
            debug!("Pending attempt abandoned");
            self.discard_staged().await;
        }
        info!(rfid_id = %rfid_id, "RFID rejected: {}", Rejection::LookupMiss);
        self.pulse(IndicatorSignal::Error).await;
        Ok(AuthOutcome::Rejected(Rejection::LookupMiss))
    }

    // =========================================================================
    // PIN
    // =========================================================================

    /// Handles a PIN entry. Consumes the pending attempt whatever the result.
    pub async fn handle_pin(&mut self, payload: &[u8]) -> BridgeResult<AuthOutcome> {
        let entered = match payload_text(payload) {
            Ok(text) => text,
            Err(e) => {
                if !self.session.is_idle() {
                    self.session.reset();
                    self.discard_staged().await;
                }
                self.pulse(IndicatorSignal::Error).await;
                return Err(e);
            }
        };
        debug!(pin_len = entered.len(), "PIN received");

        let rfid_id = match self.session.begin_pin_check(Utc::now()) {
            Ok(id) => id,
            Err(rejection) => {
                if rejection == Rejection::AttemptExpired {
                    self.discard_staged().await;
                }
                return self.reject(None, rejection).await;
            }
        };

        let staged = self.store.read_staged().await;
        self.discard_staged().await;

        let staged = match staged {
            Ok(staged) => staged,
            Err(e) => {
                self.pulse(IndicatorSignal::Error).await;
                return Err(e.into());
            }
        };

        let record = match staged {
            Some(staged) if staged.id == rfid_id => staged.record,
            Some(staged) => {
                debug!(staged_id = %staged.id, "Staged record belongs to another card");
                return self
                    .reject(Some(&rfid_id), Rejection::StagedRecordMissing)
                    .await;
            }
            None => {
                return self
                    .reject(Some(&rfid_id), Rejection::StagedRecordMissing)
                    .await
            }
        };

        if let Err(rejection) = verify_pin(entered, &record) {
            return self.reject(Some(&rfid_id), rejection).await;
        }

        info!(rfid_id = %rfid_id, "PIN accepted");
        self.pulse(IndicatorSignal::PinAccepted).await;
        let forwarded = self.forward(&rfid_id, &record).await;

        Ok(AuthOutcome::Accepted { rfid_id, forwarded })
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Publishes the verified record, then the transfer marker.
    async fn forward(&self, rfid_id: &str, record: &UserRecord) -> bool {
        let body = match envelope(rfid_id, record) {
            Ok(body) => body,
            Err(e) => {
                warn!(rfid_id = %rfid_id, error = %e, "Failed to encode verified record");
                return false;
            }
        };

        if let Err(e) = self
            .publisher
            .publish(&self.peer.data_topic, body.into_bytes())
            .await
        {
            warn!(rfid_id = %rfid_id, error = %e, "Failed to forward verified record");
            return false;
        }

        if let Err(e) = self
            .publisher
            .publish(&self.peer.flag_topic, self.peer.marker.clone().into_bytes())
            .await
        {
            warn!(rfid_id = %rfid_id, error = %e, "Failed to publish transfer marker");
            return false;
        }

        debug!(rfid_id = %rfid_id, topic = %self.peer.data_topic, "Verified record forwarded");
        true
    }

    async fn reject(
        &self,
        rfid_id: Option<&str>,
        rejection: Rejection,
    ) -> BridgeResult<AuthOutcome> {
        let rfid_id = rfid_id.unwrap_or("-");
        if rejection.is_routine() {
            info!(rfid_id = %rfid_id, "PIN rejected: {}", rejection);
        } else {
            warn!(rfid_id = %rfid_id, "PIN rejected: {}", rejection);
        }
        self.pulse(IndicatorSignal::Error).await;
        Ok(AuthOutcome::Rejected(rejection))
    }

    async fn discard_staged(&self) {
        if let Err(e) = self.store.clear_staged().await {
            warn!(error = %e, "Failed to clear staging slot");
        }
    }

    async fn pulse(&self, signal: IndicatorSignal) {
        self.indicator.pulse(signal, self.hold).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BridgeError;
    use crate::testing::{memory_store, peer, RecordingIndicator, RecordingPublisher, HOLD};
    use gatekeeper_core::CredentialSnapshot;

    struct Fixture {
        controller: AuthenticationController,
        store: CredentialStore,
        indicator: Arc<RecordingIndicator>,
        publisher: Arc<RecordingPublisher>,
    }

    async fn fixture_with(
        publisher: RecordingPublisher,
        attempt_timeout: Option<Duration>,
    ) -> Fixture {
        let (_db, store) = memory_store().await;
        let mut snapshot = CredentialSnapshot::new();
        snapshot.insert("card1".into(), UserRecord::with_pin("1234"));
        snapshot.insert("card2".into(), UserRecord::with_pin("5678").field("name", "Ada"));
        store.replace_all(&snapshot).await.unwrap();

        let indicator = Arc::new(RecordingIndicator::default());
        let publisher = Arc::new(publisher);
        let controller = AuthenticationController::new(
            store.clone(),
            indicator.clone(),
            publisher.clone(),
            peer(),
            HOLD,
            attempt_timeout,
        );

        Fixture {
            controller,
            store,
            indicator,
            publisher,
        }
    }

    async fn fixture() -> Fixture {
        fixture_with(RecordingPublisher::default(), None).await
    }

    #[tokio::test]
    async fn test_rfid_then_matching_pin() {
        let mut f = fixture().await;

        let outcome = f.controller.handle_rfid(b"card1").await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::RfidAccepted {
                rfid_id: "card1".into()
            }
        );
        assert!(!f.controller.session_state().eq(&AuthState::Idle));

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Accepted {
                rfid_id: "card1".into(),
                forwarded: true
            }
        );

        assert_eq!(
            f.indicator.signals(),
            vec![IndicatorSignal::RfidAccepted, IndicatorSignal::PinAccepted]
        );
        assert_eq!(
            f.publisher.published(),
            vec![
                (
                    "peer-result-data".to_string(),
                    r#"{"card1":{"pin":"1234"}}"#.to_string()
                ),
                ("peer-result-flag".to_string(), "transfer-complete".to_string()),
            ]
        );
        assert!(f.store.read_staged().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rfid_id_is_opaque() {
        let mut f = fixture().await;
        let outcome = f.controller.handle_rfid(b" card1\n").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::LookupMiss));
        assert!(f.controller.session_state().eq(&AuthState::Idle));
    }

    #[tokio::test]
    async fn test_pin_with_trailing_newline_is_rejected() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        let outcome = f.controller.handle_pin(b"1234\n").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::VerificationMismatch));
        assert!(f.publisher.published().is_empty());
        assert!(f.store.read_staged().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unknown_rfid() {
        let mut f = fixture().await;

        let outcome = f.controller.handle_rfid(b"unknown").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::LookupMiss));
        assert_eq!(f.indicator.signals(), vec![IndicatorSignal::Error]);
        assert!(f.controller.session_state().eq(&AuthState::Idle));
        assert!(f.store.read_staged().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_empty_rfid_is_miss() {
        let mut f = fixture().await;
        let outcome = f.controller.handle_rfid(b"  ").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::LookupMiss));
    }

    #[tokio::test]
    async fn test_miss_after_hit_discards_staging() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        f.controller.handle_rfid(b"unknown").await.unwrap();
        assert!(f.store.read_staged().await.unwrap().is_none());

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::NoActiveSession));
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_pin_consumes_session() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        let outcome = f.controller.handle_pin(b"0000").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::VerificationMismatch));

        // No retry without a new presentation
        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::NoActiveSession));

        assert_eq!(
            f.indicator.signals(),
            vec![
                IndicatorSignal::RfidAccepted,
                IndicatorSignal::Error,
                IndicatorSignal::Error
            ]
        );
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_pin_without_rfid() {
        let mut f = fixture().await;
        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::NoActiveSession));
        assert_eq!(f.indicator.signals(), vec![IndicatorSignal::Error]);
    }

    #[tokio::test]
    async fn test_last_rfid_wins() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        f.controller.handle_rfid(b"card2").await.unwrap();

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::VerificationMismatch));

        f.controller.handle_rfid(b"card1").await.unwrap();
        f.controller.handle_rfid(b"card2").await.unwrap();
        let outcome = f.controller.handle_pin(b"5678").await.unwrap();
        assert_eq!(
            outcome,
            AuthOutcome::Accepted {
                rfid_id: "card2".into(),
                forwarded: true
            }
        );

        let published = f.publisher.published();
        assert_eq!(published.len(), 2);
        assert_eq!(published[0].1, r#"{"card2":{"name":"Ada","pin":"5678"}}"#);
    }

    #[tokio::test]
    async fn test_staging_cleared_externally() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        f.store.clear_staged().await.unwrap();

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::StagedRecordMissing));
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_staging_for_other_card() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        f.store.stage_for_id("card2").await.unwrap();

        let outcome = f.controller.handle_pin(b"5678").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::StagedRecordMissing));
    }

    #[tokio::test]
    async fn test_expired_attempt() {
        let mut f = fixture_with(RecordingPublisher::default(), Some(Duration::ZERO)).await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::AttemptExpired));
        assert!(f.store.read_staged().await.unwrap().is_none());
        assert!(f.publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_still_accepts() {
        let mut f = fixture_with(RecordingPublisher::failing(), None).await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        let outcome = f.controller.handle_pin(b"1234").await.unwrap();

        assert_eq!(
            outcome,
            AuthOutcome::Accepted {
                rfid_id: "card1".into(),
                forwarded: false
            }
        );
        assert!(f.controller.session_state().eq(&AuthState::Idle));
    }

    #[tokio::test]
    async fn test_non_utf8_pin_consumes_session() {
        let mut f = fixture().await;

        f.controller.handle_rfid(b"card1").await.unwrap();
        let err = f.controller.handle_pin(&[0xff, 0x31]).await.unwrap_err();
        assert!(matches!(err, BridgeError::MalformedPayload(_)));

        let outcome = f.controller.handle_pin(b"1234").await.unwrap();
        assert_eq!(outcome, AuthOutcome::Rejected(Rejection::NoActiveSession));
    }
}
