//! # Sync Controller
//!
//! Keeps the local snapshot and the remote directory in step.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Sync Triggers                                   │
//! │                                                                         │
//! │  sync-control-flag = pull-start                                         │
//! │      fetch_all ──► non-empty? ──► replace_all                           │
//! │                 └─ error / empty ──► snapshot untouched                 │
//! │                                                                         │
//! │  sync-data = {"id": ...} | {"<id>": {...}}   (any number of times)      │
//! │      parse ──► merge_update (known ids only)                            │
//! │                                                                         │
//! │  sync-control-flag = push-start                                         │
//! │      load ──► non-empty? ──► push_all (one upload of the current set)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use tracing::{debug, info, warn};

use gatekeeper_core::SyncUpdate;
use gatekeeper_store::CredentialStore;

use crate::config::FlagSettings;
use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{payload_text, ControlFlag};
use crate::remote::RemoteDirectory;

/// Result of one sync message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Local snapshot replaced from the remote.
    Pulled { records: usize },
    /// Local snapshot uploaded.
    Pushed { records: usize },
    /// One record updated locally.
    Merged { rfid_id: String },
    /// Trigger recognised but nothing was done.
    Skipped { reason: String },
    /// Control flag not recognised.
    Ignored { flag: String },
}

pub struct SyncController {
    store: CredentialStore,
    remote: Arc<dyn RemoteDirectory>,
    flags: FlagSettings,
}

impl SyncController {
    pub fn new(
        store: CredentialStore,
        remote: Arc<dyn RemoteDirectory>,
        flags: FlagSettings,
    ) -> Self {
        SyncController {
            store,
            remote,
            flags,
        }
    }

    /// Handles a `sync-control-flag` message.
    pub async fn handle_control(&self, payload: &[u8]) -> BridgeResult<SyncOutcome> {
        match ControlFlag::parse(payload_text(payload)?, &self.flags) {
            ControlFlag::PullStart => self.pull().await,
            ControlFlag::PushStart => self.push().await,
            ControlFlag::Unknown(flag) => {
                info!(flag = %flag, "Ignoring unknown sync flag");
                Ok(SyncOutcome::Ignored { flag })
            }
        }
    }

    /// Handles a `sync-data` message.
    ///
    /// Only updates records that already exist; unknown ids fail with
    /// `UnknownUserId` and leave the snapshot as it was.
    pub async fn handle_data(&self, payload: &[u8]) -> BridgeResult<SyncOutcome> {
        let update = SyncUpdate::parse(payload)?;
        self.store.merge_update(&update.id, &update.record).await?;

        info!(rfid_id = %update.id, "Record updated from sync-data");
        Ok(SyncOutcome::Merged { rfid_id: update.id })
    }

    /// Replaces the local snapshot with the remote one.
    ///
    /// An empty remote is treated as a failure so a wiped directory never
    /// erases local data.
    pub async fn pull(&self) -> BridgeResult<SyncOutcome> {
        info!("Pull started");
        let snapshot = self.remote.fetch_all().await?;

        if snapshot.is_empty() {
            return Err(BridgeError::RemoteUnavailable(
                "remote directory returned no records".into(),
            ));
        }

        let records = self.store.replace_all(&snapshot).await?;
        info!(records, "Pull complete");
        Ok(SyncOutcome::Pulled { records })
    }

    /// Uploads the full local snapshot.
    pub async fn push(&self) -> BridgeResult<SyncOutcome> {
        info!("Push started");
        let snapshot = self.store.load().await?;

        if snapshot.is_empty() {
            warn!("Local snapshot is empty, push skipped");
            return Ok(SyncOutcome::Skipped {
                reason: "local snapshot is empty".into(),
            });
        }

        debug!(records = snapshot.len(), "Uploading snapshot");
        self.remote.push_all(&snapshot).await?;

        info!(records = snapshot.len(), "Push complete");
        Ok(SyncOutcome::Pushed {
            records: snapshot.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{memory_store, ScriptedRemote};
    use gatekeeper_core::{CredentialSnapshot, UserRecord};
    use gatekeeper_store::StoreError;

    fn snapshot(entries: &[(&str, &str)]) -> CredentialSnapshot {
        entries
            .iter()
            .map(|(id, pin)| (id.to_string(), UserRecord::with_pin(*pin)))
            .collect()
    }

    async fn controller(
        remote: ScriptedRemote,
        initial: &CredentialSnapshot,
    ) -> (SyncController, CredentialStore, Arc<ScriptedRemote>) {
        let (_db, store) = memory_store().await;
        store.replace_all(initial).await.unwrap();
        let remote = Arc::new(remote);
        let controller =
            SyncController::new(store.clone(), remote.clone(), FlagSettings::default());
        (controller, store, remote)
    }

    #[tokio::test]
    async fn test_pull_replaces_snapshot() {
        let remote = ScriptedRemote::with_fetch(Ok(snapshot(&[("card1", "1111"), ("card3", "3333")])));
        let (sync, store, _) = controller(remote, &snapshot(&[("card1", "1234")])).await;

        let outcome = sync.handle_control(b"pull-start").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pulled { records: 2 });

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded["card1"].pin, "1111");
        assert!(loaded.contains_key("card3"));
    }

    #[tokio::test]
    async fn test_pull_empty_keeps_snapshot() {
        let initial = snapshot(&[("card1", "1234")]);
        let remote = ScriptedRemote::with_fetch(Ok(CredentialSnapshot::new()));
        let (sync, store, _) = controller(remote, &initial).await;

        let err = sync.handle_control(b"pull-start").await.unwrap_err();
        assert!(matches!(err, BridgeError::RemoteUnavailable(_)));
        assert_eq!(store.load().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_pull_failure_keeps_snapshot() {
        let initial = snapshot(&[("card1", "1234")]);
        let remote =
            ScriptedRemote::with_fetch(Err(BridgeError::RemoteUnavailable("HTTP 401".into())));
        let (sync, store, _) = controller(remote, &initial).await;

        assert!(sync.pull().await.is_err());
        assert_eq!(store.load().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_data_merges_known_id() {
        let (sync, store, _) =
            controller(ScriptedRemote::default(), &snapshot(&[("card1", "1234")])).await;

        let outcome = sync
            .handle_data(br#"{"card1":{"pin":"4321","name":"Ada"}}"#)
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Merged {
                rfid_id: "card1".into()
            }
        );

        let record = store.get("card1").await.unwrap().unwrap();
        assert_eq!(record.pin, "4321");
        assert_eq!(record.profile["name"], "Ada");
    }

    #[tokio::test]
    async fn test_data_unknown_id_rejected() {
        let initial = snapshot(&[("card1", "1234")]);
        let (sync, store, _) = controller(ScriptedRemote::default(), &initial).await;

        let err = sync
            .handle_data(br#"{"id":"card2","pin":"9999"}"#)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BridgeError::Store(StoreError::UnknownUserId(_))
        ));
        assert_eq!(store.load().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_data_malformed() {
        let initial = snapshot(&[("card1", "1234")]);
        let (sync, store, _) = controller(ScriptedRemote::default(), &initial).await;

        let payloads: [&[u8]; 3] = [b"not json", br#"["card1"]"#, br#"{"a":{},"b":{}}"#];
        for payload in payloads {
            let err = sync.handle_data(payload).await.unwrap_err();
            assert!(err.is_protocol_error(), "{:?}", err);
        }
        assert_eq!(store.load().await.unwrap(), initial);
    }

    #[tokio::test]
    async fn test_push_uploads_current_snapshot() {
        let (sync, _store, remote) = controller(
            ScriptedRemote::default(),
            &snapshot(&[("card1", "1234"), ("card2", "5678")]),
        )
        .await;

        sync.handle_data(br#"{"id":"card2","pin":"0000"}"#)
            .await
            .unwrap();
        let outcome = sync.handle_control(b"push-start").await.unwrap();
        assert_eq!(outcome, SyncOutcome::Pushed { records: 2 });

        let pushed = remote.pushed();
        assert_eq!(pushed.len(), 1);
        assert_eq!(pushed[0]["card2"].pin, "0000");
    }

    #[tokio::test]
    async fn test_push_empty_skipped() {
        let (sync, _store, remote) =
            controller(ScriptedRemote::default(), &CredentialSnapshot::new()).await;

        let outcome = sync.push().await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Skipped { .. }));
        assert!(remote.pushed().is_empty());
    }

    #[tokio::test]
    async fn test_push_failure_reported() {
        let (sync, _store, _) =
            controller(ScriptedRemote::failing_push(), &snapshot(&[("card1", "1234")])).await;

        let err = sync.push().await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_flag_ignored() {
        let (sync, _store, remote) =
            controller(ScriptedRemote::default(), &snapshot(&[("card1", "1234")])).await;

        let outcome = sync.handle_control(b"reboot").await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Ignored {
                flag: "reboot".into()
            }
        );
        assert!(remote.pushed().is_empty());
    }
}
