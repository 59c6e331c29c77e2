//! Test doubles for the bridge's async seams.
//!
//! Compiled for this crate's own tests and, with the `test-util` feature,
//! for integration tests and downstream crates.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use gatekeeper_core::CredentialSnapshot;
use gatekeeper_store::{CredentialStore, Database, StoreConfig};

use crate::error::{BridgeError, BridgeResult};
use crate::indicator::{Indicator, IndicatorSignal};
use crate::protocol::PeerTopics;
use crate::remote::RemoteDirectory;
use crate::transport::Publisher;

pub const HOLD: Duration = Duration::from_millis(1);

pub fn peer() -> PeerTopics {
    PeerTopics {
        data_topic: "peer-result-data".into(),
        flag_topic: "peer-result-flag".into(),
        marker: "transfer-complete".into(),
    }
}

/// In-memory store with migrations applied.
pub async fn memory_store() -> (Database, CredentialStore) {
    let db = Database::new(StoreConfig::in_memory()).await.unwrap();
    let store = db.credentials();
    (db, store)
}

#[derive(Default)]
pub struct RecordingIndicator {
    signals: Mutex<Vec<IndicatorSignal>>,
}

impl RecordingIndicator {
    pub fn signals(&self) -> Vec<IndicatorSignal> {
        self.signals.lock().unwrap().clone()
    }
}

#[async_trait]
impl Indicator for RecordingIndicator {
    async fn pulse(&self, signal: IndicatorSignal, _hold: Duration) {
        self.signals.lock().unwrap().push(signal);
    }
}

#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, Vec<u8>)>>,
    fail: bool,
}

impl RecordingPublisher {
    pub fn failing() -> Self {
        RecordingPublisher {
            fail: true,
            ..Default::default()
        }
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(t, p)| (t.clone(), String::from_utf8_lossy(p).into_owned()))
            .collect()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> BridgeResult<()> {
        if self.fail {
            return Err(BridgeError::MqttError("request channel closed".into()));
        }
        self.published
            .lock()
            .unwrap()
            .push((topic.to_string(), payload));
        Ok(())
    }
}

/// Remote that answers fetches from a queue and records pushes.
///
/// An empty queue answers `RemoteUnavailable`.
#[derive(Default)]
pub struct ScriptedRemote {
    fetches: Mutex<VecDeque<BridgeResult<CredentialSnapshot>>>,
    fetch_calls: Mutex<usize>,
    pushed: Mutex<Vec<CredentialSnapshot>>,
    fail_push: bool,
}

impl ScriptedRemote {
    pub fn with_fetch(result: BridgeResult<CredentialSnapshot>) -> Self {
        let remote = ScriptedRemote::default();
        remote.queue_fetch(result);
        remote
    }

    pub fn queue_fetch(&self, result: BridgeResult<CredentialSnapshot>) {
        self.fetches.lock().unwrap().push_back(result);
    }

    pub fn fetch_calls(&self) -> usize {
        *self.fetch_calls.lock().unwrap()
    }

    pub fn failing_push() -> Self {
        ScriptedRemote {
            fail_push: true,
            ..Default::default()
        }
    }

    pub fn pushed(&self) -> Vec<CredentialSnapshot> {
        self.pushed.lock().unwrap().clone()
    }
}

#[async_trait]
impl RemoteDirectory for ScriptedRemote {
    async fn fetch_all(&self) -> BridgeResult<CredentialSnapshot> {
        *self.fetch_calls.lock().unwrap() += 1;
        self.fetches
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(BridgeError::RemoteUnavailable("no scripted fetch".into())))
    }

    async fn push_all(&self, snapshot: &CredentialSnapshot) -> BridgeResult<()> {
        if self.fail_push {
            return Err(BridgeError::RemoteUnavailable("HTTP 503".into()));
        }
        self.pushed.lock().unwrap().push(snapshot.clone());
        Ok(())
    }
}
