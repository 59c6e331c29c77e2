//! # Remote Credential Directory
//!
//! The authoritative credential set lives in a Firebase Realtime Database.
//! Both directions operate on the database root as a whole: a pull reads
//! every record, a push overwrites every record.
//!
//! ```text
//! ┌──────────────────┐   GET  <url>/.json?auth=<token>   ┌──────────────────┐
//! │ SyncController   │ ────────────────────────────────► │ Realtime DB root │
//! │                  │ ◄──── {"<id>": {record}, ...} ─── │                  │
//! │                  │                                   │                  │
//! │                  │   PUT  <url>/.json?auth=<token>   │                  │
//! │                  │ ────── {"<id>": {record}, ...} ─► │                  │
//! └──────────────────┘                                   └──────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use gatekeeper_core::CredentialSnapshot;

use crate::config::RemoteSettings;
use crate::error::{BridgeError, BridgeResult};

/// Connect timeout for remote requests.
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// User agent sent with every request.
const USER_AGENT: &str = concat!("gatekeeper/", env!("CARGO_PKG_VERSION"));

/// Whole-snapshot access to the remote directory.
#[async_trait]
pub trait RemoteDirectory: Send + Sync {
    /// Fetches every record. An empty database yields an empty snapshot.
    async fn fetch_all(&self) -> BridgeResult<CredentialSnapshot>;

    /// Replaces the remote contents with `snapshot`.
    async fn push_all(&self, snapshot: &CredentialSnapshot) -> BridgeResult<()>;
}

/// Builds the directory described by `[remote]`.
pub fn from_settings(settings: &RemoteSettings) -> BridgeResult<Arc<dyn RemoteDirectory>> {
    if settings.is_enabled() {
        Ok(Arc::new(FirebaseDirectory::new(settings)?))
    } else {
        info!("Remote directory not configured; sync commands will be rejected");
        Ok(Arc::new(DisabledDirectory))
    }
}

// =============================================================================
// Firebase REST
// =============================================================================

/// Firebase Realtime Database over its REST API.
pub struct FirebaseDirectory {
    client: Client,
    endpoint: Url,
}

impl FirebaseDirectory {
    pub fn new(settings: &RemoteSettings) -> BridgeResult<Self> {
        let base = settings
            .database_url
            .as_deref()
            .ok_or_else(|| BridgeError::InvalidConfig("remote.database_url is not set".into()))?;
        let endpoint = root_endpoint(base, settings.auth_token.as_deref())?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .timeout(settings.request_timeout())
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| {
                BridgeError::InvalidConfig(format!("failed to create HTTP client: {}", e))
            })?;

        Ok(FirebaseDirectory { client, endpoint })
    }
}

#[async_trait]
impl RemoteDirectory for FirebaseDirectory {
    async fn fetch_all(&self) -> BridgeResult<CredentialSnapshot> {
        let response = self.client.get(self.endpoint.clone()).send().await?;

        if !response.status().is_success() {
            return Err(BridgeError::RemoteUnavailable(format!(
                "GET returned HTTP {}",
                response.status()
            )));
        }

        let body = response.bytes().await?;
        // An empty database is returned as `null`
        let snapshot: Option<CredentialSnapshot> = serde_json::from_slice(&body).map_err(|e| {
            BridgeError::RemoteUnavailable(format!("unexpected response body: {}", e))
        })?;

        let snapshot = snapshot.unwrap_or_default();
        debug!(records = snapshot.len(), "Fetched remote snapshot");
        Ok(snapshot)
    }

    async fn push_all(&self, snapshot: &CredentialSnapshot) -> BridgeResult<()> {
        let response = self
            .client
            .put(self.endpoint.clone())
            .json(snapshot)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BridgeError::RemoteUnavailable(format!(
                "PUT returned HTTP {}",
                response.status()
            )));
        }

        debug!(records = snapshot.len(), "Pushed snapshot to remote");
        Ok(())
    }
}

/// `<base>/.json`, with `?auth=<token>` when a token is set.
fn root_endpoint(base: &str, auth_token: Option<&str>) -> BridgeResult<Url> {
    let mut base = Url::parse(base)?;
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }

    let mut endpoint = base.join(".json")?;
    if let Some(token) = auth_token {
        endpoint.query_pairs_mut().append_pair("auth", token);
    }
    Ok(endpoint)
}

// =============================================================================
// Disabled
// =============================================================================

/// Stand-in used when no remote URL is configured.
#[derive(Debug, Default, Clone)]
pub struct DisabledDirectory;

#[async_trait]
impl RemoteDirectory for DisabledDirectory {
    async fn fetch_all(&self) -> BridgeResult<CredentialSnapshot> {
        Err(BridgeError::RemoteUnavailable(
            "remote directory not configured".into(),
        ))
    }

    async fn push_all(&self, _snapshot: &CredentialSnapshot) -> BridgeResult<()> {
        Err(BridgeError::RemoteUnavailable(
            "remote directory not configured".into(),
        ))
    }
}
