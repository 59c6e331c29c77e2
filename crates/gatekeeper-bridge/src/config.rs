//! # Bridge Configuration
//!
//! Configuration management for a Gatekeeper node.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     GATEKEEPER_BROKER_HOST=10.0.0.2                                    │
//! │     GATEKEEPER_REMOTE_URL=https://example.firebaseio.com               │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/gatekeeper/gatekeeper.toml (Linux)                       │
//! │     or the path given with --config                                    │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     localhost:1883, generated node id, 2 s indicator hold              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [node]
//! id = "gatekeeper-front-door"
//! name = "Front Door"
//!
//! [broker]
//! host = "10.0.0.2"
//! port = 1883
//!
//! [topics]
//! rfid = "rfid"
//! pin = "pin"
//! sync_control = "pc-to-rpi-flag"
//! sync_data = "pc-to-rpi-data"
//! peer_result_data = "rpi-to-pc-data"
//! peer_result_flag = "rpi-to-pc-flag"
//!
//! [flags]
//! pull_start = "pull-start-flag"
//! push_start = "send_start_flag"
//! transfer_complete = "pull-end-flag"
//!
//! [remote]
//! database_url = "https://example-default-rtdb.firebaseio.com"
//! auth_token = "..."
//!
//! [session]
//! attempt_timeout_secs = 30
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{BridgeError, BridgeResult};

// =============================================================================
// Node
// =============================================================================

/// Identity of this node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSettings {
    /// Unique node identifier, also used as the MQTT client id.
    /// Auto-generated if not provided.
    #[serde(default = "default_node_id")]
    pub id: String,

    /// Human-readable node name (e.g., "Front Door").
    #[serde(default = "default_node_name")]
    pub name: String,
}

fn default_node_id() -> String {
    format!("gatekeeper-{}", Uuid::new_v4())
}

fn default_node_name() -> String {
    "Access Point".to_string()
}

impl Default for NodeSettings {
    fn default() -> Self {
        NodeSettings {
            id: default_node_id(),
            name: default_node_name(),
        }
    }
}

// =============================================================================
// Broker
// =============================================================================

/// MQTT broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrokerSettings {
    /// Broker hostname or address.
    #[serde(default = "default_broker_host")]
    pub host: String,

    /// Broker port.
    #[serde(default = "default_broker_port")]
    pub port: u16,

    /// MQTT keep-alive interval (seconds).
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,

    /// Timeout for the first connection at startup (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Optional broker username.
    #[serde(default)]
    pub username: Option<String>,

    /// Optional broker password.
    #[serde(default)]
    pub password: Option<String>,

    /// Initial backoff duration (milliseconds) for reconnection.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff duration (seconds) for reconnection.
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Maximum consecutive reconnection failures before giving up.
    /// Set to 0 for infinite retries.
    #[serde(default)]
    pub max_retries: u32,
}

fn default_broker_host() -> String {
    "localhost".to_string()
}
fn default_broker_port() -> u16 {
    1883
}
fn default_keep_alive() -> u64 {
    60
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}

impl Default for BrokerSettings {
    fn default() -> Self {
        BrokerSettings {
            host: default_broker_host(),
            port: default_broker_port(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            username: None,
            password: None,
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retries: 0,
        }
    }
}

// =============================================================================
// Topics and Flags
// =============================================================================

/// Topic names. Inbound: rfid, pin, sync_control, sync_data.
/// Outbound: peer_result_data, peer_result_flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicSettings {
    pub rfid: String,
    pub pin: String,
    pub sync_control: String,
    pub sync_data: String,
    pub peer_result_data: String,
    pub peer_result_flag: String,
}

impl Default for TopicSettings {
    fn default() -> Self {
        TopicSettings {
            rfid: "rfid-identifier".to_string(),
            pin: "pin-entry".to_string(),
            sync_control: "sync-control-flag".to_string(),
            sync_data: "sync-data".to_string(),
            peer_result_data: "peer-result-data".to_string(),
            peer_result_flag: "peer-result-flag".to_string(),
        }
    }
}

impl TopicSettings {
    /// All topics with their config key, inbound first.
    pub fn named(&self) -> [(&'static str, &str); 6] {
        [
            ("rfid", &self.rfid),
            ("pin", &self.pin),
            ("sync_control", &self.sync_control),
            ("sync_data", &self.sync_data),
            ("peer_result_data", &self.peer_result_data),
            ("peer_result_flag", &self.peer_result_flag),
        ]
    }
}

/// Control flag values carried on the sync-control and peer-result-flag topics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagSettings {
    /// Refresh the local snapshot from the remote directory.
    pub pull_start: String,
    /// Upload the local snapshot to the remote directory.
    pub push_start: String,
    /// Published after a forwarded record.
    pub transfer_complete: String,
}

impl Default for FlagSettings {
    fn default() -> Self {
        FlagSettings {
            pull_start: "pull-start".to_string(),
            push_start: "push-start".to_string(),
            transfer_complete: "transfer-complete".to_string(),
        }
    }
}

// =============================================================================
// Store, Remote, Indicator, Session, Logging
// =============================================================================

/// Credential store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite database path.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

fn default_store_path() -> PathBuf {
    directories::ProjectDirs::from("io", "gatekeeper", "gatekeeper")
        .map(|dirs| dirs.data_dir().join("credentials.db"))
        .unwrap_or_else(|| PathBuf::from("credentials.db"))
}

impl Default for StoreSettings {
    fn default() -> Self {
        StoreSettings {
            path: default_store_path(),
        }
    }
}

/// Remote credential directory (Firebase Realtime Database).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Database root URL. Sync is disabled when unset.
    #[serde(default)]
    pub database_url: Option<String>,

    /// Database secret or ID token, sent as the `auth` query parameter.
    #[serde(default)]
    pub auth_token: Option<String>,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            database_url: None,
            auth_token: None,
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl RemoteSettings {
    pub fn is_enabled(&self) -> bool {
        self.database_url.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Indicator timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndicatorSettings {
    /// How long each signal stays asserted (milliseconds).
    #[serde(default = "default_hold_ms")]
    pub hold_ms: u64,
}

fn default_hold_ms() -> u64 {
    2000
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        IndicatorSettings {
            hold_ms: default_hold_ms(),
        }
    }
}

/// Authentication attempt settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    /// Seconds a PIN may arrive after the RFID presentation.
    /// Unset waits indefinitely.
    #[serde(default)]
    pub attempt_timeout_secs: Option<u64>,
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Pretty,
    #[default]
    Compact,
}

/// Logging settings. `RUST_LOG` takes precedence over `level`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        LoggingSettings {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

// =============================================================================
// Main Bridge Configuration
// =============================================================================

/// Complete node configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub node: NodeSettings,

    #[serde(default)]
    pub broker: BrokerSettings,

    #[serde(default)]
    pub topics: TopicSettings,

    #[serde(default)]
    pub flags: FlagSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub indicator: IndicatorSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub logging: LoggingSettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (gatekeeper.toml)
    /// 3. Environment variables
    ///
    /// An explicitly given path must exist; the default path may be absent.
    pub fn load(config_path: Option<PathBuf>) -> BridgeResult<Self> {
        let explicit = config_path.is_some();
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = Self::from_toml(&contents)?;
            } else if explicit {
                return Err(BridgeError::ConfigLoadFailed(format!(
                    "config file not found: {}",
                    path.display()
                )));
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Parses a TOML document without applying overrides or validating.
    pub fn from_toml(contents: &str) -> BridgeResult<Self> {
        Ok(toml::from_str(contents)?)
    }

    /// Renders the configuration as TOML.
    pub fn to_toml(&self) -> BridgeResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> BridgeResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| BridgeError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;
        }

        std::fs::write(&path, self.to_toml()?)
            .map_err(|e| BridgeError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> BridgeResult<()> {
        if self.node.id.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("node.id must not be empty".into()));
        }

        if self.broker.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "broker.host must not be empty".into(),
            ));
        }

        if self.broker.port == 0 {
            return Err(BridgeError::InvalidConfig(
                "broker.port must be greater than 0".into(),
            ));
        }

        if let Some(ref url) = self.remote.database_url {
            let parsed = url::Url::parse(url)?;
            if parsed.scheme() != "https" && parsed.scheme() != "http" {
                return Err(BridgeError::InvalidUrl(format!(
                    "remote.database_url must start with https:// or http://, got: {}",
                    url
                )));
            }
        }

        if self.indicator.hold_ms == 0 {
            return Err(BridgeError::InvalidConfig(
                "indicator.hold_ms must be greater than 0".into(),
            ));
        }

        if self.session.attempt_timeout_secs == Some(0) {
            return Err(BridgeError::InvalidConfig(
                "session.attempt_timeout_secs must be greater than 0 (omit it to wait indefinitely)"
                    .into(),
            ));
        }

        let topics = self.topics.named();
        for (i, (name, topic)) in topics.iter().enumerate() {
            if topic.trim().is_empty() {
                return Err(BridgeError::InvalidConfig(format!(
                    "topics.{} must not be empty",
                    name
                )));
            }
            if let Some((other, _)) = topics[i + 1..].iter().find(|(_, t)| t == topic) {
                return Err(BridgeError::InvalidConfig(format!(
                    "topics.{} and topics.{} are both '{}'",
                    name, other, topic
                )));
            }
        }

        for (name, flag) in [
            ("pull_start", &self.flags.pull_start),
            ("push_start", &self.flags.push_start),
            ("transfer_complete", &self.flags.transfer_complete),
        ] {
            if flag.trim().is_empty() {
                return Err(BridgeError::InvalidConfig(format!(
                    "flags.{} must not be empty",
                    name
                )));
            }
        }

        if self.flags.pull_start == self.flags.push_start {
            return Err(BridgeError::InvalidConfig(
                "flags.pull_start and flags.push_start must differ".into(),
            ));
        }

        Ok(())
    }

    /// Applies `GATEKEEPER_*` environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("GATEKEEPER_NODE_ID") {
            debug!(node_id = %id, "Overriding node id from environment");
            self.node.id = id;
        }

        if let Some(host) = lookup("GATEKEEPER_BROKER_HOST") {
            debug!(host = %host, "Overriding broker host from environment");
            self.broker.host = host;
        }

        if let Some(port) = lookup("GATEKEEPER_BROKER_PORT") {
            match port.parse::<u16>() {
                Ok(p) => self.broker.port = p,
                Err(_) => warn!(port = %port, "Ignoring invalid GATEKEEPER_BROKER_PORT"),
            }
        }

        if let Some(username) = lookup("GATEKEEPER_BROKER_USERNAME") {
            self.broker.username = Some(username);
        }

        if let Some(password) = lookup("GATEKEEPER_BROKER_PASSWORD") {
            self.broker.password = Some(password);
        }

        if let Some(path) = lookup("GATEKEEPER_STORE_PATH") {
            debug!(path = %path, "Overriding store path from environment");
            self.store.path = PathBuf::from(path);
        }

        if let Some(url) = lookup("GATEKEEPER_REMOTE_URL") {
            debug!(url = %url, "Overriding remote URL from environment");
            self.remote.database_url = Some(url);
        }

        if let Some(token) = lookup("GATEKEEPER_REMOTE_TOKEN") {
            self.remote.auth_token = Some(token);
        }

        if let Some(secs) = lookup("GATEKEEPER_ATTEMPT_TIMEOUT_SECS") {
            match secs.parse::<u64>() {
                Ok(s) => self.session.attempt_timeout_secs = Some(s),
                Err(_) => warn!(value = %secs, "Ignoring invalid GATEKEEPER_ATTEMPT_TIMEOUT_SECS"),
            }
        }

        if let Some(level) = lookup("GATEKEEPER_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("io", "gatekeeper", "gatekeeper")
            .map(|dirs| dirs.config_dir().join("gatekeeper.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn indicator_hold(&self) -> Duration {
        Duration::from_millis(self.indicator.hold_ms)
    }

    pub fn attempt_timeout(&self) -> Option<Duration> {
        self.session.attempt_timeout_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert!(config.node.id.starts_with("gatekeeper-"));
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.indicator_hold(), Duration::from_secs(2));
        assert_eq!(config.attempt_timeout(), None);
        assert!(!config.remote.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = BridgeConfig::from_toml(
            r#"
            [broker]
            host = "10.0.0.2"

            [topics]
            rfid = "rfid"
            pin = "pin"

            [session]
            attempt_timeout_secs = 30
            "#,
        )
        .unwrap();

        assert_eq!(config.broker.host, "10.0.0.2");
        assert_eq!(config.broker.port, 1883);
        assert_eq!(config.topics.rfid, "rfid");
        assert_eq!(config.topics.sync_data, "sync-data");
        assert_eq!(config.attempt_timeout(), Some(Duration::from_secs(30)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BridgeConfig::default();

        config.node.id = String::new();
        assert!(config.validate().unwrap_err().is_config_error());
        config.node.id = "node".into();

        config.broker.port = 0;
        assert!(config.validate().is_err());
        config.broker.port = 1883;

        config.remote.database_url = Some("ftp://example.com".into());
        assert!(matches!(config.validate(), Err(BridgeError::InvalidUrl(_))));
        config.remote.database_url = Some("not a url".into());
        assert!(matches!(config.validate(), Err(BridgeError::InvalidUrl(_))));
        config.remote.database_url = Some("https://example.firebaseio.com".into());
        assert!(config.validate().is_ok());

        config.indicator.hold_ms = 0;
        assert!(config.validate().is_err());
        config.indicator.hold_ms = 1;

        config.flags.push_start = config.flags.pull_start.clone();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_topics_rejected() {
        let mut config = BridgeConfig::default();
        config.topics.peer_result_data = config.topics.sync_data.clone();

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("sync_data"));
        assert!(err.to_string().contains("peer_result_data"));
    }

    #[test]
    fn test_empty_topic_rejected() {
        let mut config = BridgeConfig::default();
        config.topics.pin = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_attempt_timeout_rejected() {
        let mut config = BridgeConfig::default();
        config.session.attempt_timeout_secs = Some(0);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("attempt_timeout_secs"));

        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| {
            (key == "GATEKEEPER_ATTEMPT_TIMEOUT_SECS").then(|| "0".to_string())
        });
        assert!(matches!(
            config.validate(),
            Err(BridgeError::InvalidConfig(_))
        ));

        config.session.attempt_timeout_secs = Some(1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("GATEKEEPER_NODE_ID", "door-1"),
            ("GATEKEEPER_BROKER_HOST", "broker.local"),
            ("GATEKEEPER_BROKER_PORT", "8883"),
            ("GATEKEEPER_REMOTE_URL", "https://example.firebaseio.com"),
            ("GATEKEEPER_ATTEMPT_TIMEOUT_SECS", "45"),
            ("GATEKEEPER_STORE_PATH", "/tmp/creds.db"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.node_id(), "door-1");
        assert_eq!(config.broker.host, "broker.local");
        assert_eq!(config.broker.port, 8883);
        assert_eq!(
            config.remote.database_url.as_deref(),
            Some("https://example.firebaseio.com")
        );
        assert_eq!(config.attempt_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(config.store.path, PathBuf::from("/tmp/creds.db"));
    }

    #[test]
    fn test_invalid_env_port_ignored() {
        let mut config = BridgeConfig::default();
        config.apply_overrides(|key| (key == "GATEKEEPER_BROKER_PORT").then(|| "huge".to_string()));
        assert_eq!(config.broker.port, 1883);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conf").join("gatekeeper.toml");

        let mut config = BridgeConfig::default();
        config.node.id = "door-1".into();
        config.broker.host = "broker.local".into();
        config.save(Some(path.clone())).unwrap();

        let loaded = BridgeConfig::from_toml(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(loaded.node.id, "door-1");
        assert_eq!(loaded.broker.host, "broker.local");
        assert_eq!(loaded.topics, config.topics);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = BridgeConfig::load(Some(dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, BridgeError::ConfigLoadFailed(_)));
    }
}
