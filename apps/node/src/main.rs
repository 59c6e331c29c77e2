//! # Gatekeeper Node
//!
//! Process entry point for an access-point node.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        gatekeeper-node                                  │
//! │                                                                         │
//! │  run           config → logging → store → remote → MQTT → BridgeAgent  │
//! │  check-config  load + validate, print effective TOML                   │
//! │  init-config   write the default config file                           │
//! │  import FILE   JSON snapshot → store (replace_all)                     │
//! │  export [FILE] store → JSON snapshot                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod logging;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use gatekeeper_bridge::remote;
use gatekeeper_bridge::{
    BridgeAgent, BridgeConfig, LogIndicator, MqttTransport, Router, TransportConfig,
};
use gatekeeper_core::CredentialSnapshot;
use gatekeeper_store::{Database, StoreConfig};

#[derive(Debug, Parser)]
#[command(name = "gatekeeper-node", version, about = "RFID + PIN access bridge")]
struct Cli {
    /// Config file (defaults to the platform config directory).
    #[arg(short, long, global = true, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the bridge (default).
    Run,
    /// Load and validate the configuration, then print it.
    CheckConfig,
    /// Write a default configuration file.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Replace the local snapshot with a JSON file.
    Import { file: PathBuf },
    /// Write the local snapshot as JSON to a file or stdout.
    Export { file: Option<PathBuf> },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => run(load_config(cli.config)?).await,
        Command::CheckConfig => {
            let config = load_config(cli.config)?;
            print!("{}", config.to_toml()?);
            Ok(())
        }
        Command::InitConfig { force } => init_config(cli.config, force),
        Command::Import { file } => {
            let config = load_config(cli.config)?;
            import(&config, &file).await
        }
        Command::Export { file } => {
            let config = load_config(cli.config)?;
            export(&config, file.as_deref()).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<BridgeConfig> {
    let config = BridgeConfig::load(path).context("invalid configuration")?;
    logging::init(&config.logging);
    Ok(config)
}

async fn open_store(config: &BridgeConfig) -> anyhow::Result<Database> {
    Database::new(StoreConfig::new(&config.store.path))
        .await
        .with_context(|| {
            format!(
                "cannot open credential store at {}",
                config.store.path.display()
            )
        })
}

// =============================================================================
// run
// =============================================================================

async fn run(config: BridgeConfig) -> anyhow::Result<()> {
    info!(node_id = %config.node_id(), name = %config.node.name, "Starting gatekeeper node");

    let db = open_store(&config).await?;
    if !db.health_check().await {
        db.close().await;
        bail!(
            "credential store at {} does not answer queries",
            config.store.path.display()
        );
    }

    let store = db.credentials();
    match store.count().await {
        Ok(records) => info!(records, "Credential store ready"),
        Err(e) => warn!(error = %e, "Credential store not readable, waiting for a pull"),
    }

    let remote = remote::from_settings(&config.remote).context("invalid remote directory")?;
    let router = Router::from_topics(&config.topics).context("invalid topic table")?;

    let transport_config = TransportConfig::from_bridge_config(&config, router.subscriptions());
    let (transport, incoming_rx) = MqttTransport::connect(transport_config)
        .await
        .with_context(|| {
            format!(
                "cannot connect to broker {}:{}",
                config.broker.host, config.broker.port
            )
        })?;

    let agent = BridgeAgent::from_config(
        &config,
        store,
        remote,
        Arc::new(LogIndicator),
        Arc::new(transport.clone()),
    )?;
    let (handle, mut task) = agent.spawn(incoming_rx, Some(transport));

    let status = tokio::select! {
        _ = shutdown_signal() => {
            if let Err(e) = handle.shutdown().await {
                warn!(error = %e, "Agent already stopped");
            }
            (&mut task).await
        }
        status = &mut task => status,
    };

    match status {
        Ok(status) => info!(
            accepted = status.accepted,
            rejected = status.rejected,
            pulls = status.pulls,
            pushes = status.pushes,
            errors = status.errors,
            "Final status"
        ),
        Err(e) => warn!(error = %e, "Agent task failed"),
    }

    db.close().await;
    info!("Shutdown complete");
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

// =============================================================================
// Config / snapshot commands
// =============================================================================

fn init_config(path: Option<PathBuf>, force: bool) -> anyhow::Result<()> {
    let path = path
        .or_else(BridgeConfig::default_config_path)
        .context("no config path available")?;

    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    BridgeConfig::default().save(Some(path.clone()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn read_snapshot(file: &Path) -> anyhow::Result<CredentialSnapshot> {
    let contents = std::fs::read_to_string(file)
        .with_context(|| format!("cannot read {}", file.display()))?;
    let snapshot: Option<CredentialSnapshot> = serde_json::from_str(&contents)
        .with_context(|| format!("{} is not a credential snapshot", file.display()))?;

    match snapshot {
        Some(snapshot) if !snapshot.is_empty() => Ok(snapshot),
        _ => bail!("{} contains no records, refusing to import", file.display()),
    }
}

async fn import(config: &BridgeConfig, file: &Path) -> anyhow::Result<()> {
    let snapshot = read_snapshot(file)?;

    let db = open_store(config).await?;
    let records = db.credentials().replace_all(&snapshot).await?;
    db.close().await;

    info!(records, file = %file.display(), "Snapshot imported");
    Ok(())
}

async fn export(config: &BridgeConfig, file: Option<&Path>) -> anyhow::Result<()> {
    let db = open_store(config).await?;
    let snapshot = db.credentials().load().await?;
    db.close().await;

    let json = serde_json::to_string_pretty(&snapshot)?;
    match file {
        Some(file) => {
            std::fs::write(file, json + "\n")
                .with_context(|| format!("cannot write {}", file.display()))?;
            info!(records = snapshot.len(), file = %file.display(), "Snapshot exported");
        }
        None => println!("{}", json),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults_to_run() {
        let cli = Cli::parse_from(["gatekeeper-node"]);
        assert!(cli.command.is_none());
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_cli_subcommands() {
        let cli = Cli::parse_from(["gatekeeper-node", "--config", "/etc/gk.toml", "export"]);
        assert_eq!(cli.config, Some(PathBuf::from("/etc/gk.toml")));
        assert!(matches!(cli.command, Some(Command::Export { file: None })));

        let cli = Cli::parse_from(["gatekeeper-node", "import", "users.json"]);
        assert!(matches!(cli.command, Some(Command::Import { .. })));
    }

    #[test]
    fn test_read_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("users.json");
        std::fs::write(&file, r#"{"card1":{"pin":1234,"name":"Ada"}}"#).unwrap();

        let snapshot = read_snapshot(&file).unwrap();
        assert_eq!(snapshot["card1"].pin, "1234");
    }

    #[test]
    fn test_read_snapshot_refuses_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("users.json");

        for contents in ["{}", "null"] {
            std::fs::write(&file, contents).unwrap();
            assert!(read_snapshot(&file).is_err());
        }
    }
}
