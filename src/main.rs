// SPDX-License-Identifier: Apache-2.0
mod cli;
mod server;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::{AuthCommands, Cli, Commands, ConfigCommands};
use corral_adapters::families::{acp::AcpAdapter, claude::ClaudeAdapter, codex::CodexAdapter};
use corral_adapters::AdapterRegistry;
use corral_auth::{IdentityRecord, SessionStore};
use corral_core::event_bus::EventBus;
use corral_core::supervisor::Supervisor;
use corral_relay::{RelayClient, RelayConfig};
use corral_sessions::SessionMetadataStore;
use corral_transport::TransportContext;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = corral_config::load(cli.config.as_deref())?;

    match &cli.command {
        Commands::Config(ConfigCommands::Show) => {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }
        Commands::Auth(AuthCommands::SetPassword { username }) => set_password(&config, username),
        Commands::Serve { bind } => serve(config, bind.clone()).await,
    }
}

fn identity_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("remote-access.json")
}

fn sessions_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("remote-sessions.json")
}

fn session_metadata_path(data_dir: &std::path::Path) -> PathBuf {
    data_dir.join("session-metadata.json")
}

/// `corral auth set-password` — prompt for a password on the controlling
/// terminal (never accepted as a CLI argument, so it never lands in shell
/// history or a process listing) and persist the derived SRP identity.
fn set_password(config: &corral_config::Config, username: &str) -> anyhow::Result<()> {
    let password = rpassword::prompt_password("New password: ")
        .context("reading password from terminal")?;
    let confirm = rpassword::prompt_password("Confirm password: ")
        .context("reading password confirmation")?;
    anyhow::ensure!(password == confirm, "passwords did not match");

    let data_dir = config.data_dir.resolve();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let record = IdentityRecord::derive(username, &password);
    record
        .save(&identity_path(&data_dir))
        .context("saving identity record")?;
    println!("Saved identity for {username} under {}", data_dir.display());
    Ok(())
}

/// `corral serve` — the supervisor's long-running process: process
/// registry, secure transport listener, and (if configured) the relay
/// client.
async fn serve(config: corral_config::Config, bind_override: Option<String>) -> anyhow::Result<()> {
    let data_dir = config.data_dir.resolve();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data directory {}", data_dir.display()))?;

    let event_bus = EventBus::new();
    let supervisor = Supervisor::new(event_bus.clone());

    let mut adapters = AdapterRegistry::new();
    adapters.register(Arc::new(ClaudeAdapter::default()));
    adapters.register(Arc::new(CodexAdapter::default()));
    adapters.register(Arc::new(AcpAdapter::default()));
    let _adapters = Arc::new(adapters); // held for future request handlers

    let identity_path = identity_path(&data_dir);
    if !identity_path.exists() {
        tracing::warn!(
            path = %identity_path.display(),
            "no identity configured yet — run `corral auth set-password --username <name>`",
        );
    }
    let identities: corral_transport::IdentityLookup = {
        let path = identity_path.clone();
        Arc::new(move |username: &str| {
            let record = IdentityRecord::load(&path).ok()?;
            (record.username == username).then_some(record)
        })
    };

    let session_store = Arc::new(SessionStore::new().persisted_at(sessions_path(&data_dir)));
    session_store
        .load_from_disk()
        .await
        .context("loading resumable session store")?;

    let session_metadata = Arc::new(SessionMetadataStore::new().persisted_at(session_metadata_path(&data_dir)));
    session_metadata
        .load_from_disk()
        .context("loading session metadata store")?;
    let _session_metadata = session_metadata; // held for future request handlers

    let upload_staging_dir = data_dir.join("uploads");
    std::fs::create_dir_all(&upload_staging_dir)
        .with_context(|| format!("creating upload staging dir {}", upload_staging_dir.display()))?;

    let ctx = TransportContext {
        supervisor: supervisor.clone(),
        event_bus: event_bus.clone(),
        sessions: session_store,
        identities,
        upload_staging_dir,
    };

    // Held for the rest of `serve` — the reconnect loop lives in its spawned task.
    let _relay_client = if config.relay.enabled {
        let Some(url) = config.relay.url.clone() else {
            anyhow::bail!("relay.enabled is true but relay.url is not set");
        };
        let username = config
            .relay
            .username
            .clone()
            .unwrap_or_else(|| "corral".to_string());
        let install_id = config
            .relay
            .install_id
            .clone()
            .unwrap_or_else(|| install_id_for(&data_dir));

        let relay_client = RelayClient::new(ctx.clone());
        relay_client
            .start(RelayConfig {
                relay_url: url,
                username,
                install_id,
            })
            .await;
        Some(relay_client)
    } else {
        None
    };

    let bind = bind_override.unwrap_or(config.transport.bind.clone());
    server::serve(&bind, ctx).await
}

/// A stable per-install identifier for relay registration, persisted next
/// to the other secret-backed state.
fn install_id_for(data_dir: &std::path::Path) -> String {
    let path = data_dir.join("install-id");
    if let Ok(existing) = std::fs::read_to_string(&path) {
        let trimmed = existing.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }
    let id = uuid::Uuid::new_v4().to_string();
    let _ = std::fs::write(&path, &id);
    id
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}
