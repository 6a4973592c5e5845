//! Activity Sync - relays local activity events to a remote ingestion service
//!
//! Runs on a workstation next to the local activity tracker, forwarding new
//! events in idempotent batches and resuming from durable checkpoints.

use activity_sync::{api, config::AgentConfig};
use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use sync_lib::{
    observability::StructuredLogger,
    sync::{AgentIdentity, RemoteSyncClient, SyncEngineBuilder},
    HealthRegistry, LocalSourceClient, SqliteCheckpointStore,
};
use tokio::sync::broadcast;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Activity event relay agent
#[derive(Parser)]
#[command(name = "activity-sync")]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, env = "ACTIVITY_SYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    verbose: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "json")]
    log_format: LogFormat,
}

fn init_tracing(args: &Args) {
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let registry = tracing_subscriber::registry().with(filter);

    match args.log_format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(&args);

    let config = AgentConfig::load(args.config.as_deref())?;
    let db_path = config.db_path();
    info!(
        db_path = %db_path.display(),
        local_api = %config.local.api_url,
        remote = config.remote_url().unwrap_or("none"),
        "Agent configured"
    );

    let store = SqliteCheckpointStore::open(&db_path)
        .with_context(|| format!("Failed to open checkpoint store at {}", db_path.display()))?;
    let source = LocalSourceClient::new(config.source_config())
        .context("Failed to create local source client")?;

    let identity = AgentIdentity::detect();
    let logger = StructuredLogger::new(identity.host.clone());
    let health_registry = HealthRegistry::new();

    let mut builder = SyncEngineBuilder::new(Box::new(source), Box::new(store))
        .config(config.sync_config())
        .health(health_registry.clone())
        .identity(identity);
    if let Some(remote) = config.remote_config() {
        let client = RemoteSyncClient::new(remote).context("Failed to create remote client")?;
        builder = builder.remote(Box::new(client));
    }
    let mut engine = builder.build().context("Invalid sync configuration")?;

    if let Some(port) = config.observability.metrics_port {
        let state = Arc::new(api::AppState::new(health_registry.clone()));
        tokio::spawn(async move {
            if let Err(e) = api::serve(port, state).await {
                error!(error = %e, "API server stopped");
            }
        });
    }

    logger.log_startup(AGENT_VERSION, config.remote_url(), &config.local.api_url);

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                let _ = shutdown_tx.send(());
            }
            Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
        }
    });

    engine.run(shutdown_rx).await;
    logger.log_shutdown("SIGINT received");

    Ok(())
}
