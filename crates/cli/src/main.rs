//! Activity Sync operator CLI
//!
//! Inspects and edits the agent's checkpoint database, compares it with the
//! local activity service, and queries a running agent's health endpoint.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{buckets, checkpoints, health};
use std::path::PathBuf;

/// Activity Sync operator CLI
#[derive(Parser)]
#[command(name = "activity-syncctl")]
#[command(author, version, about = "Operator CLI for the Activity Sync agent", long_about = None)]
pub struct Cli {
    /// Checkpoint database (defaults to the agent's data directory)
    #[arg(long, env = "ACTIVITY_SYNC_STORAGE__DB_PATH")]
    pub db: Option<PathBuf>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Inspect or edit stored checkpoints
    #[command(subcommand)]
    Checkpoints(CheckpointCommands),

    /// List local buckets with their checkpoint and pending events
    Buckets {
        /// Local activity service API
        #[arg(long, env = "ACTIVITY_SYNC_LOCAL__API_URL", default_value = sync_lib::DEFAULT_LOCAL_API)]
        local_api: String,

        /// Maximum events to count per bucket
        #[arg(long, default_value_t = 500)]
        limit: usize,
    },

    /// Query a running agent's health endpoint
    Health {
        /// Agent API base URL
        #[arg(long, default_value = "http://127.0.0.1:9464")]
        agent_url: String,
    },
}

#[derive(Subcommand)]
pub enum CheckpointCommands {
    /// List all checkpoints
    List,

    /// Delete a checkpoint so the bucket is resent from the start
    Reset {
        /// Bucket to reset
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        bucket: Option<String>,

        /// Reset every bucket
        #[arg(long)]
        all: bool,
    },

    /// Move a checkpoint, e.g. past a batch the remote keeps rejecting
    Set {
        /// Bucket to update
        bucket: String,

        /// RFC 3339 timestamp of the last forwarded event
        timestamp: String,

        /// Id of the last forwarded event
        #[arg(long)]
        id: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let db_path = cli.db.clone().unwrap_or_else(config::default_db_path);

    match cli.command {
        Commands::Checkpoints(cmd) => match cmd {
            CheckpointCommands::List => {
                checkpoints::list(&db_path, cli.format)?;
            }
            CheckpointCommands::Reset { bucket, all } => {
                checkpoints::reset(&db_path, bucket.as_deref(), all, cli.format)?;
            }
            CheckpointCommands::Set {
                bucket,
                timestamp,
                id,
            } => {
                checkpoints::set(&db_path, &bucket, &timestamp, id, cli.format)?;
            }
        },
        Commands::Buckets { local_api, limit } => {
            buckets::list(&db_path, &local_api, limit, cli.format).await?;
        }
        Commands::Health { agent_url } => {
            let client = client::AgentClient::new(&agent_url)?;
            health::show(&client, cli.format).await?;
        }
    }

    Ok(())
}
