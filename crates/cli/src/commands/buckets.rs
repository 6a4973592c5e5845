//! Local buckets compared with stored checkpoints

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use sync_lib::{
    batch::after_checkpoint, format_timestamp, BucketId, CheckpointStore, EventSource,
    LocalSourceClient,
};
use tabled::Tabled;

use super::checkpoints::open_store;
use crate::output::{color_pending, print_rows, OutputFormat};

/// Row for the buckets table
#[derive(Tabled)]
struct BucketRow {
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Checkpoint")]
    checkpoint: String,
    #[tabled(rename = "Pending")]
    pending: String,
}

#[derive(Debug, Serialize)]
struct BucketStatus {
    bucket: BucketId,
    checkpoint: Option<String>,
    pending: usize,
}

/// List local buckets with the events waiting after each checkpoint
pub async fn list(db_path: &Path, local_api: &str, limit: usize, format: OutputFormat) -> Result<()> {
    let store = open_store(db_path)?;
    let source = LocalSourceClient::with_defaults(local_api)
        .context("Failed to create local source client")?;
    let buckets = source
        .list_buckets()
        .await
        .with_context(|| format!("Failed to list buckets from {}", local_api))?;

    let mut statuses = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let checkpoint = store.get(&bucket)?;
        let since = checkpoint.as_ref().map(|c| c.last_timestamp);
        let events = source.fetch_events(&bucket, since, limit).await?;
        let pending = after_checkpoint(events, checkpoint.as_ref()).len();

        statuses.push(BucketStatus {
            bucket,
            checkpoint: checkpoint.map(|c| format_timestamp(&c.last_timestamp)),
            pending,
        });
    }

    let rows = statuses
        .iter()
        .map(|s| BucketRow {
            bucket: s.bucket.to_string(),
            checkpoint: s.checkpoint.clone().unwrap_or_else(|| "-".to_string()),
            pending: color_pending(s.pending, limit),
        })
        .collect();

    print_rows(rows, &statuses, format, "No buckets on the local service")
}
