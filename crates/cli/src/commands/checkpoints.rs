//! Checkpoint inspection and editing

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;
use std::path::Path;
use sync_lib::{
    format_timestamp, parse_timestamp, BucketId, Checkpoint, CheckpointStore,
    SqliteCheckpointStore,
};
use tabled::Tabled;

use crate::output::{print_info, print_json, print_rows, print_success, print_warning, OutputFormat};

/// Row for the checkpoints table
#[derive(Tabled)]
struct CheckpointRow {
    #[tabled(rename = "Bucket")]
    bucket: String,
    #[tabled(rename = "Last Timestamp")]
    last_timestamp: String,
    #[tabled(rename = "Last Id")]
    last_id: String,
    #[tabled(rename = "Updated")]
    updated_at: String,
}

#[derive(Serialize)]
struct ResetResult {
    removed: usize,
}

pub fn open_store(db_path: &Path) -> Result<SqliteCheckpointStore> {
    SqliteCheckpointStore::open(db_path)
        .with_context(|| format!("Failed to open checkpoint store at {}", db_path.display()))
}

/// List all checkpoints
pub fn list(db_path: &Path, format: OutputFormat) -> Result<()> {
    let store = open_store(db_path)?;
    let records = store.list()?;

    let rows = records
        .iter()
        .map(|r| CheckpointRow {
            bucket: r.bucket.to_string(),
            last_timestamp: format_timestamp(&r.checkpoint.last_timestamp),
            last_id: r.checkpoint.last_id.clone().unwrap_or_else(|| "-".to_string()),
            updated_at: r.updated_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        })
        .collect();

    print_rows(rows, &records, format, "No checkpoints stored")
}

/// Delete one checkpoint, or all of them
pub fn reset(db_path: &Path, bucket: Option<&str>, all: bool, format: OutputFormat) -> Result<()> {
    let mut store = open_store(db_path)?;

    let removed = match (bucket, all) {
        (_, true) => store.reset_all()?,
        (Some(bucket), false) => usize::from(store.reset(&BucketId::new(bucket))?),
        (None, false) => bail!("Specify a bucket or --all"),
    };

    match format {
        OutputFormat::Json => print_json(&ResetResult { removed })?,
        OutputFormat::Table => match (removed, bucket) {
            (0, Some(bucket)) if !all => {
                print_warning(&format!("No checkpoint stored for '{}'", bucket))
            }
            (_, Some(bucket)) if !all => {
                print_success(&format!("Checkpoint for '{}' reset", bucket));
                print_info("The agent resends this bucket from its first event on the next iteration");
            }
            _ => print_success(&format!("{} checkpoint(s) reset", removed)),
        },
    }
    Ok(())
}

/// Store an explicit checkpoint
pub fn set(
    db_path: &Path,
    bucket: &str,
    timestamp: &str,
    id: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let Some(last_timestamp) = parse_timestamp(timestamp) else {
        bail!("Invalid timestamp '{}', expected RFC 3339 (e.g. 2024-03-01T10:00:00Z)", timestamp);
    };
    if last_timestamp > Utc::now() {
        print_warning("Timestamp is in the future; events before it will never be forwarded");
    }

    let mut store = open_store(db_path)?;
    let bucket = BucketId::new(bucket);
    let previous = store.get(&bucket)?;
    let checkpoint = Checkpoint::new(last_timestamp, id);
    store.set(&bucket, &checkpoint)?;

    match format {
        OutputFormat::Json => print_json(&checkpoint)?,
        OutputFormat::Table => {
            let from = previous
                .map(|p| format_timestamp(&p.last_timestamp))
                .unwrap_or_else(|| "none".to_string());
            print_success(&format!(
                "Checkpoint for '{}' moved from {} to {}",
                bucket,
                from,
                format_timestamp(&checkpoint.last_timestamp)
            ));
        }
    }
    Ok(())
}
