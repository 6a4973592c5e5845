//! Durable per-bucket checkpoints
//!
//! This module provides the cursor store that lets the agent resume exactly
//! where forwarding left off:
//! - SQLite-backed, one row per bucket
//! - Upserts are a single statement, so every `set` is atomic
//! - Rows are only deleted by explicit operator resets

use crate::error::{SyncError, SyncResult};
use crate::models::{format_timestamp, parse_timestamp, BucketId, Checkpoint, CheckpointRecord};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Current schema version, tracked in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// How long to wait on a lock held by another process.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Storage for per-bucket checkpoints
pub trait CheckpointStore: Send {
    /// Last forwarded position for `bucket`, if any.
    fn get(&self, bucket: &BucketId) -> SyncResult<Option<Checkpoint>>;

    /// Replace the checkpoint for `bucket`.
    fn set(&mut self, bucket: &BucketId, checkpoint: &Checkpoint) -> SyncResult<()>;

    /// All stored checkpoints ordered by bucket.
    fn list(&self) -> SyncResult<Vec<CheckpointRecord>>;

    /// Delete the checkpoint for `bucket`. Returns whether one existed.
    fn reset(&mut self, bucket: &BucketId) -> SyncResult<bool>;

    /// Delete every checkpoint. Returns how many were removed.
    fn reset_all(&mut self) -> SyncResult<usize>;
}

/// SQLite checkpoint store
///
/// The connection is opened once and held for the lifetime of the store.
pub struct SqliteCheckpointStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database at `path`
    pub fn open(path: impl AsRef<Path>) -> SyncResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=FULL;")?;
        init_schema(&conn)?;

        info!(path = %path.display(), "Opened checkpoint store");

        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory() -> SyncResult<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    /// Database path, `None` for in-memory stores
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn init_schema(conn: &Connection) -> SyncResult<()> {
    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version >= SCHEMA_VERSION {
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS checkpoints (
            bucket     TEXT PRIMARY KEY,
            last_ts    TEXT NOT NULL,
            last_id    TEXT,
            updated_at TEXT NOT NULL
        );
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

    debug!(version = SCHEMA_VERSION, "Initialized checkpoint schema");
    Ok(())
}

fn decode_timestamp(
    bucket: &BucketId,
    raw: String,
) -> SyncResult<chrono::DateTime<Utc>> {
    parse_timestamp(&raw).ok_or_else(|| SyncError::CorruptCheckpoint {
        bucket: bucket.clone(),
        value: raw,
    })
}

impl CheckpointStore for SqliteCheckpointStore {
    fn get(&self, bucket: &BucketId) -> SyncResult<Option<Checkpoint>> {
        let row: Option<(String, Option<String>)> = self
            .conn
            .query_row(
                "SELECT last_ts, last_id FROM checkpoints WHERE bucket = ?1",
                params![bucket.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((last_ts, last_id)) => Ok(Some(Checkpoint {
                last_timestamp: decode_timestamp(bucket, last_ts)?,
                last_id,
            })),
            None => Ok(None),
        }
    }

    fn set(&mut self, bucket: &BucketId, checkpoint: &Checkpoint) -> SyncResult<()> {
        self.conn.execute(
            "INSERT INTO checkpoints (bucket, last_ts, last_id, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(bucket) DO UPDATE SET
                last_ts = excluded.last_ts,
                last_id = excluded.last_id,
                updated_at = excluded.updated_at",
            params![
                bucket.as_str(),
                format_timestamp(&checkpoint.last_timestamp),
                checkpoint.last_id,
                format_timestamp(&Utc::now()),
            ],
        )?;
        Ok(())
    }

    fn list(&self) -> SyncResult<Vec<CheckpointRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT bucket, last_ts, last_id, updated_at FROM checkpoints ORDER BY bucket",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(bucket, last_ts, last_id, updated_at)| {
                let bucket = BucketId::new(bucket);
                let last_timestamp = decode_timestamp(&bucket, last_ts)?;
                let updated_at = decode_timestamp(&bucket, updated_at)?;
                Ok(CheckpointRecord {
                    bucket,
                    checkpoint: Checkpoint {
                        last_timestamp,
                        last_id,
                    },
                    updated_at,
                })
            })
            .collect()
    }

    fn reset(&mut self, bucket: &BucketId) -> SyncResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM checkpoints WHERE bucket = ?1",
            params![bucket.as_str()],
        )?;
        if removed > 0 {
            info!(bucket = %bucket, "Checkpoint reset");
        }
        Ok(removed > 0)
    }

    fn reset_all(&mut self) -> SyncResult<usize> {
        let removed = self.conn.execute("DELETE FROM checkpoints", [])?;
        info!(removed = removed, "All checkpoints reset");
        Ok(removed)
    }
}
