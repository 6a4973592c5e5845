//! Error types for the sync engine.

use crate::models::BucketId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while relaying events.
///
/// Every variant is recoverable by retrying on a later iteration; none of
/// them terminates the sync loop.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The local event service is unreachable or answered with a failure.
    #[error("local source unavailable: {0}")]
    SourceUnavailable(String),

    /// The remote answered with a retryable status, or the request never
    /// completed (connection refused, timeout).
    #[error("transient remote failure for bucket {bucket}: {reason}")]
    TransientRemote {
        /// Bucket whose batch was being posted.
        bucket: BucketId,
        /// HTTP status, absent for network-level failures.
        status: Option<u16>,
        /// Human readable cause.
        reason: String,
    },

    /// Reading or writing the checkpoint database failed.
    #[error("checkpoint storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A stored checkpoint could not be decoded.
    #[error("corrupt checkpoint for bucket {bucket}: {value:?}")]
    CorruptCheckpoint {
        /// Bucket owning the row.
        bucket: BucketId,
        /// Raw stored timestamp.
        value: String,
    },

    /// A remote call outside the batch path (heartbeat) failed.
    #[error("remote request failed: {0}")]
    Remote(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
