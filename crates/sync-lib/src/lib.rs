//! Library for relaying local activity events to a remote ingestion service
//!
//! This crate provides the core functionality for:
//! - Durable per-bucket checkpoints
//! - Reading buckets and events from the local activity service
//! - Building idempotent batches
//! - Forwarding with backoff and heartbeats
//! - Health checks and observability

pub mod batch;
pub mod checkpoint;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod source;
pub mod sync;

pub use batch::Batch;
pub use checkpoint::{CheckpointStore, SqliteCheckpointStore};
pub use error::{SyncError, SyncResult};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{StructuredLogger, SyncMetrics};
pub use source::{EventSource, LocalSourceClient, SourceConfig, DEFAULT_LOCAL_API};
