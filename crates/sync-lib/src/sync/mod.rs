//! Forwarding of local events to the remote ingestion service
//!
//! This module provides:
//! - HTTP client for batch posts and heartbeats
//! - Jittered exponential backoff
//! - Rate-limited heartbeat reporting
//! - The sync loop tying source, store and remote together

mod backoff;
mod client;
mod engine;
mod heartbeat;


pub use backoff::{Backoff, DEFAULT_BASE, MIN_DELAY};
pub use client::{
    Heartbeat, PostOutcome, RemoteConfig, RemoteSink, RemoteSyncClient, RemoteSyncClientBuilder,
    HEARTBEAT_PATH, IDEMPOTENCY_HEADER, INGEST_PATH, USER_AGENT,
};
pub use engine::{IterationReport, SyncConfig, SyncEngine, SyncEngineBuilder};
pub use heartbeat::{AgentIdentity, HeartbeatReporter, MIN_HEARTBEAT_INTERVAL};
