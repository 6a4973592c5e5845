//! Sync loop orchestration
//!
//! One iteration lists the local buckets and, for each bucket in turn,
//! fetches events after its checkpoint, posts them as one batch and advances
//! the checkpoint on success. A transient failure aborts the iteration and
//! the loop sleeps a backoff delay instead of the fixed interval.

use super::backoff::{Backoff, DEFAULT_BASE};
use super::client::{PostOutcome, RemoteSink};
use super::heartbeat::{AgentIdentity, HeartbeatReporter, MIN_HEARTBEAT_INTERVAL};
use crate::batch::{after_checkpoint, Batch};
use crate::checkpoint::CheckpointStore;
use crate::error::{SyncError, SyncResult};
use crate::health::{components, HealthRegistry};
use crate::models::{format_timestamp, BucketId, Checkpoint, Event};
use crate::observability::{BatchOutcome, StructuredLogger, SyncMetrics};
use crate::source::EventSource;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Largest fetch used to reach past events tied at the checkpoint timestamp
const MAX_FETCH_WINDOW: usize = 10_000;

/// Configuration for the sync loop
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Sleep between successful iterations (default: 60 seconds)
    pub interval: Duration,
    /// Maximum events per batch and per fetch (default: 500)
    pub batch_size: usize,
    /// First backoff delay (default: 5 seconds)
    pub backoff_base: Duration,
    /// Backoff cap (default: 900 seconds)
    pub backoff_max: Duration,
    /// Relative jitter applied to backoff delays (default: 0.2)
    pub jitter_ratio: f64,
    /// Minimum spacing of heartbeats (default and floor: 600 seconds)
    pub heartbeat_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            batch_size: 500,
            backoff_base: DEFAULT_BASE,
            backoff_max: Duration::from_secs(900),
            jitter_ratio: 0.2,
            heartbeat_interval: MIN_HEARTBEAT_INTERVAL,
        }
    }
}

impl SyncConfig {
    pub fn validate(&self) -> SyncResult<()> {
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch_size must be at least 1".into()));
        }
        if self.interval < Duration::from_secs(1) {
            return Err(SyncError::Config("interval must be at least 1 second".into()));
        }
        if !self.jitter_ratio.is_finite() || self.jitter_ratio < 0.0 {
            return Err(SyncError::Config(format!(
                "jitter_ratio must be a non-negative number, got {}",
                self.jitter_ratio
            )));
        }
        Ok(())
    }
}

/// Summary of one completed iteration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationReport {
    /// Buckets listed by the local service
    pub buckets: usize,
    /// Events fetched after their checkpoints, across all buckets
    pub pending: usize,
    pub batches_forwarded: usize,
    pub events_forwarded: usize,
    /// Buckets whose batch was permanently rejected
    pub rejected: Vec<BucketId>,
    /// Buckets with events that were not posted because no remote is configured
    pub held_back: usize,
}

/// The checkpointed fetch, batch and forward loop
pub struct SyncEngine {
    config: SyncConfig,
    source: Box<dyn EventSource>,
    remote: Option<Box<dyn RemoteSink>>,
    store: Box<dyn CheckpointStore>,
    backoff: Backoff,
    heartbeat: HeartbeatReporter,
    health: HealthRegistry,
    metrics: SyncMetrics,
    logger: StructuredLogger,
    rejections: HashMap<BucketId, u32>,
}

impl SyncEngine {
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    /// Permanent rejections of `bucket` since its last successful post
    pub fn consecutive_rejections(&self, bucket: &BucketId) -> u32 {
        self.rejections.get(bucket).copied().unwrap_or(0)
    }

    /// Register the tracked components with their initial status
    pub async fn register_health(&self) {
        self.health.register(components::LOCAL_SOURCE).await;
        self.health.register(components::CHECKPOINT_STORE).await;
        if self.remote.is_some() {
            self.health.register(components::REMOTE).await;
        } else {
            self.health
                .set_degraded(components::REMOTE, "no remote endpoint configured")
                .await;
        }
    }

    /// Run the loop until `shutdown` fires.
    ///
    /// Shutdown only interrupts the sleep between iterations; an iteration in
    /// progress always runs to completion.
    pub async fn run(&mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_secs = self.config.interval.as_secs(),
            batch_size = self.config.batch_size,
            remote = self.remote.is_some(),
            "Starting sync loop"
        );
        self.register_health().await;

        loop {
            let delay = self.tick().await;
            debug!(delay_ms = delay.as_millis() as u64, "Sleeping until next iteration");

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down sync loop");
                    break;
                }
            }
        }
    }

    /// Run one iteration, send a heartbeat if due, and return the sleep to apply
    pub async fn tick(&mut self) -> Duration {
        let start = Instant::now();
        let result = self.run_iteration().await;
        self.metrics.observe_iteration(start.elapsed());
        self.health.set_ready(true).await;

        match result {
            Ok(report) => {
                debug!(
                    buckets = report.buckets,
                    pending = report.pending,
                    batches = report.batches_forwarded,
                    events = report.events_forwarded,
                    rejected = report.rejected.len(),
                    held_back = report.held_back,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Sync iteration complete"
                );
                self.metrics.set_pending_events(report.pending);
                self.metrics.set_backoff(Duration::ZERO);

                let sent = self
                    .heartbeat
                    .maybe_send(self.remote.as_deref(), report.pending, Instant::now())
                    .await;
                if let Some(delivered) = sent {
                    self.metrics.record_heartbeat(delivered);
                    self.logger.log_heartbeat(delivered, report.pending);
                }

                self.config.interval
            }
            Err(e) => {
                self.metrics.inc_iteration_failures();
                let delay = self.backoff.next_delay();
                self.metrics.set_backoff(delay);
                self.logger
                    .log_backoff(&e.to_string(), delay, self.backoff.failures());
                delay
            }
        }
    }

    /// One pass over every local bucket.
    ///
    /// Stops at the first error; buckets after it wait for the next iteration.
    pub async fn run_iteration(&mut self) -> SyncResult<IterationReport> {
        let listed = self.source.list_buckets().await;
        let buckets = self.track(components::LOCAL_SOURCE, listed).await?;

        let mut report = IterationReport {
            buckets: buckets.len(),
            ..Default::default()
        };
        for bucket in &buckets {
            self.sync_bucket(bucket, &mut report).await?;
        }

        self.rejections.retain(|bucket, _| buckets.contains(bucket));
        Ok(report)
    }

    async fn sync_bucket(
        &mut self,
        bucket: &BucketId,
        report: &mut IterationReport,
    ) -> SyncResult<()> {
        let stored = self.store.get(bucket);
        let checkpoint = self.track(components::CHECKPOINT_STORE, stored).await?;
        let since = checkpoint.as_ref().map(|c| c.last_timestamp);
        // One extra slot for the boundary event the inclusive bound returns
        let mut limit = match &checkpoint {
            Some(Checkpoint {
                last_id: Some(_), ..
            }) => self.config.batch_size + 1,
            _ => self.config.batch_size,
        };

        let events = loop {
            let fetched = self.source.fetch_events(bucket, since, limit).await;
            let fetched = self.track(components::LOCAL_SOURCE, fetched).await?;
            if !ends_in_tie(&fetched, limit, checkpoint.as_ref()) {
                break after_checkpoint(fetched, checkpoint.as_ref());
            }
            if limit >= MAX_FETCH_WINDOW {
                warn!(
                    bucket = %bucket,
                    limit,
                    "Too many events share the checkpoint timestamp, some may be resent"
                );
                break after_checkpoint(fetched, checkpoint.as_ref());
            }
            limit = (limit * 2).min(MAX_FETCH_WINDOW);
            debug!(bucket = %bucket, limit, "Widening fetch past tied events");
        };

        let Some(batch) = Batch::build(bucket.clone(), events, self.config.batch_size) else {
            debug!(bucket = %bucket, "No new events");
            return Ok(());
        };
        report.pending += batch.len();

        let outcome = match self.remote.as_deref() {
            Some(remote) => remote.post(&batch).await,
            None => {
                debug!(bucket = %bucket, pending = batch.len(), "No remote configured, holding events");
                report.held_back += 1;
                return Ok(());
            }
        };

        match outcome {
            PostOutcome::Success => {
                self.metrics.record_batch(BatchOutcome::Success, batch.len());
                self.health.set_healthy(components::REMOTE).await;
                self.backoff.reset();
                self.rejections.remove(bucket);

                self.advance_checkpoint(bucket, &batch).await?;
                report.batches_forwarded += 1;
                report.events_forwarded += batch.len();
                self.logger.log_batch_forwarded(
                    bucket.as_str(),
                    batch.len(),
                    &format_timestamp(&batch.last_timestamp()),
                );
                Ok(())
            }
            PostOutcome::Transient { status, reason } => {
                self.metrics.record_batch(BatchOutcome::Transient, batch.len());
                self.health
                    .set_unhealthy(components::REMOTE, reason.clone())
                    .await;
                Err(SyncError::TransientRemote {
                    bucket: bucket.clone(),
                    status,
                    reason,
                })
            }
            PostOutcome::Permanent { status, body } => {
                self.metrics.record_batch(BatchOutcome::Permanent, batch.len());
                self.health
                    .set_degraded(
                        components::REMOTE,
                        format!("batch for {} rejected with {}", bucket, status),
                    )
                    .await;

                let consecutive = self.rejections.entry(bucket.clone()).or_insert(0);
                *consecutive += 1;
                self.logger
                    .log_batch_rejected(bucket.as_str(), status, &body, *consecutive);
                report.rejected.push(bucket.clone());
                Ok(())
            }
        }
    }

    /// Store the batch's last event as the bucket's checkpoint.
    ///
    /// The stored value is re-read first: an operator may have moved it
    /// forward while the post was in flight, and it must not move back.
    async fn advance_checkpoint(&mut self, bucket: &BucketId, batch: &Batch) -> SyncResult<()> {
        let next = batch.checkpoint();
        let current = self.store.get(bucket);
        let current = self.track(components::CHECKPOINT_STORE, current).await?;

        if let Some(current) = current.filter(|c| c.last_timestamp > next.last_timestamp) {
            warn!(
                bucket = %bucket,
                stored = %format_timestamp(&current.last_timestamp),
                batch_last = %format_timestamp(&next.last_timestamp),
                "Stored checkpoint is ahead of the forwarded batch, keeping it"
            );
            return Ok(());
        }

        let written = self.store.set(bucket, &next);
        self.track(components::CHECKPOINT_STORE, written).await
    }

    /// Mirror the result of a call to `component` into the health registry
    async fn track<T>(&self, component: &str, result: SyncResult<T>) -> SyncResult<T> {
        match &result {
            Ok(_) => self.health.set_healthy(component).await,
            Err(e) => self.health.set_unhealthy(component, e.to_string()).await,
        }
        result
    }
}

/// Whether a full fetch stops inside the run of events tied at the
/// checkpoint timestamp, so the boundary event or its successors may lie
/// beyond it.
fn ends_in_tie(fetched: &[Event], limit: usize, checkpoint: Option<&Checkpoint>) -> bool {
    match (checkpoint, fetched.last()) {
        (Some(checkpoint), Some(last)) => {
            checkpoint.last_id.is_some()
                && fetched.len() >= limit
                && last.timestamp == checkpoint.last_timestamp
        }
        _ => false,
    }
}

/// Builder for the sync engine
pub struct SyncEngineBuilder {
    config: SyncConfig,
    source: Box<dyn EventSource>,
    store: Box<dyn CheckpointStore>,
    remote: Option<Box<dyn RemoteSink>>,
    health: Option<HealthRegistry>,
    identity: Option<AgentIdentity>,
}

impl SyncEngineBuilder {
    pub fn new(source: Box<dyn EventSource>, store: Box<dyn CheckpointStore>) -> Self {
        Self {
            config: SyncConfig::default(),
            source,
            store,
            remote: None,
            health: None,
            identity: None,
        }
    }

    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Remote to post to; without one, events are fetched but never sent
    pub fn remote(mut self, remote: Box<dyn RemoteSink>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Share an existing registry, e.g. with the HTTP endpoints
    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn identity(mut self, identity: AgentIdentity) -> Self {
        self.identity = Some(identity);
        self
    }

    pub fn build(self) -> SyncResult<SyncEngine> {
        self.config.validate()?;

        let identity = self.identity.unwrap_or_else(AgentIdentity::detect);
        let logger = StructuredLogger::new(identity.host.clone());
        let backoff = Backoff::new(
            self.config.backoff_base,
            self.config.backoff_max,
            self.config.jitter_ratio,
        );
        let heartbeat = HeartbeatReporter::new(identity, self.config.heartbeat_interval);

        Ok(SyncEngine {
            config: self.config,
            source: self.source,
            remote: self.remote,
            store: self.store,
            backoff,
            heartbeat,
            health: self.health.unwrap_or_default(),
            metrics: SyncMetrics::new(),
            logger,
            rejections: HashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_config_default() {
        let config = SyncConfig::default();
        assert_eq!(config.interval, Duration::from_secs(60));
        assert_eq!(config.batch_size, 500);
        assert_eq!(config.backoff_base, Duration::from_secs(5));
        assert_eq!(config.backoff_max, Duration::from_secs(900));
        assert!((config.jitter_ratio - 0.2).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_sync_config_rejects_bad_values() {
        let zero_batch = SyncConfig {
            batch_size: 0,
            ..Default::default()
        };
        assert!(matches!(zero_batch.validate(), Err(SyncError::Config(_))));

        let fast = SyncConfig {
            interval: Duration::from_millis(10),
            ..Default::default()
        };
        assert!(fast.validate().is_err());

        let bad_jitter = SyncConfig {
            jitter_ratio: f64::NAN,
            ..Default::default()
        };
        assert!(bad_jitter.validate().is_err());
    }
}
