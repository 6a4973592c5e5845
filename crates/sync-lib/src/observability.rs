//! Observability infrastructure for the sync agent
//!
//! Provides:
//! - Prometheus metrics (forwarded events, batch outcomes, iteration latency, backoff)
//! - Structured JSON logging of lifecycle events with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{info, warn};

/// Histogram buckets for iteration duration (in seconds)
const ITERATION_BUCKETS: &[f64] = &[0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<SyncMetricsInner> = OnceLock::new();

struct SyncMetricsInner {
    events_forwarded: IntCounter,
    batches: IntCounterVec,
    iteration_duration_seconds: Histogram,
    pending_events: IntGauge,
    backoff_seconds: IntGauge,
    iteration_failures: IntCounter,
    heartbeats: IntCounterVec,
}

impl SyncMetricsInner {
    fn new() -> Self {
        Self {
            events_forwarded: register_int_counter!(
                "activity_sync_events_forwarded_total",
                "Events acknowledged by the remote"
            )
            .expect("Failed to register events_forwarded"),

            batches: register_int_counter_vec!(
                "activity_sync_batches_total",
                "Batch posts by outcome",
                &["outcome"]
            )
            .expect("Failed to register batches"),

            iteration_duration_seconds: register_histogram!(
                "activity_sync_iteration_duration_seconds",
                "Time spent in one sync iteration",
                ITERATION_BUCKETS.to_vec()
            )
            .expect("Failed to register iteration_duration_seconds"),

            pending_events: register_int_gauge!(
                "activity_sync_pending_events",
                "Events fetched but not yet acknowledged in the last iteration"
            )
            .expect("Failed to register pending_events"),

            backoff_seconds: register_int_gauge!(
                "activity_sync_backoff_seconds",
                "Delay applied after the last failed iteration, 0 after success"
            )
            .expect("Failed to register backoff_seconds"),

            iteration_failures: register_int_counter!(
                "activity_sync_iteration_failures_total",
                "Iterations aborted by an error"
            )
            .expect("Failed to register iteration_failures"),

            heartbeats: register_int_counter_vec!(
                "activity_sync_heartbeats_total",
                "Heartbeat attempts by result",
                &["result"]
            )
            .expect("Failed to register heartbeats"),
        }
    }
}

/// Outcome label for batch metrics
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    Success,
    Transient,
    Permanent,
}

impl BatchOutcome {
    fn as_label(&self) -> &'static str {
        match self {
            BatchOutcome::Success => "success",
            BatchOutcome::Transient => "transient",
            BatchOutcome::Permanent => "permanent",
        }
    }
}

/// Sync metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct SyncMetrics {
    _private: (),
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &SyncMetricsInner {
        GLOBAL_METRICS.get_or_init(SyncMetricsInner::new)
    }

    pub fn record_batch(&self, outcome: BatchOutcome, events: usize) {
        let inner = self.inner();
        inner
            .batches
            .with_label_values(&[outcome.as_label()])
            .inc();
        if outcome == BatchOutcome::Success {
            inner.events_forwarded.inc_by(events as u64);
        }
    }

    pub fn observe_iteration(&self, duration: Duration) {
        self.inner()
            .iteration_duration_seconds
            .observe(duration.as_secs_f64());
    }

    pub fn set_pending_events(&self, pending: usize) {
        self.inner().pending_events.set(pending as i64);
    }

    pub fn set_backoff(&self, delay: Duration) {
        self.inner().backoff_seconds.set(delay.as_secs() as i64);
    }

    pub fn inc_iteration_failures(&self) {
        self.inner().iteration_failures.inc();
    }

    pub fn record_heartbeat(&self, delivered: bool) {
        let result = if delivered { "delivered" } else { "failed" };
        self.inner().heartbeats.with_label_values(&[result]).inc();
    }
}

/// Structured logger for agent lifecycle events
///
/// Every record carries an `event` field so log pipelines can filter on it.
#[derive(Clone)]
pub struct StructuredLogger {
    host: String,
}

impl StructuredLogger {
    pub fn new(host: impl Into<String>) -> Self {
        Self { host: host.into() }
    }

    pub fn log_startup(&self, version: &str, remote: Option<&str>, local_api: &str) {
        info!(
            event = "agent_started",
            host = %self.host,
            agent_version = %version,
            remote = remote.unwrap_or("none"),
            local_api = %local_api,
            "Activity sync agent started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            host = %self.host,
            reason = %reason,
            "Activity sync agent shutting down"
        );
    }

    pub fn log_batch_forwarded(&self, bucket: &str, count: usize, last_ts: &str) {
        info!(
            event = "batch_forwarded",
            host = %self.host,
            bucket = %bucket,
            count = count,
            last_ts = %last_ts,
            "Batch forwarded"
        );
    }

    /// A permanent rejection; the same batch is retried next iteration.
    pub fn log_batch_rejected(&self, bucket: &str, status: u16, body: &str, consecutive: u32) {
        warn!(
            event = "batch_rejected",
            host = %self.host,
            bucket = %bucket,
            status = status,
            body = %body,
            consecutive_rejections = consecutive,
            "Batch rejected by remote, checkpoint kept"
        );
    }

    pub fn log_backoff(&self, error: &str, delay: Duration, failures: u32) {
        warn!(
            event = "sync_backoff",
            host = %self.host,
            error = %error,
            delay_secs = delay.as_secs_f64(),
            consecutive_failures = failures,
            "Sync iteration failed, backing off"
        );
    }

    pub fn log_heartbeat(&self, delivered: bool, pending: usize) {
        info!(
            event = "heartbeat",
            host = %self.host,
            delivered = delivered,
            queue_size = pending,
            "Heartbeat attempted"
        );
    }
}
