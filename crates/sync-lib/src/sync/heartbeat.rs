//! Best-effort liveness reporting

use super::client::{Heartbeat, RemoteSink};
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Heartbeats are never sent more often than this
pub const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(600);

/// Host and user identity reported with each heartbeat
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    pub host: String,
    pub user: String,
    pub os: String,
    pub version: String,
}

impl AgentIdentity {
    /// Identity of the machine and account running this process
    pub fn detect() -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "unknown".to_string());
        let user = std::env::var("USER")
            .or_else(|_| std::env::var("USERNAME"))
            .unwrap_or_else(|_| "unknown".to_string());

        Self {
            host,
            user,
            os: std::env::consts::OS.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Rate-limited heartbeat sender
pub struct HeartbeatReporter {
    identity: AgentIdentity,
    interval: Duration,
    started_at: Instant,
    last_sent: Option<Instant>,
}

impl HeartbeatReporter {
    /// Create a reporter; intervals below [`MIN_HEARTBEAT_INTERVAL`] are raised to it
    pub fn new(identity: AgentIdentity, interval: Duration) -> Self {
        Self {
            identity,
            interval: interval.max(MIN_HEARTBEAT_INTERVAL),
            started_at: Instant::now(),
            last_sent: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn identity(&self) -> &AgentIdentity {
        &self.identity
    }

    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_sent {
            Some(last) => now.saturating_duration_since(last) >= self.interval,
            None => true,
        }
    }

    fn payload(&self, pending: usize, now: Instant) -> Heartbeat {
        Heartbeat {
            host: self.identity.host.clone(),
            user: self.identity.user.clone(),
            version: self.identity.version.clone(),
            last_sync_ts: Utc::now(),
            queue_size: pending,
            os: self.identity.os.clone(),
            uptime: Some(now.saturating_duration_since(self.started_at).as_secs()),
        }
    }

    /// Send a heartbeat if one is due and a remote is configured.
    ///
    /// Returns `Some(delivered)` when an attempt was made. The attempt time is
    /// recorded either way.
    pub async fn maybe_send(
        &mut self,
        remote: Option<&dyn RemoteSink>,
        pending: usize,
        now: Instant,
    ) -> Option<bool> {
        let remote = remote?;
        if !self.is_due(now) {
            return None;
        }

        self.last_sent = Some(now);
        let heartbeat = self.payload(pending, now);
        match remote.heartbeat(&heartbeat).await {
            Ok(()) => Some(true),
            Err(e) => {
                debug!(error = %e, "Heartbeat not delivered");
                Some(false)
            }
        }
    }
}
