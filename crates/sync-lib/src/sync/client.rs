//! HTTP client for the remote ingestion service
//!
//! This module provides the client that:
//! - Posts batches with an idempotency key, user agent and optional bearer token
//! - Classifies every response into success, transient or permanent
//! - Delivers best-effort heartbeats

use crate::batch::Batch;
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Path of the batch ingest endpoint, relative to the remote base URL
pub const INGEST_PATH: &str = "/ingest/events";

/// Path of the heartbeat endpoint, relative to the remote base URL
pub const HEARTBEAT_PATH: &str = "/agent/heartbeat";

/// User agent sent with every remote request
pub const USER_AGENT: &str = concat!("activity-sync/", env!("CARGO_PKG_VERSION"));

/// Header carrying the batch idempotency key
pub const IDEMPOTENCY_HEADER: &str = "Idempotency-Key";

/// Statuses that signal overload or a flaky hop rather than a bad request
const TRANSIENT_STATUSES: [StatusCode; 4] = [
    StatusCode::TOO_MANY_REQUESTS,
    StatusCode::BAD_GATEWAY,
    StatusCode::SERVICE_UNAVAILABLE,
    StatusCode::GATEWAY_TIMEOUT,
];

/// Longest response body kept for logging a rejected batch
const MAX_LOGGED_BODY: usize = 500;

/// Result of posting one batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PostOutcome {
    /// 2xx: the checkpoint may advance to the batch's last event
    Success,
    /// Retryable status or network failure: back off, keep the checkpoint
    Transient {
        status: Option<u16>,
        reason: String,
    },
    /// Any other status: keep the checkpoint, move on to the next bucket
    Permanent { status: u16, body: String },
}

/// Liveness report sent to the remote
#[derive(Debug, Clone, Serialize)]
pub struct Heartbeat {
    pub host: String,
    pub user: String,
    pub version: String,
    pub last_sync_ts: DateTime<Utc>,
    pub queue_size: usize,
    pub os: String,
    pub uptime: Option<u64>,
}

/// Destination for batches and heartbeats
#[async_trait]
pub trait RemoteSink: Send + Sync {
    /// Post one batch and classify the outcome
    async fn post(&self, batch: &Batch) -> PostOutcome;

    /// Deliver a heartbeat
    async fn heartbeat(&self, heartbeat: &Heartbeat) -> SyncResult<()>;
}

/// Configuration for the remote client
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Remote base URL (e.g., "https://ingest.example.com")
    pub endpoint: String,
    /// Bearer token, omitted when `None`
    pub api_token: Option<String>,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_token: None,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the remote ingestion service
pub struct RemoteSyncClient {
    client: Client,
    ingest_url: Url,
    heartbeat_url: Url,
    api_token: Option<String>,
}

impl RemoteSyncClient {
    /// Create a new client with the given configuration
    pub fn new(config: RemoteConfig) -> SyncResult<Self> {
        let base = config.endpoint.trim_end_matches('/');
        let ingest_url = parse_endpoint(base, INGEST_PATH)?;
        let heartbeat_url = parse_endpoint(base, HEARTBEAT_PATH)?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            ingest_url,
            heartbeat_url,
            api_token: config.api_token.filter(|t| !t.is_empty()),
        })
    }

    pub fn ingest_url(&self) -> &Url {
        &self.ingest_url
    }

    pub fn heartbeat_url(&self) -> &Url {
        &self.heartbeat_url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn parse_endpoint(base: &str, path: &str) -> SyncResult<Url> {
    let url = Url::parse(&format!("{}{}", base, path))
        .map_err(|e| SyncError::Config(format!("invalid remote URL {}: {}", base, e)))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(SyncError::Config(format!(
            "unsupported remote URL scheme {}",
            other
        ))),
    }
}

/// Map a response status to a post outcome, body not yet read
fn classify(status: StatusCode) -> Option<PostOutcome> {
    if status.is_success() {
        Some(PostOutcome::Success)
    } else if TRANSIENT_STATUSES.contains(&status) {
        Some(PostOutcome::Transient {
            status: Some(status.as_u16()),
            reason: status.to_string(),
        })
    } else {
        None
    }
}

/// Cut `body` to at most [`MAX_LOGGED_BODY`] characters
fn truncate_body(mut body: String) -> String {
    if let Some((idx, _)) = body.char_indices().nth(MAX_LOGGED_BODY) {
        body.truncate(idx);
    }
    body
}

#[async_trait]
impl RemoteSink for RemoteSyncClient {
    async fn post(&self, batch: &Batch) -> PostOutcome {
        let request = self
            .client
            .post(self.ingest_url.clone())
            .header(IDEMPOTENCY_HEADER, batch.idempotency_key())
            .json(&batch.to_request());

        let response = match self.authorize(request).send().await {
            Ok(response) => response,
            Err(e) => {
                return PostOutcome::Transient {
                    status: None,
                    reason: e.to_string(),
                }
            }
        };

        let status = response.status();
        debug!(
            bucket = %batch.bucket(),
            status = status.as_u16(),
            count = batch.len(),
            "Batch post answered"
        );

        match classify(status) {
            Some(outcome) => outcome,
            None => PostOutcome::Permanent {
                status: status.as_u16(),
                body: truncate_body(response.text().await.unwrap_or_default()),
            },
        }
    }

    async fn heartbeat(&self, heartbeat: &Heartbeat) -> SyncResult<()> {
        let request = self
            .client
            .post(self.heartbeat_url.clone())
            .json(heartbeat);

        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| SyncError::Remote(format!("heartbeat: {}", e)))?;

        if !response.status().is_success() {
            return Err(SyncError::Remote(format!(
                "heartbeat returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Builder for the remote client
pub struct RemoteSyncClientBuilder {
    config: RemoteConfig,
}

impl RemoteSyncClientBuilder {
    pub fn new() -> Self {
        Self {
            config: RemoteConfig::default(),
        }
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoint = endpoint.into();
        self
    }

    pub fn api_token(mut self, token: impl Into<String>) -> Self {
        self.config.api_token = Some(token.into());
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    pub fn build(self) -> SyncResult<RemoteSyncClient> {
        if self.config.endpoint.trim().is_empty() {
            return Err(SyncError::Config("remote endpoint is required".into()));
        }
        RemoteSyncClient::new(self.config)
    }
}

impl Default for RemoteSyncClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}
