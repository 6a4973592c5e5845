//! Client for the local event-tracking service
//!
//! Lists buckets and fetches events after a cursor. Whatever shape the local
//! service answers with is resolved here into typed [`BucketId`]s and
//! [`Event`]s, so nothing past this boundary sees raw JSON.

use crate::error::{SyncError, SyncResult};
use crate::models::{format_timestamp, BucketId, Event};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde_json::Value;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Default address of the local event service
pub const DEFAULT_LOCAL_API: &str = "http://127.0.0.1:5600/api/0";

/// Source of buckets and their events
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Every bucket currently known to the source
    async fn list_buckets(&self) -> SyncResult<BTreeSet<BucketId>>;

    /// Events of `bucket` at or after `since`, ascending by timestamp,
    /// at most `limit` of them
    async fn fetch_events(
        &self,
        bucket: &BucketId,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> SyncResult<Vec<Event>>;
}

/// Configuration for the local source client
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Base URL of the local API (e.g., "http://127.0.0.1:5600/api/0")
    pub base_url: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read timeout
    pub read_timeout: Duration,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_LOCAL_API.to_string(),
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// HTTP client for the local event service
pub struct LocalSourceClient {
    client: Client,
    base_url: Url,
}

impl LocalSourceClient {
    /// Create a new client
    pub fn new(config: SourceConfig) -> SyncResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .read_timeout(config.read_timeout)
            .build()
            .map_err(|e| SyncError::Config(format!("failed to create HTTP client: {}", e)))?;

        let base_url = Url::parse(config.base_url.trim_end_matches('/')).map_err(|e| {
            SyncError::Config(format!("invalid local API URL {}: {}", config.base_url, e))
        })?;

        Ok(Self { client, base_url })
    }

    /// Create a client for `base_url` with default timeouts
    pub fn with_defaults(base_url: impl Into<String>) -> SyncResult<Self> {
        Self::new(SourceConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Build `{base}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| {
                SyncError::Config(format!("local API URL cannot be a base: {}", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json(&self, url: Url, query: &[(&str, String)]) -> SyncResult<Value> {
        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("GET {}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::SourceUnavailable(format!(
                "GET {} returned {}",
                url, status
            )));
        }

        response
            .json()
            .await
            .map_err(|e| SyncError::SourceUnavailable(format!("GET {}: invalid body: {}", url, e)))
    }
}

#[async_trait]
impl EventSource for LocalSourceClient {
    async fn list_buckets(&self) -> SyncResult<BTreeSet<BucketId>> {
        let url = self.endpoint(&["buckets"])?;
        let body = self.get_json(url, &[]).await?;
        let buckets = resolve_buckets(body);
        debug!(count = buckets.len(), "Listed local buckets");
        Ok(buckets)
    }

    async fn fetch_events(
        &self,
        bucket: &BucketId,
        since: Option<DateTime<Utc>>,
        limit: usize,
    ) -> SyncResult<Vec<Event>> {
        let url = self.endpoint(&["buckets", bucket.as_str(), "events"])?;

        let mut query = vec![("limit", limit.to_string())];
        if let Some(since) = since {
            query.push(("start", format_timestamp(&since)));
        }

        let body = self.get_json(url, &query).await?;
        let Value::Array(raw) = body else {
            return Err(SyncError::SourceUnavailable(format!(
                "events for bucket {} were not a JSON array",
                bucket
            )));
        };

        let mut events: Vec<Event> = raw
            .into_iter()
            .filter_map(|value| match serde_json::from_value::<Event>(value) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(bucket = %bucket, error = %e, "Skipping malformed event");
                    None
                }
            })
            .collect();

        // Stable sort keeps fetch order for equal timestamps
        events.sort_by_key(|e| e.timestamp);
        events.truncate(limit);

        debug!(bucket = %bucket, count = events.len(), "Fetched events");
        Ok(events)
    }
}

/// Resolve the bucket listing into typed identifiers.
///
/// Accepts `{"buckets": [...]}`, a bare array, or an object keyed by bucket
/// id. Array entries may be objects carrying `id` or `bucket_id`, or plain
/// strings.
pub fn resolve_buckets(body: Value) -> BTreeSet<BucketId> {
    let entries = match body {
        Value::Object(mut map) => match map.remove("buckets") {
            Some(Value::Array(entries)) => entries,
            Some(other) => {
                warn!(value = %other, "Unexpected `buckets` field in bucket listing");
                Vec::new()
            }
            None => return map.into_iter().map(|(id, _)| BucketId::new(id)).collect(),
        },
        Value::Array(entries) => entries,
        other => {
            warn!(value = %other, "Unexpected bucket listing");
            Vec::new()
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let id = match &entry {
                Value::String(s) => Some(s.clone()),
                Value::Object(obj) => obj
                    .get("id")
                    .or_else(|| obj.get("bucket_id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                _ => None,
            };
            if id.is_none() {
                warn!(entry = %entry, "Skipping bucket entry without an identifier");
            }
            id.filter(|s| !s.is_empty()).map(BucketId::new)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use mockito::Matcher;
    use serde_json::json;

    fn ids(buckets: &BTreeSet<BucketId>) -> Vec<&str> {
        buckets.iter().map(BucketId::as_str).collect()
    }

    #[test]
    fn test_resolve_buckets_shapes() {
        let wrapped = resolve_buckets(json!({"buckets": [{"id": "b"}, {"bucket_id": "a"}, "c"]}));
        assert_eq!(ids(&wrapped), vec!["a", "b", "c"]);

        let bare = resolve_buckets(json!(["x", {"id": "y"}]));
        assert_eq!(ids(&bare), vec!["x", "y"]);

        let keyed = resolve_buckets(json!({
            "aw-watcher-window_host": {"type": "currentwindow"},
            "aw-watcher-afk_host": {"type": "afkstatus"}
        }));
        assert_eq!(
            ids(&keyed),
            vec!["aw-watcher-afk_host", "aw-watcher-window_host"]
        );
    }

    #[test]
    fn test_resolve_buckets_skips_unresolvable() {
        let buckets = resolve_buckets(json!([{"name": "nope"}, 42, "", {"id": 7}, "ok"]));
        assert_eq!(ids(&buckets), vec!["ok"]);
        assert!(resolve_buckets(json!("just a string")).is_empty());
    }

    #[tokio::test]
    async fn test_list_buckets() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/0/buckets")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"aw-watcher-window": {}, "aw-watcher-afk": {}}"#)
            .create_async()
            .await;

        let client = LocalSourceClient::with_defaults(format!("{}/api/0", server.url())).unwrap();
        let buckets = client.list_buckets().await.unwrap();

        mock.assert_async().await;
        assert_eq!(ids(&buckets), vec!["aw-watcher-afk", "aw-watcher-window"]);
    }

    #[tokio::test]
    async fn test_list_buckets_error_status_is_source_unavailable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/0/buckets")
            .with_status(500)
            .create_async()
            .await;

        let client = LocalSourceClient::with_defaults(format!("{}/api/0", server.url())).unwrap();
        let err = client.list_buckets().await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_unreachable_source_is_source_unavailable() {
        let client = LocalSourceClient::with_defaults("http://127.0.0.1:1/api/0").unwrap();
        let err = client.list_buckets().await.unwrap_err();
        assert!(matches!(err, SyncError::SourceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_fetch_events_sends_cursor_and_sorts() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/0/buckets/aw-watcher-window/events")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("limit".into(), "500".into()),
                Matcher::UrlEncoded("start".into(), "1970-01-01T00:00:10Z".into()),
            ]))
            .with_status(200)
            .with_body(
                json!([
                    {"id": 3, "timestamp": "1970-01-01T00:00:12Z", "duration": 1.0, "data": {}},
                    {"id": 1, "timestamp": "1970-01-01T00:00:10Z", "duration": 1.0, "data": {}},
                    {"id": 2, "timestamp": "1970-01-01T00:00:11Z", "duration": 1.0, "data": {}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = LocalSourceClient::with_defaults(format!("{}/api/0", server.url())).unwrap();
        let events = client
            .fetch_events(
                &BucketId::new("aw-watcher-window"),
                Some(Utc.timestamp_opt(10, 0).unwrap()),
                500,
            )
            .await
            .unwrap();

        mock.assert_async().await;
        let order: Vec<_> = events.iter().map(|e| e.id.clone().unwrap()).collect();
        assert_eq!(order, vec!["1", "2", "3"]);
    }

    #[tokio::test]
    async fn test_fetch_events_without_cursor_and_truncation() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/0/buckets/b/events")
            .match_query(Matcher::UrlEncoded("limit".into(), "2".into()))
            .with_status(200)
            .with_body(
                json!([
                    {"timestamp": "1970-01-01T00:00:01Z"},
                    {"timestamp": "1970-01-01T00:00:02Z"},
                    {"timestamp": "1970-01-01T00:00:03Z"}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = LocalSourceClient::with_defaults(format!("{}/api/0", server.url())).unwrap();
        let events = client
            .fetch_events(&BucketId::new("b"), None, 2)
            .await
            .unwrap();

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].timestamp, Utc.timestamp_opt(2, 0).unwrap());
    }

    #[tokio::test]
    async fn test_fetch_events_skips_malformed_and_encodes_bucket() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock(
                "GET",
                Matcher::Regex(r"^/api/0/buckets/my(%20| )bucket/events".to_string()),
            )
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(
                json!([
                    {"id": 1, "data": {}},
                    {"id": 2, "timestamp": "1970-01-01T00:00:05Z", "data": {}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let client = LocalSourceClient::with_defaults(format!("{}/api/0", server.url())).unwrap();
        let events = client
            .fetch_events(&BucketId::new("my bucket"), None, 10)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].id.as_deref(), Some("2"));
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(matches!(
            LocalSourceClient::with_defaults("not a url"),
            Err(SyncError::Config(_))
        ));
    }
}
