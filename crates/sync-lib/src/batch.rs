//! Batch building
//!
//! A batch is an ordered, bounded, immutable slice of one bucket's events.
//! Its idempotency key is derived from the batch identity only (bucket,
//! first and last timestamp, count), never from event contents, so a
//! retried batch always carries the key the receiver already saw.

use crate::models::{format_timestamp, BucketId, Checkpoint, Event};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Source tag attached to every ingest request
pub const SOURCE_TAG: &str = "activitywatch";

/// Version of the ingest body layout
pub const SCHEMA_VERSION: u32 = 1;

/// Events of one bucket, ready to post
#[derive(Debug, Clone)]
pub struct Batch {
    bucket: BucketId,
    events: Vec<Event>,
    idempotency_key: String,
}

impl Batch {
    /// Build a batch from ascending events, keeping at most `max_size`.
    ///
    /// Returns `None` when there is nothing to send.
    pub fn build(bucket: BucketId, mut events: Vec<Event>, max_size: usize) -> Option<Self> {
        events.truncate(max_size);
        let (first, last) = match (events.first(), events.last()) {
            (Some(first), Some(last)) => (first.timestamp, last.timestamp),
            _ => return None,
        };

        let idempotency_key = idempotency_key(&bucket, &first, &last, events.len());
        Some(Self {
            bucket,
            events,
            idempotency_key,
        })
    }

    pub fn bucket(&self) -> &BucketId {
        &self.bucket
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false; empty batches are never built
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }

    pub fn first_timestamp(&self) -> DateTime<Utc> {
        self.events[0].timestamp
    }

    pub fn last_timestamp(&self) -> DateTime<Utc> {
        self.events[self.events.len() - 1].timestamp
    }

    /// Checkpoint to store once this batch is acknowledged
    pub fn checkpoint(&self) -> Checkpoint {
        self.events[self.events.len() - 1].position()
    }

    /// Body for the remote ingest endpoint
    pub fn to_request(&self) -> IngestRequest<'_> {
        IngestRequest {
            bucket: &self.bucket,
            events: &self.events,
            first_ts: format_timestamp(&self.first_timestamp()),
            last_ts: format_timestamp(&self.last_timestamp()),
            count: self.events.len(),
            source: SOURCE_TAG,
            schema: SCHEMA_VERSION,
        }
    }
}

/// Wire body of a batch post
#[derive(Debug, Serialize)]
pub struct IngestRequest<'a> {
    pub bucket: &'a BucketId,
    pub events: &'a [Event],
    pub first_ts: String,
    pub last_ts: String,
    pub count: usize,
    pub source: &'static str,
    pub schema: u32,
}

/// Hex SHA-256 over `bucket|first|last|count`
pub fn idempotency_key(
    bucket: &BucketId,
    first: &DateTime<Utc>,
    last: &DateTime<Utc>,
    count: usize,
) -> String {
    let identity = format!(
        "{}|{}|{}|{}",
        bucket,
        format_timestamp(first),
        format_timestamp(last),
        count
    );
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    hex::encode(hasher.finalize())
}

/// Drop events already covered by `checkpoint`.
///
/// The fetch lower bound is inclusive, so events at the checkpoint timestamp
/// come back on every fetch. Ties keep fetch order, so every tied event up to
/// and including the one the checkpoint names was already forwarded. When
/// that event is absent, or the checkpoint has no id, all tied events are
/// kept. Events strictly before the checkpoint are always removed.
pub fn after_checkpoint(events: Vec<Event>, checkpoint: Option<&Checkpoint>) -> Vec<Event> {
    let Some(checkpoint) = checkpoint else {
        return events;
    };

    let mut events: Vec<Event> = events
        .into_iter()
        .filter(|e| e.timestamp >= checkpoint.last_timestamp)
        .collect();
    if let Some(boundary) = events.iter().position(|e| checkpoint.is_boundary(e)) {
        events.drain(..=boundary);
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::{json, Map};

    fn event(id: &str, secs: i64) -> Event {
        let mut payload = Map::new();
        payload.insert("data".to_string(), json!({"title": format!("window {}", id)}));
        Event::new(
            Some(id.to_string()),
            Utc.timestamp_opt(secs, 0).unwrap(),
            payload,
        )
    }

    #[test]
    fn test_empty_input_builds_nothing() {
        assert!(Batch::build(BucketId::new("w"), vec![], 10).is_none());
        assert!(Batch::build(BucketId::new("w"), vec![event("a", 1)], 0).is_none());
    }

    #[test]
    fn test_build_truncates_and_tracks_bounds() {
        let events = vec![event("a", 10), event("b", 11), event("c", 12)];
        let batch = Batch::build(BucketId::new("w"), events, 2).unwrap();

        assert_eq!(batch.len(), 2);
        assert_eq!(batch.first_timestamp(), Utc.timestamp_opt(10, 0).unwrap());
        assert_eq!(batch.last_timestamp(), Utc.timestamp_opt(11, 0).unwrap());
        assert_eq!(batch.checkpoint().last_id.as_deref(), Some("b"));
    }

    #[test]
    fn test_key_depends_only_on_identity() {
        let a = Batch::build(
            BucketId::new("w"),
            vec![event("1", 10), event("2", 11), event("3", 12)],
            500,
        )
        .unwrap();

        // Different ids and payloads, same bucket/bounds/count
        let mut middle = event("other", 11);
        middle.payload.insert("extra".to_string(), json!(true));
        let b = Batch::build(
            BucketId::new("w"),
            vec![event("x", 10), middle, event("z", 12)],
            500,
        )
        .unwrap();

        assert_eq!(a.idempotency_key(), b.idempotency_key());
        assert_eq!(
            a.idempotency_key(),
            idempotency_key(
                &BucketId::new("w"),
                &Utc.timestamp_opt(10, 0).unwrap(),
                &Utc.timestamp_opt(12, 0).unwrap(),
                3
            )
        );
    }

    #[test]
    fn test_key_changes_with_identity() {
        let base = || vec![event("1", 10), event("2", 11)];
        let key = Batch::build(BucketId::new("w"), base(), 10)
            .unwrap()
            .idempotency_key()
            .to_string();

        let other_bucket = Batch::build(BucketId::new("v"), base(), 10).unwrap();
        let shorter = Batch::build(BucketId::new("w"), base(), 1).unwrap();
        let later = Batch::build(BucketId::new("w"), vec![event("1", 10), event("2", 13)], 10)
            .unwrap();

        assert_ne!(other_bucket.idempotency_key(), key);
        assert_ne!(shorter.idempotency_key(), key);
        assert_ne!(later.idempotency_key(), key);
        assert_eq!(key.len(), 64);
    }

    #[test]
    fn test_request_body_layout() {
        let batch = Batch::build(BucketId::new("w"), vec![event("1", 10), event("2", 12)], 10)
            .unwrap();
        let body = serde_json::to_value(batch.to_request()).unwrap();

        assert_eq!(body["bucket"], "w");
        assert_eq!(body["count"], 2);
        assert_eq!(body["first_ts"], "1970-01-01T00:00:10Z");
        assert_eq!(body["last_ts"], "1970-01-01T00:00:12Z");
        assert_eq!(body["source"], "activitywatch");
        assert_eq!(body["schema"], 1);
        assert_eq!(body["events"][1]["id"], "2");
        assert_eq!(body["events"][1]["data"]["title"], "window 2");
    }

    #[test]
    fn test_after_checkpoint_drops_boundary_event() {
        let checkpoint = Checkpoint::new(Utc.timestamp_opt(12, 0).unwrap(), Some("c".into()));
        let events = vec![event("b", 11), event("c", 12), event("d", 12), event("e", 13)];

        let kept: Vec<_> = after_checkpoint(events, Some(&checkpoint))
            .into_iter()
            .map(|e| e.id.unwrap())
            .collect();
        assert_eq!(kept, vec!["d", "e"]);
    }

    #[test]
    fn test_after_checkpoint_drops_ties_before_boundary() {
        let checkpoint = Checkpoint::new(Utc.timestamp_opt(10, 0).unwrap(), Some("b".into()));
        let events = vec![event("x", 10), event("b", 10), event("y", 10), event("z", 11)];

        let kept: Vec<_> = after_checkpoint(events, Some(&checkpoint))
            .into_iter()
            .map(|e| e.id.unwrap())
            .collect();
        assert_eq!(kept, vec!["y", "z"]);
    }

    #[test]
    fn test_after_checkpoint_keeps_ties_when_boundary_missing() {
        let checkpoint = Checkpoint::new(Utc.timestamp_opt(10, 0).unwrap(), Some("gone".into()));
        let events = vec![event("x", 9), event("a", 10), event("b", 10), event("c", 11)];

        let kept: Vec<_> = after_checkpoint(events, Some(&checkpoint))
            .into_iter()
            .map(|e| e.id.unwrap())
            .collect();
        assert_eq!(kept, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_after_checkpoint_without_id_is_inclusive() {
        let checkpoint = Checkpoint::new(Utc.timestamp_opt(12, 0).unwrap(), None);
        let events = vec![event("c", 12), event("d", 13)];
        assert_eq!(after_checkpoint(events.clone(), Some(&checkpoint)).len(), 2);
        assert_eq!(after_checkpoint(events, None).len(), 2);
    }
}
