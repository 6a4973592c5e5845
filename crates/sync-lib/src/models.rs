//! Core data models for the sync agent

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;

/// Identifier of one logical event stream on the local service
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BucketId(String);

impl BucketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BucketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for BucketId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A single timestamped activity event
///
/// Only `id` and `timestamp` are interpreted; everything else is carried
/// through to the remote untouched. Events without `timestamp` are placed
/// at their `start`, which stays in the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawEvent")]
pub struct Event {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

/// Event as received, before its position is resolved
#[derive(Deserialize)]
struct RawEvent {
    #[serde(default, deserialize_with = "deserialize_event_id")]
    id: Option<String>,
    #[serde(flatten)]
    payload: Map<String, Value>,
}

impl TryFrom<RawEvent> for Event {
    type Error = String;

    fn try_from(raw: RawEvent) -> Result<Self, Self::Error> {
        let RawEvent { id, mut payload } = raw;
        let position = match payload.remove("timestamp") {
            Some(Value::Null) | None => payload.get("start").cloned(),
            Some(ts) => Some(ts),
        };

        let text = match position {
            Some(Value::String(text)) => text,
            Some(other) => return Err(format!("invalid timestamp {}", other)),
            None => return Err("missing field `timestamp` or `start`".to_string()),
        };
        let timestamp =
            parse_timestamp(&text).ok_or_else(|| format!("invalid timestamp {:?}", text))?;

        Ok(Self {
            id,
            timestamp,
            payload,
        })
    }
}

impl Event {
    pub fn new(id: Option<String>, timestamp: DateTime<Utc>, payload: Map<String, Value>) -> Self {
        Self {
            id,
            timestamp,
            payload,
        }
    }

    /// Position of this event, suitable for storing as a checkpoint
    pub fn position(&self) -> Checkpoint {
        Checkpoint {
            last_timestamp: self.timestamp,
            last_id: self.id.clone(),
        }
    }
}

/// The local service hands out integer ids; other builds use strings.
fn deserialize_event_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn serialize_timestamp<S>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format_timestamp(ts))
}

/// Durable per-bucket cursor: the last event forwarded successfully
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub last_timestamp: DateTime<Utc>,
    pub last_id: Option<String>,
}

impl Checkpoint {
    pub fn new(last_timestamp: DateTime<Utc>, last_id: Option<String>) -> Self {
        Self {
            last_timestamp,
            last_id,
        }
    }

    /// Whether `event` is the exact event this checkpoint points at.
    ///
    /// Without a stored id there is nothing to compare, so no event matches.
    pub fn is_boundary(&self, event: &Event) -> bool {
        match (&self.last_id, &event.id) {
            (Some(last), Some(id)) => event.timestamp == self.last_timestamp && last == id,
            _ => false,
        }
    }
}

/// Checkpoint row as listed by operator tooling
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointRecord {
    pub bucket: BucketId,
    pub checkpoint: Checkpoint,
    pub updated_at: DateTime<Utc>,
}

/// Canonical text form of a timestamp: RFC 3339, UTC, `Z` suffix.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parse an RFC 3339 timestamp with any offset into UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
