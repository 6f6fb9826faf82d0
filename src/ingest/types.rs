// src/ingest/types.rs
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FeedError, FeedResult};

/// Untyped event as delivered by a fetcher (RSS, Reddit, direct API call).
///
/// Expected keys: `source`, `title`; optional `id`, `url`, `body`,
/// `published_at`, `score`. Anything else is carried along in `raw_payload`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(pub Map<String, Value>);

impl RawEvent {
    /// Read a scalar field as text. Numbers and booleans are stringified;
    /// `null`, arrays and objects count as absent.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.0.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    /// Serialized copy of the whole event, retained for audit/replay.
    pub fn to_payload(&self) -> String {
        // A map of JSON values always serializes.
        serde_json::to_string(&self.0).unwrap_or_default()
    }
}

impl From<Value> for RawEvent {
    fn from(v: Value) -> Self {
        match v {
            Value::Object(m) => RawEvent(m),
            _ => RawEvent::default(),
        }
    }
}

/// Normalized, deduplicated representation of an ingested event.
/// Immutable once created; `id` is the fingerprint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalItem {
    pub id: String,
    pub fingerprint: String,
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub body: String,
    pub published_at: String,
    pub ingested_at: String,
    pub raw_payload: String,
    /// Absolute expiry, unix seconds.
    pub ttl_epoch: i64,
}

impl CanonicalItem {
    /// `fingerprint`, `source`, `title` and `url` must all be non-empty.
    pub fn validate(&self) -> FeedResult<()> {
        let required = [
            ("fingerprint", &self.fingerprint),
            ("source", &self.source),
            ("title", &self.title),
            ("url", &self.url),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(FeedError::InvalidItem {
                    reason: format!("empty `{name}`"),
                });
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}
