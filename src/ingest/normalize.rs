// src/ingest/normalize.rs
//! Raw event → canonical item, plus the dedup fingerprint.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::error::{FeedError, FeedResult};
use crate::ingest::types::{CanonicalItem, RawEvent};

/// Raw items are retained for 10 days after ingestion.
pub const DEFAULT_RAW_TTL_DAYS: i64 = 10;

const FIELD_SEP: u8 = 0x1f;

/// Deterministic identity hash of `(title, published_at-or-empty, source)`:
/// SHA-256 over `title 0x1F published_at 0x1F source`, truncated to 128 bits,
/// lowercase hex. Changing the scheme orphans every stored fingerprint.
pub fn fingerprint(title: &str, published_at: &str, source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(title.as_bytes());
    hasher.update([FIELD_SEP]);
    hasher.update(published_at.as_bytes());
    hasher.update([FIELD_SEP]);
    hasher.update(source.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(32);
    for b in digest.iter().take(16) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Parse the timestamp formats fetchers are known to emit.
/// Naive values are taken as UTC.
pub fn parse_published_at(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(ndt.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|ndt| ndt.and_utc())
}

/// Fixed-width UTC form (`2025-08-25T09:00:00.000000Z`); string order equals time order.
pub fn canonical_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Turns raw events into canonical items. No side effects.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    raw_ttl: Duration,
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::with_ttl_days(DEFAULT_RAW_TTL_DAYS)
    }
}

impl Normalizer {
    pub fn with_ttl_days(days: i64) -> Self {
        Self {
            raw_ttl: Duration::days(days.max(1)),
        }
    }

    pub fn normalize(&self, raw: &RawEvent) -> FeedResult<CanonicalItem> {
        self.normalize_at(raw, Utc::now())
    }

    /// Same as [`Normalizer::normalize`] with an explicit ingestion clock.
    pub fn normalize_at(&self, raw: &RawEvent, now: DateTime<Utc>) -> FeedResult<CanonicalItem> {
        let source = raw
            .text("source")
            .ok_or(FeedError::MissingField { field: "source" })?;
        let title = raw
            .text("title")
            .ok_or(FeedError::MissingField { field: "title" })?;

        // Fingerprint uses the value exactly as delivered so retries collapse
        // regardless of how the timestamp is written.
        let raw_published = raw.text("published_at");
        let fp = fingerprint(&title, raw_published.as_deref().unwrap_or(""), &source);

        let ingested_at = canonical_timestamp(now);
        let published_at = match raw_published.as_deref().filter(|p| !p.trim().is_empty()) {
            Some(p) => parse_published_at(p)
                .map(canonical_timestamp)
                .unwrap_or_else(|| p.to_string()),
            None => ingested_at.clone(),
        };

        Ok(CanonicalItem {
            id: fp.clone(),
            fingerprint: fp,
            source,
            title,
            url: raw.text("url").unwrap_or_default(),
            body: raw.text("body").unwrap_or_default(),
            published_at,
            ingested_at,
            raw_payload: raw.to_payload(),
            ttl_epoch: (now + self.raw_ttl).timestamp(),
        })
    }
}

/// Normalize with default retention and the current clock.
pub fn normalize(raw: &RawEvent) -> FeedResult<CanonicalItem> {
    Normalizer::default().normalize(raw)
}
