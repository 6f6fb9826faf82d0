// src/filter/ranked.rs
//! Filtered-item builder: canonical item + score → ranked, persistable record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::normalize::{canonical_timestamp, parse_published_at};
use crate::ingest::types::CanonicalItem;

pub const DEFAULT_THRESHOLD: f64 = 0.4;
/// Ranked items outlive raw ones; they are the user-facing product.
pub const DEFAULT_RANKED_TTL_DAYS: i64 = 30;

/// Decimal places kept for `relevance_score` and its `rank_sort` prefix.
const SCORE_DECIMALS: i32 = 6;

/// Sort-key timestamp for a `published_at` that cannot be parsed; ranks as oldest.
pub const UNPARSED_SORT_TIMESTAMP: &str = "1970-01-01T00:00:00.000000Z";

/// A canonical item annotated with a relevance score and a sort key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedItem {
    pub id: String,
    pub source: String,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub published_at: String,
    #[serde(default)]
    pub url: String,
    pub relevance_score: f64,
    pub rank_sort: String,
    pub filtered_at: String,
    pub ttl_epoch: i64,
}

/// Clamp to [0,1] and round to the precision encoded in `rank_sort`.
pub fn quantize_score(score: f64) -> f64 {
    let s = if score.is_finite() {
        score.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let scale = 10f64.powi(SCORE_DECIMALS);
    (s * scale).round() / scale
}

/// `<score zero-padded to 8 chars, 6 decimals>#<canonical published_at>`.
///
/// Depends only on the score and timestamp, so re-filtering an item produces
/// the same key. Timestamps that cannot be parsed are keyed as
/// [`UNPARSED_SORT_TIMESTAMP`].
pub fn rank_sort(score: f64, published_at: &str) -> String {
    let ts = parse_published_at(published_at)
        .map(canonical_timestamp)
        .unwrap_or_else(|| UNPARSED_SORT_TIMESTAMP.to_string());
    format!("{:08.6}#{}", quantize_score(score), ts)
}

/// Strictly greater than the threshold. Callers pass the quantized score.
pub fn should_persist(score: f64, threshold: f64) -> bool {
    score > threshold
}

/// Builds ranked records; holds only the retention setting.
#[derive(Debug, Clone, Copy)]
pub struct RankedBuilder {
    ttl: Duration,
}

impl Default for RankedBuilder {
    fn default() -> Self {
        Self::with_ttl_days(DEFAULT_RANKED_TTL_DAYS)
    }
}

impl RankedBuilder {
    pub fn with_ttl_days(days: i64) -> Self {
        Self {
            ttl: Duration::days(days.max(1)),
        }
    }

    pub fn build(&self, item: &CanonicalItem, score: f64) -> RankedItem {
        self.build_at(item, score, Utc::now())
    }

    pub fn build_at(&self, item: &CanonicalItem, score: f64, now: DateTime<Utc>) -> RankedItem {
        let relevance_score = quantize_score(score);
        RankedItem {
            id: item.id.clone(),
            source: item.source.clone(),
            title: item.title.clone(),
            body: item.body.clone(),
            published_at: item.published_at.clone(),
            url: item.url.clone(),
            relevance_score,
            rank_sort: rank_sort(relevance_score, &item.published_at),
            filtered_at: canonical_timestamp(now),
            ttl_epoch: (now + self.ttl).timestamp(),
        }
    }
}

/// Build with default retention and the current clock.
pub fn build(item: &CanonicalItem, score: f64) -> RankedItem {
    RankedBuilder::default().build(item, score)
}
