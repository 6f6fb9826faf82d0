// src/ingest/mod.rs
pub mod dedup;
pub mod normalize;
pub mod types;

use metrics::{counter, describe_counter, describe_histogram};
use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{FeedError, FeedResult};
use crate::ingest::dedup::DedupGate;
use crate::ingest::normalize::Normalizer;
use crate::ingest::types::{CanonicalItem, RawEvent};
use crate::relevance::anon_hash;
use crate::store::DynStore;

/// One-time metrics registration (so series show up on /metrics).
pub(crate) fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "newsfeed_ingest_processed_total",
            "Raw events admitted as new canonical items."
        );
        describe_counter!(
            "newsfeed_ingest_skipped_total",
            "Raw events skipped, labelled by reason (duplicate, missing_field, invalid)."
        );
        describe_counter!(
            "newsfeed_filter_persisted_total",
            "Canonical items persisted as ranked items."
        );
        describe_counter!(
            "newsfeed_filter_below_threshold_total",
            "Canonical items scored at or below the threshold."
        );
        describe_counter!(
            "newsfeed_scorer_fallback_total",
            "Model scoring failures answered by the keyword scorer."
        );
        describe_counter!(
            "newsfeed_retrieve_requests_total",
            "Ranked retrieval requests."
        );
        describe_histogram!("newsfeed_relevance_score", "Relevance scores in [0,1].");
    });
}

/// Title prefix for log lines.
pub(crate) fn short_title(title: &str) -> String {
    title.chars().take(50).collect()
}

/// Outcome counts for one batch of raw events.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub total: usize,
    pub processed: usize,
    /// duplicates + invalid
    pub skipped: usize,
    pub duplicates: usize,
    pub invalid: usize,
    /// `"Event <index>: <message>"`; duplicates are not errors.
    pub errors: Vec<String>,
}

/// Report plus the admitted and duplicate items, each in input order.
#[derive(Debug, Clone, Default)]
pub struct IngestOutcome {
    pub report: IngestReport,
    pub admitted: Vec<CanonicalItem>,
    /// Items whose fingerprint was already stored.
    pub duplicates: Vec<CanonicalItem>,
}

/// Normalizer + dedup gate over an injected store.
#[derive(Clone)]
pub struct Ingestor {
    normalizer: Normalizer,
    gate: DedupGate,
}

impl Ingestor {
    pub fn new(store: DynStore, normalizer: Normalizer) -> Self {
        Self {
            normalizer,
            gate: DedupGate::new(store),
        }
    }

    /// Normalize and admit each event independently.
    ///
    /// Malformed or duplicate events are skipped and counted; only a store
    /// outage aborts the batch (returned as `Err`, safe to redeliver since
    /// admission is idempotent).
    pub async fn ingest_batch(&self, events: &[RawEvent]) -> FeedResult<IngestOutcome> {
        ensure_metrics_described();
        info!(target: "ingest", count = events.len(), "processing raw events");

        let mut out = IngestOutcome::default();
        out.report.total = events.len();

        for (i, raw) in events.iter().enumerate() {
            let item = match self.normalizer.normalize(raw) {
                Ok(item) => item,
                Err(e) => {
                    warn!(target: "ingest", index = i, error = %e, "skipping malformed event");
                    counter!("newsfeed_ingest_skipped_total", "reason" => "missing_field").increment(1);
                    out.report.invalid += 1;
                    out.report.skipped += 1;
                    out.report.errors.push(format!("Event {i}: {e}"));
                    continue;
                }
            };

            let admission = match self.gate.admit(&item).await {
                Ok(admission) => admission,
                Err(e) if e.is_retryable() => {
                    warn!(target: "ingest", index = i, error = %e, "store unavailable, aborting batch");
                    return Err(e);
                }
                Err(e) => {
                    warn!(target: "ingest", index = i, error = %e, "event failed");
                    out.report.errors.push(format!("Event {i}: {e}"));
                    continue;
                }
            };

            match admission.into_result(&item) {
                Ok(()) => {
                    counter!("newsfeed_ingest_processed_total").increment(1);
                    out.report.processed += 1;
                    out.admitted.push(item);
                }
                Err(FeedError::Duplicate { fingerprint }) => {
                    info!(
                        target: "ingest",
                        id = %anon_hash(&fingerprint),
                        title = %short_title(&item.title),
                        "duplicate event skipped"
                    );
                    counter!("newsfeed_ingest_skipped_total", "reason" => "duplicate").increment(1);
                    out.report.duplicates += 1;
                    out.report.skipped += 1;
                    out.duplicates.push(item);
                }
                Err(e) => {
                    warn!(target: "ingest", index = i, reason = %e, "invalid event structure, skipping");
                    counter!("newsfeed_ingest_skipped_total", "reason" => "invalid").increment(1);
                    out.report.invalid += 1;
                    out.report.skipped += 1;
                    out.report.errors.push(format!("Event {i}: {e}"));
                }
            }
        }

        info!(
            target: "ingest",
            processed = out.report.processed,
            skipped = out.report.skipped,
            duplicates = out.report.duplicates,
            "ingest batch completed"
        );
        Ok(out)
    }
}

/// Parse a request body that is either one event object or an array of them.
pub fn parse_events(body: &serde_json::Value) -> FeedResult<Vec<RawEvent>> {
    match body {
        serde_json::Value::Array(items) => Ok(items.iter().cloned().map(RawEvent::from).collect()),
        serde_json::Value::Object(_) => Ok(vec![RawEvent::from(body.clone())]),
        _ => Err(FeedError::InvalidItem {
            reason: "expected an event object or an array of events".into(),
        }),
    }
}
