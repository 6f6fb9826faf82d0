// src/filter/mod.rs
//! Filter stage: score admitted items and persist the ones above threshold.

pub mod ranked;

use metrics::{counter, histogram};
use serde::Serialize;
use tracing::{debug, info};

use crate::error::FeedResult;
use crate::ingest::short_title;
use crate::ingest::types::CanonicalItem;
use crate::relevance::DynScorer;
use crate::store::DynStore;

use ranked::{quantize_score, should_persist, RankedBuilder, RankedItem};

/// Counts for one filter pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterReport {
    pub evaluated: usize,
    pub persisted: usize,
    pub below_threshold: usize,
}

/// Outcome for a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterDecision {
    Persisted(RankedItem),
    BelowThreshold(f64),
}

#[derive(Clone)]
pub struct FilterStage {
    store: DynStore,
    scorer: DynScorer,
    builder: RankedBuilder,
    threshold: f64,
}

impl FilterStage {
    pub fn new(store: DynStore, scorer: DynScorer, builder: RankedBuilder, threshold: f64) -> Self {
        Self {
            store,
            scorer,
            builder,
            threshold,
        }
    }

    /// Score one item; persist it as ranked when `score > threshold`.
    ///
    /// Upsert keyed by id, so re-filtering the same item never duplicates it.
    pub async fn evaluate(&self, item: &CanonicalItem) -> FeedResult<FilterDecision> {
        let rel = self.scorer.score(item).await;
        // Gate on the value that gets stored.
        let score = quantize_score(rel.score);
        histogram!("newsfeed_relevance_score").record(score);
        debug!(target: "filter", score, threshold = self.threshold, scorer = self.scorer.name(), "scored item");

        if !should_persist(score, self.threshold) {
            counter!("newsfeed_filter_below_threshold_total").increment(1);
            return Ok(FilterDecision::BelowThreshold(score));
        }

        let ranked = self.builder.build(item, score);
        self.store.upsert_ranked(&ranked).await?;
        counter!("newsfeed_filter_persisted_total").increment(1);
        info!(
            target: "filter",
            title = %short_title(&item.title),
            score = ranked.relevance_score,
            "persisted ranked item"
        );
        Ok(FilterDecision::Persisted(ranked))
    }

    /// Evaluate each item; a store failure aborts the pass.
    pub async fn run(&self, items: &[CanonicalItem]) -> FeedResult<FilterReport> {
        crate::ingest::ensure_metrics_described();
        let mut report = FilterReport::default();
        for item in items {
            report.evaluated += 1;
            match self.evaluate(item).await? {
                FilterDecision::Persisted(_) => report.persisted += 1,
                FilterDecision::BelowThreshold(_) => report.below_threshold += 1,
            }
        }
        info!(
            target: "filter",
            evaluated = report.evaluated,
            persisted = report.persisted,
            below_threshold = report.below_threshold,
            scorer = self.scorer.name(),
            "filter pass completed"
        );
        Ok(report)
    }
}
