// src/pipeline.rs
//! Wires ingest → filter → retrieve over one injected store.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use tracing::info;

use crate::config::{FeedConfig, RetrieveConfig, StoreBackend, StoreConfig};
use crate::error::{FeedError, FeedResult};
use crate::filter::ranked::RankedBuilder;
use crate::filter::{FilterDecision, FilterReport, FilterStage};
use crate::ingest::normalize::Normalizer;
use crate::ingest::types::RawEvent;
use crate::ingest::{IngestReport, Ingestor};
use crate::relevance::{build_scorer, DynScorer};
use crate::retrieve::{self, clamp_limit, FeedEntry};
use crate::store::{DynStore, MemoryStore, PurgeStats, SqliteStore};

/// Open the configured store backend.
pub async fn open_store(cfg: &StoreConfig) -> FeedResult<DynStore> {
    match cfg.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::Sqlite => {
            if cfg.sqlite_path.as_os_str().is_empty() {
                return Err(FeedError::Config("sqlite backend needs a sqlite_path".into()));
            }
            if let Some(dir) = cfg.sqlite_path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir)
                    .map_err(|e| FeedError::StoreUnavailable(format!("creating {}: {e}", dir.display())))?;
            }
            Ok(Arc::new(SqliteStore::open(&cfg.sqlite_path).await?))
        }
    }
}

/// Combined result of an ingest call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PipelineReport {
    pub ingest: IngestReport,
    pub filter: FilterReport,
}

#[derive(Clone)]
pub struct Pipeline {
    store: DynStore,
    ingestor: Ingestor,
    filter: FilterStage,
    retrieve_cfg: RetrieveConfig,
}

impl Pipeline {
    pub fn new(store: DynStore, scorer: DynScorer, cfg: &FeedConfig) -> Self {
        let ingestor = Ingestor::new(
            store.clone(),
            Normalizer::with_ttl_days(cfg.retention.raw_ttl_days),
        );
        let filter = FilterStage::new(
            store.clone(),
            scorer,
            RankedBuilder::with_ttl_days(cfg.retention.ranked_ttl_days),
            cfg.filter.threshold,
        );
        Self {
            store,
            ingestor,
            filter,
            retrieve_cfg: cfg.retrieve.clone(),
        }
    }

    /// Open the configured store and scorer.
    pub async fn from_config(cfg: &FeedConfig) -> FeedResult<Self> {
        let store = open_store(&cfg.store).await?;
        let scorer = build_scorer(&cfg.scoring);
        info!(
            backend = store.backend_name(),
            scorer = scorer.name(),
            threshold = cfg.filter.threshold,
            "pipeline ready"
        );
        Ok(Self::new(store, scorer, cfg))
    }

    /// Admit a batch, then score the items admitted by this call plus any
    /// duplicates that never got a ranked record.
    ///
    /// A redelivery after a failed filter step re-scores the affected items;
    /// the ranked upsert is keyed by id, so this never duplicates a row.
    pub async fn ingest(&self, events: &[RawEvent]) -> FeedResult<PipelineReport> {
        let out = self.ingestor.ingest_batch(events).await?;
        let mut pending = out.admitted;
        for item in out.duplicates {
            if pending.iter().any(|p| p.id == item.id) {
                continue;
            }
            if self.store.get_ranked(&item.id).await?.is_none() {
                pending.push(item);
            }
        }
        let filter = self.filter.run(&pending).await?;
        Ok(PipelineReport {
            ingest: out.report,
            filter,
        })
    }

    /// Re-score a stored canonical item. `Ok(None)` when the id is unknown.
    pub async fn refilter(&self, id: &str) -> FeedResult<Option<FilterDecision>> {
        match self.store.get_canonical(id).await? {
            Some(item) => Ok(Some(self.filter.evaluate(&item).await?)),
            None => Ok(None),
        }
    }

    /// Resolve the requested page size with the configured bounds.
    pub fn resolve_limit(&self, requested: Option<i64>) -> usize {
        clamp_limit(
            requested,
            self.retrieve_cfg.default_limit,
            self.retrieve_cfg.max_limit,
        )
    }

    pub async fn retrieve(&self, requested: Option<i64>, include_metadata: bool) -> FeedResult<Vec<FeedEntry>> {
        let limit = self.resolve_limit(requested);
        retrieve::retrieve(self.store.as_ref(), limit, include_metadata).await
    }

    /// Drop rows past their TTL.
    pub async fn purge_expired(&self) -> FeedResult<PurgeStats> {
        let stats = self.store.purge_expired(Utc::now().timestamp()).await?;
        info!(
            target: "store",
            canonical = stats.canonical,
            ranked = stats.ranked,
            "ttl sweep completed"
        );
        Ok(stats)
    }
}
