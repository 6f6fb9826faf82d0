// src/store/mod.rs
//! Store interface consumed by the pipeline: a keyed table of canonical items
//! and a single logical partition of ranked items ordered by `rank_sort`.
//!
//! Every coordination point is a store-level atomic operation
//! (conditional insert, upsert by key); callers hold no in-process locks.

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::error::FeedResult;
use crate::filter::ranked::RankedItem;
use crate::ingest::types::CanonicalItem;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// The single partition holding all ranked items.
pub const RANKED_PARTITION: &str = "news";

/// Result of an insert-only-if-absent write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// Another writer got there first (or the key already existed).
    AlreadyExists,
}

/// Rows removed by a TTL sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeStats {
    pub canonical: usize,
    pub ranked: usize,
}

#[async_trait::async_trait]
pub trait NewsStore: Send + Sync {
    /// Atomically insert `item` keyed by `id` unless the key is present.
    async fn insert_canonical_if_absent(&self, item: &CanonicalItem) -> FeedResult<InsertOutcome>;

    async fn get_canonical(&self, id: &str) -> FeedResult<Option<CanonicalItem>>;

    /// Insert or overwrite the ranked record keyed by `id`.
    async fn upsert_ranked(&self, item: &RankedItem) -> FeedResult<()>;

    async fn get_ranked(&self, id: &str) -> FeedResult<Option<RankedItem>>;

    /// Ranked items in descending `rank_sort` order (ties: `id` descending),
    /// at most `limit` of them.
    async fn query_ranked_desc(&self, limit: usize) -> FeedResult<Vec<RankedItem>>;

    /// Delete rows whose `ttl_epoch` is at or before `now_epoch`.
    async fn purge_expired(&self, now_epoch: i64) -> FeedResult<PurgeStats>;

    fn backend_name(&self) -> &'static str;
}

/// Shared handle passed explicitly into each component.
pub type DynStore = Arc<dyn NewsStore>;
