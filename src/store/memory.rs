// src/store/memory.rs
//! In-process store used by tests and single-node runs.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::{FeedError, FeedResult};
use crate::filter::ranked::RankedItem;
use crate::ingest::types::CanonicalItem;
use crate::store::{InsertOutcome, NewsStore, PurgeStats};

#[derive(Debug, Default)]
struct Inner {
    canonical: HashMap<String, CanonicalItem>,
    ranked: HashMap<String, RankedItem>,
    /// (rank_sort, id), traversed in reverse for retrieval.
    order: BTreeSet<(String, String)>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
    offline: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreUnavailable` (or recover).
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn canonical_len(&self) -> usize {
        self.inner.read().canonical.len()
    }

    pub fn ranked_len(&self) -> usize {
        self.inner.read().ranked.len()
    }

    fn check_online(&self) -> FeedResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(FeedError::StoreUnavailable("memory store offline".into()));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl NewsStore for MemoryStore {
    async fn insert_canonical_if_absent(&self, item: &CanonicalItem) -> FeedResult<InsertOutcome> {
        self.check_online()?;
        // Check and insert under one write guard.
        let mut g = self.inner.write();
        if g.canonical.contains_key(&item.id) {
            return Ok(InsertOutcome::AlreadyExists);
        }
        g.canonical.insert(item.id.clone(), item.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn get_canonical(&self, id: &str) -> FeedResult<Option<CanonicalItem>> {
        self.check_online()?;
        Ok(self.inner.read().canonical.get(id).cloned())
    }

    async fn upsert_ranked(&self, item: &RankedItem) -> FeedResult<()> {
        self.check_online()?;
        let mut g = self.inner.write();
        if let Some(prev) = g.ranked.insert(item.id.clone(), item.clone()) {
            g.order.remove(&(prev.rank_sort, prev.id));
        }
        g.order.insert((item.rank_sort.clone(), item.id.clone()));
        Ok(())
    }

    async fn get_ranked(&self, id: &str) -> FeedResult<Option<RankedItem>> {
        self.check_online()?;
        Ok(self.inner.read().ranked.get(id).cloned())
    }

    async fn query_ranked_desc(&self, limit: usize) -> FeedResult<Vec<RankedItem>> {
        self.check_online()?;
        let g = self.inner.read();
        Ok(g.order
            .iter()
            .rev()
            .take(limit)
            .filter_map(|(_, id)| g.ranked.get(id).cloned())
            .collect())
    }

    async fn purge_expired(&self, now_epoch: i64) -> FeedResult<PurgeStats> {
        self.check_online()?;
        let mut g = self.inner.write();
        let before = g.canonical.len();
        g.canonical.retain(|_, it| it.ttl_epoch > now_epoch);
        let canonical = before - g.canonical.len();

        let expired: Vec<RankedItem> = g
            .ranked
            .values()
            .filter(|it| it.ttl_epoch <= now_epoch)
            .cloned()
            .collect();
        for it in &expired {
            g.ranked.remove(&it.id);
            g.order.remove(&(it.rank_sort.clone(), it.id.clone()));
        }
        Ok(PurgeStats {
            canonical,
            ranked: expired.len(),
        })
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
