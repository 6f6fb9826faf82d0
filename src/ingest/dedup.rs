// src/ingest/dedup.rs
//! Deduplication gate: the sole authority on whether a fingerprint is new.

use crate::error::{FeedError, FeedResult};
use crate::ingest::types::CanonicalItem;
use crate::store::{DynStore, InsertOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Duplicate,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Rejected(RejectReason),
}

impl Admission {
    /// `Ok(())` when admitted, otherwise the error describing the rejection:
    /// [`FeedError::Duplicate`] or the item's validation failure.
    pub fn into_result(self, item: &CanonicalItem) -> FeedResult<()> {
        match self {
            Admission::Admitted => Ok(()),
            Admission::Rejected(RejectReason::Duplicate) => Err(FeedError::Duplicate {
                fingerprint: item.fingerprint.clone(),
            }),
            Admission::Rejected(RejectReason::Invalid) => {
                item.validate()?;
                Err(FeedError::InvalidItem {
                    reason: "invalid item".into(),
                })
            }
        }
    }
}

#[derive(Clone)]
pub struct DedupGate {
    store: DynStore,
}

impl DedupGate {
    pub fn new(store: DynStore) -> Self {
        Self { store }
    }

    /// Informational lookup. Admission never relies on it.
    pub async fn exists(&self, fingerprint: &str) -> FeedResult<bool> {
        Ok(self.store.get_canonical(fingerprint).await?.is_some())
    }

    /// Persist `item` unless its fingerprint is already stored.
    ///
    /// A single insert-if-absent write: of several concurrent admissions of the
    /// same fingerprint exactly one sees `Admitted`, the rest `Rejected(Duplicate)`.
    /// Store failures propagate as `StoreUnavailable`.
    pub async fn admit(&self, item: &CanonicalItem) -> FeedResult<Admission> {
        if !item.is_valid() {
            return Ok(Admission::Rejected(RejectReason::Invalid));
        }
        match self.store.insert_canonical_if_absent(item).await? {
            InsertOutcome::Inserted => Ok(Admission::Admitted),
            InsertOutcome::AlreadyExists => Ok(Admission::Rejected(RejectReason::Duplicate)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::normalize::normalize;
    use crate::ingest::types::RawEvent;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    fn item(url: &str) -> CanonicalItem {
        normalize(&RawEvent::from(json!({
            "source": "reddit",
            "title": "Ransomware hits vendor",
            "url": url,
            "published_at": "2025-08-25T08:30:00Z"
        })))
        .unwrap()
    }

    #[tokio::test]
    async fn second_admission_is_duplicate() {
        let store = Arc::new(MemoryStore::new());
        let gate = DedupGate::new(store.clone());
        let it = item("https://example.com/r");
        assert!(!gate.exists(&it.fingerprint).await.unwrap());
        assert_eq!(gate.admit(&it).await.unwrap(), Admission::Admitted);
        assert!(gate.exists(&it.fingerprint).await.unwrap());
        assert_eq!(
            gate.admit(&it).await.unwrap(),
            Admission::Rejected(RejectReason::Duplicate)
        );
        assert_eq!(store.canonical_len(), 1);
    }

    #[tokio::test]
    async fn invalid_item_is_never_persisted() {
        let store = Arc::new(MemoryStore::new());
        let gate = DedupGate::new(store.clone());
        assert_eq!(
            gate.admit(&item("")).await.unwrap(),
            Admission::Rejected(RejectReason::Invalid)
        );
        assert_eq!(store.canonical_len(), 0);
    }

    #[tokio::test]
    async fn rejections_convert_to_errors() {
        let store = Arc::new(MemoryStore::new());
        let gate = DedupGate::new(store);
        let it = item("https://example.com/r");
        assert!(gate.admit(&it).await.unwrap().into_result(&it).is_ok());

        let err = gate.admit(&it).await.unwrap().into_result(&it).unwrap_err();
        assert!(matches!(err, FeedError::Duplicate { ref fingerprint } if *fingerprint == it.fingerprint));
        assert!(!err.is_retryable());

        let bad = item("");
        let err = gate.admit(&bad).await.unwrap().into_result(&bad).unwrap_err();
        assert_eq!(err.to_string(), "invalid item: empty `url`");
    }

    #[tokio::test]
    async fn store_outage_propagates() {
        let store = Arc::new(MemoryStore::new());
        store.set_offline(true);
        let gate = DedupGate::new(store);
        let err = gate.admit(&item("https://example.com/r")).await.unwrap_err();
        assert!(err.is_retryable());
    }
}
