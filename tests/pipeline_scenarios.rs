// tests/pipeline_scenarios.rs
//
// End-to-end pipeline behaviour over the in-memory store:
// - relevant headline is ranked and retrievable, fashion item is not
// - identical event twice collapses into one canonical item
// - concurrent redelivery admits exactly once
// - malformed events are reported per index without stopping the batch
// - a failed ranked write is repaired by redelivering the batch

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use newsfeed_ranker::config::FeedConfig;
use newsfeed_ranker::ingest::normalize::canonical_timestamp;
use newsfeed_ranker::ingest::types::RawEvent;
use newsfeed_ranker::relevance::KeywordScorer;
use newsfeed_ranker::filter::ranked::RankedItem;
use newsfeed_ranker::ingest::types::CanonicalItem;
use newsfeed_ranker::store::{InsertOutcome, MemoryStore, NewsStore, PurgeStats};
use newsfeed_ranker::{FeedError, FeedResult, Pipeline};

fn pipeline() -> (Arc<MemoryStore>, Pipeline) {
    let store = Arc::new(MemoryStore::new());
    let p = Pipeline::new(
        store.clone(),
        Arc::new(KeywordScorer::default()),
        &FeedConfig::default(),
    );
    (store, p)
}

fn now() -> String {
    canonical_timestamp(Utc::now())
}

fn vpn_event(published_at: &str) -> RawEvent {
    RawEvent::from(json!({
        "source": "reddit",
        "title": "Critical vulnerability in enterprise VPN",
        "body": "zero-day exploit...",
        "url": "https://reddit.com/r/netsec/vpn",
        "published_at": published_at
    }))
}

fn vogue_event(published_at: &str) -> RawEvent {
    RawEvent::from(json!({
        "source": "vogue",
        "title": "Top summer makeup trends",
        "body": "lipstick styles",
        "url": "https://vogue.com/makeup",
        "published_at": published_at
    }))
}

#[tokio::test]
async fn relevant_item_is_ranked_and_fashion_is_not() {
    let (_store, p) = pipeline();
    let ts = now();

    let report = p.ingest(&[vpn_event(&ts), vogue_event(&ts)]).await.unwrap();
    assert_eq!(report.ingest.processed, 2);
    assert_eq!(report.filter.evaluated, 2);
    assert_eq!(report.filter.persisted, 1);
    assert_eq!(report.filter.below_threshold, 1);

    let feed = p.retrieve(None, true).await.unwrap();
    assert_eq!(feed.len(), 1, "only the VPN item should be in the feed");
    assert_eq!(feed[0].title, "Critical vulnerability in enterprise VPN");
    let score = feed[0].relevance_score.expect("metadata view carries score");
    assert!(score > 0.4, "vpn scored {score}");
    assert!(feed[0]
        .rank_sort
        .as_deref()
        .is_some_and(|k| k.ends_with(&format!("#{ts}"))));
}

#[tokio::test]
async fn identical_event_twice_in_one_batch() {
    let (store, p) = pipeline();
    let ts = now();
    let report = p.ingest(&[vpn_event(&ts), vpn_event(&ts)]).await.unwrap();
    assert_eq!(report.ingest.processed, 1);
    assert_eq!(report.ingest.skipped, 1);
    assert_eq!(report.ingest.duplicates, 1);
    assert_eq!(store.canonical_len(), 1);
    assert_eq!(store.ranked_len(), 1);
}

#[tokio::test]
async fn identical_event_across_submissions() {
    let (store, p) = pipeline();
    let ts = now();
    let first = p.ingest(&[vpn_event(&ts)]).await.unwrap();
    let second = p.ingest(&[vpn_event(&ts)]).await.unwrap();
    assert_eq!((first.ingest.processed, first.ingest.skipped), (1, 0));
    assert_eq!((second.ingest.processed, second.ingest.skipped), (0, 1));
    // Already ranked, so not re-scored.
    assert_eq!(second.filter.evaluated, 0);
    assert_eq!(store.canonical_len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redelivery_admits_once() {
    let (store, p) = pipeline();
    let p = Arc::new(p);
    let ts = now();

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let p = p.clone();
        let ev = vpn_event(&ts);
        tasks.push(tokio::spawn(async move { p.ingest(&[ev]).await.unwrap() }));
    }

    let mut processed = 0;
    let mut skipped = 0;
    for t in tasks {
        let r = t.await.unwrap();
        processed += r.ingest.processed;
        skipped += r.ingest.skipped;
    }
    assert_eq!(processed, 1);
    assert_eq!(skipped, 15);
    assert_eq!(store.canonical_len(), 1);
    assert_eq!(store.ranked_len(), 1);
}

#[tokio::test]
async fn malformed_events_are_reported_by_index() {
    let (_store, p) = pipeline();
    let ts = now();
    let events = vec![
        RawEvent::from(json!({ "title": "no source here" })),
        vpn_event(&ts),
        RawEvent::from(json!({ "source": "rss" })),
    ];
    let report = p.ingest(&events).await.unwrap();
    assert_eq!(report.ingest.total, 3);
    assert_eq!(report.ingest.processed, 1);
    assert_eq!(report.ingest.skipped, 2);
    assert_eq!(report.ingest.errors.len(), 2);
    assert!(report.ingest.errors[0].starts_with("Event 0:"));
    assert!(report.ingest.errors[1].starts_with("Event 2:"));
}

#[tokio::test]
async fn store_outage_is_an_error_not_an_empty_feed() {
    let (store, p) = pipeline();
    p.ingest(&[vpn_event(&now())]).await.unwrap();
    store.set_offline(true);
    assert!(p.retrieve(None, false).await.is_err());
    assert!(p.ingest(&[vogue_event(&now())]).await.is_err());
    store.set_offline(false);
    assert_eq!(p.retrieve(None, false).await.unwrap().len(), 1);
}

#[tokio::test]
async fn newer_item_with_equal_score_ranks_first() {
    let (_store, p) = pipeline();
    let older = canonical_timestamp(Utc::now() - chrono::Duration::minutes(5));
    let newer = canonical_timestamp(Utc::now());
    // Same text, different timestamps: distinct fingerprints, same keyword points.
    let mut a = vpn_event(&older);
    a.0.insert("url".into(), json!("https://reddit.com/a"));
    let mut b = vpn_event(&newer);
    b.0.insert("url".into(), json!("https://reddit.com/b"));
    p.ingest(&[a, b]).await.unwrap();

    let feed = p.retrieve(Some(10), false).await.unwrap();
    assert_eq!(feed.len(), 2);
    assert_eq!(feed[0].published_at, newer);
    assert_eq!(feed[1].published_at, older);
}

/// Memory store whose next ranked write fails once when armed.
#[derive(Default)]
struct FlakyRankedStore {
    inner: MemoryStore,
    fail_next_ranked_write: AtomicBool,
}

#[async_trait::async_trait]
impl NewsStore for FlakyRankedStore {
    async fn insert_canonical_if_absent(&self, item: &CanonicalItem) -> FeedResult<InsertOutcome> {
        self.inner.insert_canonical_if_absent(item).await
    }

    async fn get_canonical(&self, id: &str) -> FeedResult<Option<CanonicalItem>> {
        self.inner.get_canonical(id).await
    }

    async fn upsert_ranked(&self, item: &RankedItem) -> FeedResult<()> {
        if self.fail_next_ranked_write.swap(false, Ordering::SeqCst) {
            return Err(FeedError::StoreUnavailable("ranked write timed out".into()));
        }
        self.inner.upsert_ranked(item).await
    }

    async fn get_ranked(&self, id: &str) -> FeedResult<Option<RankedItem>> {
        self.inner.get_ranked(id).await
    }

    async fn query_ranked_desc(&self, limit: usize) -> FeedResult<Vec<RankedItem>> {
        self.inner.query_ranked_desc(limit).await
    }

    async fn purge_expired(&self, now_epoch: i64) -> FeedResult<PurgeStats> {
        self.inner.purge_expired(now_epoch).await
    }

    fn backend_name(&self) -> &'static str {
        "flaky-memory"
    }
}

#[tokio::test]
async fn redelivery_after_failed_ranked_write_reaches_the_feed() {
    let store = Arc::new(FlakyRankedStore::default());
    store.fail_next_ranked_write.store(true, Ordering::SeqCst);
    let p = Pipeline::new(
        store.clone(),
        Arc::new(KeywordScorer::default()),
        &FeedConfig::default(),
    );
    let ts = now();

    let err = p.ingest(&[vpn_event(&ts)]).await.unwrap_err();
    assert!(err.is_retryable());
    // Admission went through before the ranked write failed.
    assert_eq!(store.inner.canonical_len(), 1);
    assert!(p.retrieve(None, false).await.unwrap().is_empty());

    let again = p.ingest(&[vpn_event(&ts)]).await.unwrap();
    assert_eq!(again.ingest.processed, 0);
    assert_eq!(again.ingest.duplicates, 1);
    assert_eq!(again.filter.evaluated, 1);
    assert_eq!(again.filter.persisted, 1);

    let feed = p.retrieve(None, false).await.unwrap();
    assert_eq!(feed.len(), 1);
    assert_eq!(feed[0].title, "Critical vulnerability in enterprise VPN");

    // Once ranked, later redeliveries are not re-scored.
    let third = p.ingest(&[vpn_event(&ts)]).await.unwrap();
    assert_eq!(third.filter.evaluated, 0);
}
