// src/retrieve.rs
//! Ranked retrieval: newest-best-first feed with a bounded page size.

use metrics::counter;
use serde::Serialize;
use tracing::info;

use crate::error::FeedResult;
use crate::filter::ranked::RankedItem;
use crate::store::NewsStore;

pub const DEFAULT_LIMIT: usize = 50;
pub const MAX_LIMIT: usize = 100;

/// Resolve the requested page size into `1..=max`.
pub fn clamp_limit(requested: Option<i64>, default: usize, max: usize) -> usize {
    let max = max.max(1);
    match requested {
        None => default.clamp(1, max),
        Some(n) if n < 1 => 1,
        Some(n) => usize::try_from(n).unwrap_or(max).min(max),
    }
}

/// One entry of the feed. The user-facing fields are shared by both views;
/// the metadata view only adds the two optional fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedEntry {
    pub id: String,
    pub source: String,
    pub title: String,
    pub body: String,
    pub published_at: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank_sort: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f64>,
}

impl FeedEntry {
    pub fn project(item: RankedItem, include_metadata: bool) -> Self {
        let (rank_sort, relevance_score) = if include_metadata {
            (Some(item.rank_sort), Some(item.relevance_score))
        } else {
            (None, None)
        };
        Self {
            id: item.id,
            source: item.source,
            title: item.title,
            body: item.body,
            published_at: item.published_at,
            url: item.url,
            rank_sort,
            relevance_score,
        }
    }
}

/// Fetch up to `limit` ranked items in descending `rank_sort` order.
///
/// Ordering and the limit are pushed down to the store's descending index
/// traversal; nothing is sorted here. Store failures surface as `Err`, never
/// as an empty feed.
pub async fn retrieve(
    store: &dyn NewsStore,
    limit: usize,
    include_metadata: bool,
) -> FeedResult<Vec<FeedEntry>> {
    let limit = limit.clamp(1, MAX_LIMIT);
    counter!("newsfeed_retrieve_requests_total").increment(1);
    info!(target: "retrieve", limit, include_metadata, "retrieving ranked items");

    let items = store.query_ranked_desc(limit).await?;
    let out: Vec<FeedEntry> = items
        .into_iter()
        .take(limit)
        .map(|it| FeedEntry::project(it, include_metadata))
        .collect();

    info!(target: "retrieve", count = out.len(), "retrieved ranked items");
    Ok(out)
}
