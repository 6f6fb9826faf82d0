// src/store/sqlite.rs
//! SQLite-backed store. Writes that need atomicity are single statements
//! (`ON CONFLICT DO NOTHING` / `DO UPDATE`), so separate worker processes
//! sharing one database file coordinate through SQLite alone.

use std::path::Path;

use rusqlite::{params, OptionalExtension, Row};
use tokio_rusqlite::Connection;
use tracing::info;

use crate::error::FeedResult;
use crate::filter::ranked::RankedItem;
use crate::ingest::types::CanonicalItem;
use crate::store::{InsertOutcome, NewsStore, PurgeStats, RANKED_PARTITION};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS raw_events (
    id TEXT PRIMARY KEY,
    fingerprint TEXT NOT NULL,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    url TEXT NOT NULL,
    body TEXT NOT NULL,
    published_at TEXT NOT NULL,
    ingested_at TEXT NOT NULL,
    raw_payload TEXT NOT NULL,
    ttl_epoch INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS filtered_events (
    id TEXT PRIMARY KEY,
    pk TEXT NOT NULL,
    rank_sort TEXT NOT NULL,
    source TEXT NOT NULL,
    title TEXT NOT NULL,
    body TEXT NOT NULL,
    published_at TEXT NOT NULL,
    url TEXT NOT NULL,
    relevance_score REAL NOT NULL,
    filtered_at TEXT NOT NULL,
    ttl_epoch INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_filtered_rank ON filtered_events (pk, rank_sort DESC, id DESC);
";

const CANONICAL_COLUMNS: &str =
    "id, fingerprint, source, title, url, body, published_at, ingested_at, raw_payload, ttl_epoch";
const RANKED_COLUMNS: &str =
    "id, source, title, body, published_at, url, relevance_score, rank_sort, filtered_at, ttl_epoch";

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Open (or create) the database file and ensure the schema exists.
    pub async fn open<P: AsRef<Path>>(path: P) -> FeedResult<Self> {
        let path = path.as_ref().to_path_buf();
        let conn = Connection::open(&path).await?;
        let store = Self::init(conn).await?;
        info!(target: "store", path = %path.display(), "sqlite store ready");
        Ok(store)
    }

    pub async fn open_in_memory() -> FeedResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn).await
    }

    async fn init(conn: Connection) -> FeedResult<Self> {
        conn.call(|conn| {
            // WAL lets readers proceed while a worker writes.
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                row.get::<_, String>(0)
            })?;
            conn.busy_timeout(std::time::Duration::from_secs(5))?;
            conn.execute_batch(SCHEMA)?;
            Ok(())
        })
        .await?;
        Ok(Self { conn })
    }
}

fn canonical_from_row(row: &Row<'_>) -> rusqlite::Result<CanonicalItem> {
    Ok(CanonicalItem {
        id: row.get(0)?,
        fingerprint: row.get(1)?,
        source: row.get(2)?,
        title: row.get(3)?,
        url: row.get(4)?,
        body: row.get(5)?,
        published_at: row.get(6)?,
        ingested_at: row.get(7)?,
        raw_payload: row.get(8)?,
        ttl_epoch: row.get(9)?,
    })
}

fn ranked_from_row(row: &Row<'_>) -> rusqlite::Result<RankedItem> {
    Ok(RankedItem {
        id: row.get(0)?,
        source: row.get(1)?,
        title: row.get(2)?,
        body: row.get(3)?,
        published_at: row.get(4)?,
        url: row.get(5)?,
        relevance_score: row.get(6)?,
        rank_sort: row.get(7)?,
        filtered_at: row.get(8)?,
        ttl_epoch: row.get(9)?,
    })
}

#[async_trait::async_trait]
impl NewsStore for SqliteStore {
    async fn insert_canonical_if_absent(&self, item: &CanonicalItem) -> FeedResult<InsertOutcome> {
        let it = item.clone();
        let changed = self
            .conn
            .call(move |conn| {
                let n = conn.execute(
                    &format!(
                        "INSERT INTO raw_events ({CANONICAL_COLUMNS})
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                         ON CONFLICT(id) DO NOTHING"
                    ),
                    params![
                        it.id,
                        it.fingerprint,
                        it.source,
                        it.title,
                        it.url,
                        it.body,
                        it.published_at,
                        it.ingested_at,
                        it.raw_payload,
                        it.ttl_epoch
                    ],
                )?;
                Ok(n)
            })
            .await?;
        Ok(if changed == 1 {
            InsertOutcome::Inserted
        } else {
            InsertOutcome::AlreadyExists
        })
    }

    async fn get_canonical(&self, id: &str) -> FeedResult<Option<CanonicalItem>> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let r = conn
                    .query_row(
                        &format!("SELECT {CANONICAL_COLUMNS} FROM raw_events WHERE id = ?1"),
                        params![id],
                        canonical_from_row,
                    )
                    .optional()?;
                Ok(r)
            })
            .await?;
        Ok(row)
    }

    async fn upsert_ranked(&self, item: &RankedItem) -> FeedResult<()> {
        let it = item.clone();
        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO filtered_events
                        (id, pk, rank_sort, source, title, body, published_at, url,
                         relevance_score, filtered_at, ttl_epoch)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
                     ON CONFLICT(id) DO UPDATE SET
                        pk = excluded.pk,
                        rank_sort = excluded.rank_sort,
                        source = excluded.source,
                        title = excluded.title,
                        body = excluded.body,
                        published_at = excluded.published_at,
                        url = excluded.url,
                        relevance_score = excluded.relevance_score,
                        filtered_at = excluded.filtered_at,
                        ttl_epoch = excluded.ttl_epoch",
                    params![
                        it.id,
                        RANKED_PARTITION,
                        it.rank_sort,
                        it.source,
                        it.title,
                        it.body,
                        it.published_at,
                        it.url,
                        it.relevance_score,
                        it.filtered_at,
                        it.ttl_epoch
                    ],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn get_ranked(&self, id: &str) -> FeedResult<Option<RankedItem>> {
        let id = id.to_string();
        let row = self
            .conn
            .call(move |conn| {
                let r = conn
                    .query_row(
                        &format!("SELECT {RANKED_COLUMNS} FROM filtered_events WHERE id = ?1"),
                        params![id],
                        ranked_from_row,
                    )
                    .optional()?;
                Ok(r)
            })
            .await?;
        Ok(row)
    }

    async fn query_ranked_desc(&self, limit: usize) -> FeedResult<Vec<RankedItem>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {RANKED_COLUMNS} FROM filtered_events
                     WHERE pk = ?1
                     ORDER BY rank_sort DESC, id DESC
                     LIMIT ?2"
                ))?;
                let items = stmt
                    .query_map(params![RANKED_PARTITION, limit], ranked_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(items)
            })
            .await?;
        Ok(rows)
    }

    async fn purge_expired(&self, now_epoch: i64) -> FeedResult<PurgeStats> {
        let stats = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let canonical =
                    tx.execute("DELETE FROM raw_events WHERE ttl_epoch <= ?1", params![now_epoch])?;
                let ranked = tx.execute(
                    "DELETE FROM filtered_events WHERE ttl_epoch <= ?1",
                    params![now_epoch],
                )?;
                tx.commit()?;
                Ok(PurgeStats { canonical, ranked })
            })
            .await?;
        Ok(stats)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canonical(id: &str) -> CanonicalItem {
        CanonicalItem {
            id: id.into(),
            fingerprint: id.into(),
            source: "reddit".into(),
            title: "title".into(),
            url: "https://example.com".into(),
            body: "body".into(),
            published_at: "2025-08-25T09:00:00.000000Z".into(),
            ingested_at: "2025-08-25T10:00:00.000000Z".into(),
            raw_payload: "{}".into(),
            ttl_epoch: 1_000,
        }
    }

    fn ranked(id: &str, score: f64, published_at: &str) -> RankedItem {
        RankedItem {
            id: id.into(),
            source: "reddit".into(),
            title: "title".into(),
            body: String::new(),
            published_at: published_at.into(),
            url: "https://example.com".into(),
            relevance_score: score,
            rank_sort: crate::filter::ranked::rank_sort(score, published_at),
            filtered_at: "2025-08-25T10:00:00.000000Z".into(),
            ttl_epoch: 5_000,
        }
    }

    #[tokio::test]
    async fn insert_if_absent_roundtrip() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        let c = canonical("fp1");
        assert_eq!(s.insert_canonical_if_absent(&c).await.unwrap(), InsertOutcome::Inserted);
        assert_eq!(
            s.insert_canonical_if_absent(&c).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
        assert_eq!(s.get_canonical("fp1").await.unwrap(), Some(c));
        assert_eq!(s.get_canonical("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn ranked_query_is_descending_and_limited() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.upsert_ranked(&ranked("a", 0.5, "2025-08-25T09:00:00.000000Z")).await.unwrap();
        s.upsert_ranked(&ranked("b", 0.9, "2025-08-20T09:00:00.000000Z")).await.unwrap();
        s.upsert_ranked(&ranked("c", 0.5, "2025-08-25T10:00:00.000000Z")).await.unwrap();

        let ids: Vec<_> = s
            .query_ranked_desc(10)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        assert_eq!(s.query_ranked_desc(2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.upsert_ranked(&ranked("a", 0.5, "2025-08-25T09:00:00.000000Z")).await.unwrap();
        s.upsert_ranked(&ranked("a", 0.7, "2025-08-25T09:00:00.000000Z")).await.unwrap();
        let all = s.query_ranked_desc(10).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!((all[0].relevance_score - 0.7).abs() < 1e-9);
    }

    #[tokio::test]
    async fn purge_removes_expired() {
        let s = SqliteStore::open_in_memory().await.unwrap();
        s.insert_canonical_if_absent(&canonical("fp1")).await.unwrap();
        s.upsert_ranked(&ranked("a", 0.5, "2025-08-25T09:00:00.000000Z")).await.unwrap();
        let stats = s.purge_expired(1_000).await.unwrap();
        assert_eq!(stats, PurgeStats { canonical: 1, ranked: 0 });
        let stats = s.purge_expired(10_000).await.unwrap();
        assert_eq!(stats.ranked, 1);
    }

    #[tokio::test]
    async fn file_backed_store_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("feed.db");
        {
            let s = SqliteStore::open(&path).await.unwrap();
            s.insert_canonical_if_absent(&canonical("fp1")).await.unwrap();
        }
        let s = SqliteStore::open(&path).await.unwrap();
        assert_eq!(
            s.insert_canonical_if_absent(&canonical("fp1")).await.unwrap(),
            InsertOutcome::AlreadyExists
        );
    }
}
