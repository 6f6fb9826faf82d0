// src/relevance/mod.rs
//! Relevance scoring: one capability trait, a deterministic keyword baseline,
//! and a model-backed variant that falls back to the baseline.

pub mod keyword;
pub mod model;

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::ScoringConfig;
use crate::ingest::types::CanonicalItem;

pub use keyword::{KeywordConfig, KeywordScorer};
pub use model::{ModelClient, ModelScorer, OpenAiClient};

/// Result of scoring one item. Only `score` is persisted; the rest explains it.
#[derive(Debug, Clone, PartialEq)]
pub struct Relevance {
    /// Normalized score in [0.0, 1.0].
    pub score: f64,
    pub keyword_points: u32,
    pub recency_points: u32,
    pub matched: Vec<String>,
    pub reasons: Vec<String>,
}

impl Default for Relevance {
    fn default() -> Self {
        Self {
            score: 0.0,
            keyword_points: 0,
            recency_points: 0,
            matched: Vec::new(),
            reasons: Vec::new(),
        }
    }
}

/// Pure scoring capability. Callers never know which strategy is behind it.
#[async_trait::async_trait]
pub trait RelevanceScorer: Send + Sync {
    async fn score(&self, item: &CanonicalItem) -> Relevance;
    fn name(&self) -> &'static str;
}

pub type DynScorer = Arc<dyn RelevanceScorer>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScorerKind {
    #[default]
    #[serde(alias = "word_score", alias = "baseline")]
    Keyword,
    #[serde(alias = "openai", alias = "openai_score")]
    Model,
}

impl ScorerKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" | "word_score" | "baseline" => Some(Self::Keyword),
            "model" | "openai" | "openai_score" => Some(Self::Model),
            _ => None,
        }
    }
}

/// Build the configured strategy. The model variant always wraps a keyword
/// fallback; without an API key it is not worth constructing at all.
pub fn build_scorer(cfg: &ScoringConfig) -> DynScorer {
    let keyword = KeywordScorer::new(cfg.keyword.clone());
    match cfg.strategy {
        ScorerKind::Keyword => Arc::new(keyword),
        ScorerKind::Model => {
            let client = OpenAiClient::new(cfg.model.as_deref());
            if !client.has_api_key() {
                warn!(target: "relevance", "model scorer requested but OPENAI_API_KEY is not set; using keyword scorer");
                return Arc::new(keyword);
            }
            info!(target: "relevance", model = client.model(), "model scorer enabled");
            Arc::new(ModelScorer::new(Arc::new(client), keyword))
        }
    }
}

// Dev logging gate: NEWSFEED_DEV_LOG=1 AND a debug build.
pub(crate) fn dev_logging_enabled() -> bool {
    let on = std::env::var("NEWSFEED_DEV_LOG").ok().as_deref() == Some("1");
    on && cfg!(debug_assertions)
}

/// Short, anonymized id for log lines (first 6 bytes of SHA-256, hex).
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

pub(crate) fn truncate_vec<T: ToString>(v: &[T], max: usize) -> Vec<String> {
    v.iter().take(max).map(|x| x.to_string()).collect()
}
