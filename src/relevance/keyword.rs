// src/relevance/keyword.rs
//! Baseline scorer: tiered keyword points (title weighted) plus linear recency.
//!
//! score = clamp((title_points * multiplier + body_points + recency) / max_points, 0, 1)
//!
//! Every number that feeds the score is reported in [`Relevance`], so any
//! score can be explained by hand.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use super::{anon_hash, dev_logging_enabled, truncate_vec, Relevance, RelevanceScorer};
use crate::ingest::normalize::parse_published_at;
use crate::ingest::types::CanonicalItem;

const HIGH: &[&str] = &[
    "cybersecurity",
    "security",
    "data breach",
    "vulnerability",
    "exploit",
    "malware",
    "ransomware",
    "phishing",
    "ddos",
    "incident",
    "threat",
];

const MEDIUM: &[&str] = &[
    "server",
    "network",
    "cloud",
    "aws",
    "azure",
    "gcp",
    "downtime",
    "outage",
    "patch",
    "update",
    "application",
    "api",
];

const LOW: &[&str] = &[
    "python",
    "ai",
    "machine learning",
    "ml",
    "docker",
    "kubernetes",
    "software",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    High,
    Medium,
    Low,
}

impl Tier {
    fn label(self) -> &'static str {
        match self {
            Tier::High => "high",
            Tier::Medium => "medium",
            Tier::Low => "low",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct TierPoints {
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl Default for TierPoints {
    fn default() -> Self {
        Self {
            high: 10,
            medium: 6,
            low: 3,
        }
    }
}

impl TierPoints {
    fn of(&self, t: Tier) -> u32 {
        match t {
            Tier::High => self.high,
            Tier::Medium => self.medium,
            Tier::Low => self.low,
        }
    }
}

/// Tunables, loadable from the `[scoring.keyword]` table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct KeywordConfig {
    pub high: Vec<String>,
    pub medium: Vec<String>,
    pub low: Vec<String>,
    pub points: TierPoints,
    pub title_multiplier: u32,
    /// Normalization denominator, calibrated to the vocabulary above.
    pub max_points: u32,
    pub recency_max_points: u32,
    pub recency_horizon_days: u32,
}

impl Default for KeywordConfig {
    fn default() -> Self {
        let own = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            high: own(HIGH),
            medium: own(MEDIUM),
            low: own(LOW),
            points: TierPoints::default(),
            title_multiplier: 3,
            max_points: 100,
            recency_max_points: 10,
            recency_horizon_days: 30,
        }
    }
}

static RE_TAGS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)</?[^>]+>").expect("tag regex"));

/// Lowercase, whitespace split, edge punctuation stripped (inner `-` kept).
/// HTML tags and entities are removed first; no stemming.
pub fn tokenize(text: &str) -> Vec<String> {
    let decoded = html_escape::decode_html_entities(text);
    let plain = RE_TAGS.replace_all(&decoded, " ");
    plain
        .to_lowercase()
        .split_whitespace()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Linear decay from `max_points` at age 0 to a floor of 1 at `horizon_days`.
/// Future timestamps get `max_points`; missing or unparseable ones get the floor.
pub fn recency_points(published_at: &str, now: DateTime<Utc>, max_points: u32, horizon_days: u32) -> u32 {
    let max_points = max_points.max(1);
    let Some(dt) = parse_published_at(published_at) else {
        return 1;
    };
    let age_hours = (now - dt).num_seconds() as f64 / 3600.0;
    let horizon_hours = f64::from(horizon_days.max(1)) * 24.0;
    let raw = (f64::from(max_points) * (1.0 - age_hours / horizon_hours)).round();
    raw.clamp(1.0, f64::from(max_points)) as u32
}

#[derive(Debug, Clone)]
pub struct KeywordScorer {
    cfg: KeywordConfig,
    words: HashMap<String, Tier>,
    phrases: HashMap<(String, String), Tier>,
}

impl Default for KeywordScorer {
    fn default() -> Self {
        Self::new(KeywordConfig::default())
    }
}

impl KeywordScorer {
    pub fn new(cfg: KeywordConfig) -> Self {
        let mut words = HashMap::new();
        let mut phrases = HashMap::new();
        // Lower tiers first so a term listed twice keeps its highest tier.
        for (tier, list) in [(Tier::Low, &cfg.low), (Tier::Medium, &cfg.medium), (Tier::High, &cfg.high)] {
            for term in list {
                let toks = tokenize(term);
                match toks.as_slice() {
                    [w] => {
                        words.insert(w.clone(), tier);
                    }
                    [a, b] => {
                        phrases.insert((a.clone(), b.clone()), tier);
                    }
                    _ => {}
                }
            }
        }
        Self {
            cfg,
            words,
            phrases,
        }
    }

    /// Sum tier points over tokens and adjacent token pairs of one field.
    fn field_points(&self, text: &str, field: &str, matched: &mut Vec<String>) -> u32 {
        let toks = tokenize(text);
        let mut pts = 0u32;
        for t in &toks {
            if let Some(&tier) = self.words.get(t) {
                pts += self.cfg.points.of(tier);
                matched.push(format!("{field}:{}:{t}", tier.label()));
            }
        }
        for pair in toks.windows(2) {
            let key = (pair[0].clone(), pair[1].clone());
            if let Some(&tier) = self.phrases.get(&key) {
                pts += self.cfg.points.of(tier);
                matched.push(format!("{field}:{}:{} {}", tier.label(), pair[0], pair[1]));
            }
        }
        pts
    }

    /// Score with an explicit clock.
    pub fn score_at(&self, item: &CanonicalItem, now: DateTime<Utc>) -> Relevance {
        let mut matched = Vec::new();
        let title_pts = self.field_points(&item.title, "title", &mut matched) * self.cfg.title_multiplier;
        let body_pts = self.field_points(&item.body, "body", &mut matched);

        let mut reasons = Vec::new();
        let rec = recency_points(
            &item.published_at,
            now,
            self.cfg.recency_max_points,
            self.cfg.recency_horizon_days,
        );
        if parse_published_at(&item.published_at).is_none() {
            // Degrade to the floor rather than fail the item.
            reasons.push("recency:floor_unparsed_timestamp".to_string());
        }

        let keyword_points = title_pts + body_pts;
        let total = keyword_points + rec;
        let denom = f64::from(self.cfg.max_points.max(1));
        let score = (f64::from(total) / denom).clamp(0.0, 1.0);
        reasons.push(format!("points:{total}/{}", self.cfg.max_points));

        if dev_logging_enabled() {
            debug!(
                target: "relevance",
                id = %anon_hash(&item.title),
                score, keyword_points, recency = rec,
                matched = ?truncate_vec(&matched, 5)
            );
        }

        Relevance {
            score,
            keyword_points,
            recency_points: rec,
            matched,
            reasons,
        }
    }
}

#[async_trait::async_trait]
impl RelevanceScorer for KeywordScorer {
    async fn score(&self, item: &CanonicalItem) -> Relevance {
        self.score_at(item, Utc::now())
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}
