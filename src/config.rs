// src/config.rs
//! Service configuration: `config/newsfeed.toml` plus env overrides.
//!
//! Resolution order:
//! 1) $NEWSFEED_CONFIG_PATH
//! 2) config/newsfeed.toml
//! 3) built-in defaults
//!
//! Then `NEWSFEED_THRESHOLD`, `NEWSFEED_SCORER`, `NEWSFEED_STORE` and
//! `NEWSFEED_SQLITE_PATH` override individual keys.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use tracing::warn;

use crate::filter::ranked::{DEFAULT_RANKED_TTL_DAYS, DEFAULT_THRESHOLD};
use crate::ingest::normalize::DEFAULT_RAW_TTL_DAYS;
use crate::relevance::{KeywordConfig, ScorerKind};
use crate::retrieve::{DEFAULT_LIMIT, MAX_LIMIT};

// --- env defaults & names ---
pub const DEFAULT_CONFIG_PATH: &str = "config/newsfeed.toml";

pub const ENV_CONFIG_PATH: &str = "NEWSFEED_CONFIG_PATH";
pub const ENV_THRESHOLD: &str = "NEWSFEED_THRESHOLD";
pub const ENV_SCORER: &str = "NEWSFEED_SCORER";
pub const ENV_STORE: &str = "NEWSFEED_STORE";
pub const ENV_SQLITE_PATH: &str = "NEWSFEED_SQLITE_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub filter: FilterConfig,
    pub retrieve: RetrieveConfig,
    pub retention: RetentionConfig,
    pub scoring: ScoringConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Items are persisted as ranked only when `score > threshold`.
    pub threshold: f64,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrieveConfig {
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for RetrieveConfig {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub raw_ttl_days: i64,
    pub ranked_ttl_days: i64,
    /// TTL sweep period for the service binary.
    pub sweep_interval_secs: u64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            raw_ttl_days: DEFAULT_RAW_TTL_DAYS,
            ranked_ttl_days: DEFAULT_RANKED_TTL_DAYS,
            sweep_interval_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub strategy: ScorerKind,
    /// Model name for the model strategy (defaults to the client's choice).
    pub model: Option<String>,
    pub keyword: KeywordConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Sqlite,
}

impl StoreBackend {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Some(Self::Memory),
            "sqlite" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub sqlite_path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            sqlite_path: PathBuf::from("data/newsfeed.db"),
        }
    }
}

// parse optional float env and clamp to <0.0..=1.0>
fn parse_threshold_env(raw: Option<String>) -> Option<f64> {
    raw.and_then(|s| s.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

impl FeedConfig {
    /// Load using env var + fallbacks, then apply env overrides.
    pub fn load() -> Result<Self> {
        let mut cfg = if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if !pb.exists() {
                return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
            }
            Self::load_from(&pb)?
        } else {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            if default.exists() {
                Self::load_from(&default)?
            } else {
                Self::default()
            }
        };
        cfg.apply_env();
        cfg.sanitize();
        Ok(cfg)
    }

    /// Load from an explicit path, no env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading newsfeed config from {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("parsing newsfeed config at {}", path.display()))
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut cfg: FeedConfig = toml::from_str(s)?;
        cfg.sanitize();
        Ok(cfg)
    }

    pub fn apply_env(&mut self) {
        if let Some(t) = parse_threshold_env(std::env::var(ENV_THRESHOLD).ok()) {
            self.filter.threshold = t;
        }
        if let Ok(v) = std::env::var(ENV_SCORER) {
            match ScorerKind::parse(&v) {
                Some(k) => self.scoring.strategy = k,
                None => warn!(value = %v, "ignoring unknown {ENV_SCORER}"),
            }
        }
        if let Ok(v) = std::env::var(ENV_STORE) {
            match StoreBackend::parse(&v) {
                Some(b) => self.store.backend = b,
                None => warn!(value = %v, "ignoring unknown {ENV_STORE}"),
            }
        }
        if let Ok(v) = std::env::var(ENV_SQLITE_PATH) {
            if !v.trim().is_empty() {
                self.store.sqlite_path = PathBuf::from(v);
            }
        }
    }

    /// Repair out-of-range values instead of refusing to start.
    pub fn sanitize(&mut self) {
        if !self.filter.threshold.is_finite() {
            self.filter.threshold = DEFAULT_THRESHOLD;
        }
        self.filter.threshold = self.filter.threshold.clamp(0.0, 1.0);
        self.retrieve.max_limit = self.retrieve.max_limit.max(1);
        self.retrieve.default_limit = self.retrieve.default_limit.clamp(1, self.retrieve.max_limit);
        self.retention.raw_ttl_days = self.retention.raw_ttl_days.max(1);
        self.retention.ranked_ttl_days = self.retention.ranked_ttl_days.max(1);
        self.retention.sweep_interval_secs = self.retention.sweep_interval_secs.max(1);
        let kw = &mut self.scoring.keyword;
        kw.max_points = kw.max_points.max(1);
        kw.recency_max_points = kw.recency_max_points.max(1);
        kw.recency_horizon_days = kw.recency_horizon_days.max(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    #[test]
    fn empty_toml_gives_defaults() {
        let c = FeedConfig::from_toml_str("").unwrap();
        assert!((c.filter.threshold - 0.4).abs() < 1e-12);
        assert_eq!(c.retrieve.default_limit, 50);
        assert_eq!(c.retrieve.max_limit, 100);
        assert_eq!(c.retention.raw_ttl_days, 10);
        assert_eq!(c.retention.ranked_ttl_days, 30);
        assert_eq!(c.scoring.strategy, ScorerKind::Keyword);
        assert_eq!(c.scoring.keyword.max_points, 100);
        assert_eq!(c.store.backend, StoreBackend::Memory);
    }

    #[test]
    fn partial_sections_merge_with_defaults() {
        let c = FeedConfig::from_toml_str(
            r#"
[filter]
threshold = 0.55

[retrieve]
default_limit = 500
max_limit = 20

[scoring]
strategy = "openai"

[scoring.keyword]
title_multiplier = 2
high = ["outage"]

[store]
backend = "sqlite"
sqlite_path = "/tmp/x.db"
"#,
        )
        .unwrap();
        assert!((c.filter.threshold - 0.55).abs() < 1e-12);
        assert_eq!(c.retrieve.max_limit, 20);
        assert_eq!(c.retrieve.default_limit, 20);
        assert_eq!(c.scoring.strategy, ScorerKind::Model);
        assert_eq!(c.scoring.keyword.title_multiplier, 2);
        assert_eq!(c.scoring.keyword.high, vec!["outage".to_string()]);
        assert_eq!(c.scoring.keyword.points.high, 10);
        assert_eq!(c.store.backend, StoreBackend::Sqlite);
    }

    #[test]
    fn threshold_env_parsing_clamps() {
        assert_eq!(parse_threshold_env(Some(" 0.7 ".into())), Some(0.7));
        assert_eq!(parse_threshold_env(Some("3".into())), Some(1.0));
        assert_eq!(parse_threshold_env(Some("NaN".into())), None);
        assert_eq!(parse_threshold_env(Some("abc".into())), None);
        assert_eq!(parse_threshold_env(None), None);
    }

    #[serial_test::serial]
    #[test]
    fn env_overrides_file_values() {
        let tmp = tempfile::tempdir().unwrap();
        let p = tmp.path().join("newsfeed.toml");
        fs::write(&p, "[filter]\nthreshold = 0.2\n").unwrap();

        env::set_var(ENV_CONFIG_PATH, p.display().to_string());
        env::set_var(ENV_THRESHOLD, "0.6");
        env::set_var(ENV_STORE, "sqlite");
        env::set_var(ENV_SQLITE_PATH, "/tmp/feed.db");
        let c = FeedConfig::load().unwrap();
        assert!((c.filter.threshold - 0.6).abs() < 1e-12);
        assert_eq!(c.store.backend, StoreBackend::Sqlite);
        assert_eq!(c.store.sqlite_path, PathBuf::from("/tmp/feed.db"));

        env::remove_var(ENV_THRESHOLD);
        env::remove_var(ENV_STORE);
        env::remove_var(ENV_SQLITE_PATH);
        let c = FeedConfig::load().unwrap();
        assert!((c.filter.threshold - 0.2).abs() < 1e-12);

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("missing.toml").display().to_string());
        assert!(FeedConfig::load().is_err());
        env::remove_var(ENV_CONFIG_PATH);
    }
}
