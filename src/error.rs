// src/error.rs
//! Error taxonomy for the ingest → filter → retrieve pipeline.

use thiserror::Error;

/// Pipeline error type.
///
/// Only [`FeedError::StoreUnavailable`] is allowed to abort a batch; every other
/// variant is isolated to the item that produced it.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Raw event lacks a required key (`source` or `title`).
    #[error("missing required field `{field}`")]
    MissingField { field: &'static str },
    /// Normalized item failed validation and must not be persisted.
    #[error("invalid item: {reason}")]
    InvalidItem { reason: String },
    /// Fingerprint already admitted. Counted as skipped, not as an error.
    #[error("duplicate fingerprint {fingerprint}")]
    Duplicate { fingerprint: String },
    /// Persistence layer unreachable; caller should redeliver.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    /// Scoring could not use its primary strategy.
    #[error("scoring failure: {0}")]
    ScoringFailure(String),
    /// Invalid configuration or unsupported values.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl FeedError {
    /// True when redelivering the same unit of work may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, FeedError::StoreUnavailable(_))
    }
}

impl From<rusqlite::Error> for FeedError {
    fn from(e: rusqlite::Error) -> Self {
        FeedError::StoreUnavailable(e.to_string())
    }
}

impl From<tokio_rusqlite::Error> for FeedError {
    fn from(e: tokio_rusqlite::Error) -> Self {
        FeedError::StoreUnavailable(e.to_string())
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::InvalidItem {
            reason: e.to_string(),
        }
    }
}

/// Convenience result alias for pipeline operations.
pub type FeedResult<T> = Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_store_unavailable_is_retryable() {
        assert!(FeedError::StoreUnavailable("down".into()).is_retryable());
        assert!(!FeedError::MissingField { field: "title" }.is_retryable());
        assert!(!FeedError::Duplicate {
            fingerprint: "abc".into()
        }
        .is_retryable());
        assert!(!FeedError::ScoringFailure("bad ts".into()).is_retryable());
    }

    #[test]
    fn missing_field_names_the_key() {
        let e = FeedError::MissingField { field: "source" };
        assert_eq!(e.to_string(), "missing required field `source`");
    }
}
