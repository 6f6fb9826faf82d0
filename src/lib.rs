// src/lib.rs
// Public library surface for the service binary and integration tests.

pub mod api;
pub mod config;
pub mod error;
pub mod filter;
pub mod ingest;
pub mod metrics;
pub mod pipeline;
pub mod relevance;
pub mod retrieve;
pub mod store;

// ---- Re-exports for stable public API ----
pub use crate::api::{router, AppState};
pub use crate::config::FeedConfig;
pub use crate::error::{FeedError, FeedResult};
pub use crate::pipeline::Pipeline;
