//! Newsfeed Ranker Service: Binary Entrypoint
//! Boots the Axum HTTP server, wiring the pipeline, metrics, and the TTL sweeper.

use std::time::Duration;

use anyhow::Context;
use shuttle_axum::ShuttleAxum;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use newsfeed_ranker::metrics::Metrics;
use newsfeed_ranker::{api, AppState, FeedConfig, Pipeline};

/// Compact logs; `RUST_LOG` overrides the default filter.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("newsfeed_ranker=info,warn"));

    // The runtime may already have installed a subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .try_init();
}

/// Periodically purge rows past their TTL.
fn spawn_ttl_sweeper(state: AppState, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick fires immediately; skip it so boot stays quiet.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if let Err(e) = state.pipeline.purge_expired().await {
                warn!(target: "store", error = %e, "ttl sweep failed");
            }
        }
    })
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    init_tracing();

    let cfg = FeedConfig::load().context("loading newsfeed config")?;
    let pipeline = Pipeline::from_config(&cfg)
        .await
        .context("opening newsfeed store")?;

    let state = AppState::new(pipeline);
    spawn_ttl_sweeper(
        state.clone(),
        Duration::from_secs(cfg.retention.sweep_interval_secs),
    );

    let mut router = api::router(state);
    match Metrics::init(&cfg) {
        Ok(m) => router = router.merge(m.router()),
        Err(e) => warn!(error = %e, "prometheus recorder not installed; /metrics disabled"),
    }

    info!(
        threshold = cfg.filter.threshold,
        backend = ?cfg.store.backend,
        "newsfeed ranker started"
    );
    Ok(router.into())
}
