// src/api.rs
//! Thin HTTP surface: direct ingestion and ranked retrieval.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};
use shuttle_axum::axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::error::FeedError;
use crate::filter::FilterDecision;
use crate::ingest::parse_events;
use crate::pipeline::Pipeline;

#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .route("/news", get(get_news))
        .route("/ingest", post(post_ingest))
        .route("/admin/refilter/{id}", post(admin_refilter))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "bad request", "message": message.into() })),
    )
        .into_response()
}

/// Store outages are reported as degraded service, never as an empty feed.
fn error_response(e: &FeedError) -> Response {
    if e.is_retryable() {
        warn!(error = %e, "store unavailable");
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": "service degraded", "message": e.to_string() })),
        )
            .into_response()
    } else {
        warn!(error = %e, "request failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "internal error", "message": e.to_string() })),
        )
            .into_response()
    }
}

fn flag(q: &HashMap<String, String>, key: &str) -> bool {
    q.get(key)
        .is_some_and(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes"))
}

async fn get_news(State(state): State<AppState>, Query(q): Query<HashMap<String, String>>) -> Response {
    let limit = match q.get("limit").map(|s| s.trim()) {
        None | Some("") => None,
        Some(s) => match s.parse::<i64>() {
            Ok(n) => Some(n),
            Err(_) => return bad_request(format!("limit must be an integer, got {s:?}")),
        },
    };
    let include_metadata = flag(&q, "dashboard") || flag(&q, "include_metadata");

    match state.pipeline.retrieve(limit, include_metadata).await {
        Ok(items) => Json(items).into_response(),
        Err(e) => error_response(&e),
    }
}

async fn post_ingest(State(state): State<AppState>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(v) => v,
        Err(e) => return bad_request(format!("invalid JSON body: {e}")),
    };
    let events = match parse_events(&value) {
        Ok(ev) => ev,
        Err(e) => return bad_request(e.to_string()),
    };

    match state.pipeline.ingest(&events).await {
        Ok(report) => {
            let r = report.ingest;
            Json(json!({
                "message": format!("Processed {} events, skipped {}", r.processed, r.skipped),
                "processed": r.processed,
                "skipped": r.skipped,
                "total": r.total,
                "errors": r.errors,
                "persisted": report.filter.persisted,
            }))
            .into_response()
        }
        Err(e) => error_response(&e),
    }
}

async fn admin_refilter(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.pipeline.refilter(&id).await {
        Ok(Some(FilterDecision::Persisted(item))) => Json(json!({
            "id": item.id,
            "persisted": true,
            "relevance_score": item.relevance_score,
        }))
        .into_response(),
        Ok(Some(FilterDecision::BelowThreshold(score))) => Json(json!({
            "id": id,
            "persisted": false,
            "relevance_score": score,
        }))
        .into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "not found", "message": format!("no canonical item {id}") })),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}
