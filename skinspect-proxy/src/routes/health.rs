//! Health check and metrics endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde_json::json;
use std::sync::Arc;

use crate::state::AppState;

/// Health check endpoint
///
/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let ready = state.pool.ready_count();
    let storage = state.store.item_count().await;

    let healthy = ready > 0 && storage.is_ok();
    let status = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "degraded" },
            "sessions": {
                "ready": ready,
                "total": state.pool.total()
            },
            "storage": match &storage {
                Ok(_) => "connected".to_string(),
                Err(e) => e.to_string(),
            },
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// Metrics endpoint with queue and storage statistics
///
/// GET /metrics
pub async fn metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.queue.metrics().snapshot();
    let config = state.queue.config();
    let queue_size = state.queue.size().await;
    let items_stored = state.store.item_count().await.ok();

    Json(json!({
        "queue": {
            "config": {
                "max_per_caller": config.max_per_caller,
                "max_queue_size": config.max_queue_size,
                "max_attempts": config.max_attempts,
                "workers": state.workers
            },
            "current": {
                "queue_size": queue_size,
                "in_flight": snapshot.entries_in_flight
            },
            "totals": snapshot
        },
        "sessions": {
            "ready": state.pool.ready_count(),
            "total": state.pool.total()
        },
        "storage": {
            "items": items_stored,
            "buffered_writes": state.store.is_buffered()
        }
    }))
}

/// Live check
///
/// GET /live
pub async fn live() -> impl IntoResponse {
    StatusCode::OK
}

/// Prometheus text exposition
///
/// GET /metrics/prometheus
pub async fn metrics_prometheus() -> impl IntoResponse {
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        crate::metrics::encode_metrics(),
    )
}
