//! Session and queue statistics.

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct StatsResponse {
    pub bots_online: usize,
    pub bots_total: usize,
    pub queue_size: usize,
    pub queue_concurrency: usize,
}

/// GET /stats
pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        bots_online: state.pool.ready_count(),
        bots_total: state.pool.total(),
        queue_size: state.queue.size().await,
        queue_concurrency: state.workers,
    })
}
