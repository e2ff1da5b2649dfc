//! Stored-item queries: ownership history, float rarity, pattern stats.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use skinspect_core::{HistoryEntry, TradeRisk};

use crate::error::InspectError;
use crate::state::AppState;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipResponse {
    pub float_id: String,
    pub ownership_history: Vec<HistoryEntry>,
    pub trade_risk: TradeRisk,
    pub total_owners: usize,
}

fn parse_param<T: std::str::FromStr>(value: &str) -> Result<T, InspectError> {
    value.parse().map_err(|_| InspectError::BadParams)
}

/// Previous owners and listings of an item, with trade-reversal risk
///
/// GET /api/ownership-history/:float_id
pub async fn ownership_history(
    State(state): State<Arc<AppState>>,
    Path(float_id): Path<String>,
) -> Result<Json<OwnershipResponse>, InspectError> {
    let id: u64 = parse_param(&float_id)?;
    let history = state.store.ownership_history(id).await?;
    let trade_risk = TradeRisk::assess(&history, Utc::now());

    Ok(Json(OwnershipResponse {
        float_id: id.to_string(),
        total_owners: history.len(),
        ownership_history: history,
        trade_risk,
    }))
}

/// Percentile of a wear value within its template
///
/// GET /api/float-rarity/:defindex/:paintindex/:floatvalue
pub async fn float_rarity(
    State(state): State<Arc<AppState>>,
    Path((defindex, paintindex, floatvalue)): Path<(String, String, String)>,
) -> Result<Response, InspectError> {
    let defindex: u16 = parse_param(&defindex)?;
    let paintindex: u16 = parse_param(&paintindex)?;
    let wear: f32 = parse_param(&floatvalue)?;
    if !(0.0..=1.0).contains(&wear) {
        return Err(InspectError::BadParams);
    }

    let rarity = state.store.rarity(defindex, paintindex, wear).await?;
    Ok(Json(rarity).into_response())
}

/// Wear distribution of a template
///
/// GET /api/pattern-stats/:defindex/:paintindex
pub async fn pattern_stats(
    State(state): State<Arc<AppState>>,
    Path((defindex, paintindex)): Path<(String, String)>,
) -> Result<Response, InspectError> {
    let defindex: u16 = parse_param(&defindex)?;
    let paintindex: u16 = parse_param(&paintindex)?;

    let response = match state.store.pattern_stats(defindex, paintindex).await? {
        Some(stats) => Json(stats).into_response(),
        None => Json(json!({
            "error": "No data available for this item",
            "totalItems": 0
        }))
        .into_response(),
    };
    Ok(response)
}
