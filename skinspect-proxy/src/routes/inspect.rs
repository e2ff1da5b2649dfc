//! Single and bulk inspection endpoints.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, rejection::QueryRejection, ConnectInfo, Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use skinspect_core::ItemInfo;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{CapacityScope, InspectError};
use crate::job::{BulkResult, InspectJob, JobResponse};
use crate::reference::{is_only_digits, InspectReference, ReferenceParams};
use crate::state::{AppState, ServiceConfig};

/// Query of `GET /`
#[derive(Debug, Default, Deserialize)]
pub struct InspectQuery {
    #[serde(flatten)]
    pub reference: ReferenceParams,
    #[serde(default)]
    pub price: Option<String>,
    #[serde(default, rename = "priceKey")]
    pub price_key: Option<String>,
}

/// Body of `POST /bulk`
#[derive(Debug, Default, Deserialize)]
pub struct BulkRequest {
    #[serde(default)]
    pub links: Vec<BulkLink>,
    #[serde(default)]
    pub bulk_key: Option<String>,
    #[serde(default, rename = "priceKey")]
    pub price_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct BulkLink {
    #[serde(flatten)]
    pub reference: ReferenceParams,
    /// Number or numeric string
    #[serde(default)]
    pub price: Option<Value>,
}

/// Caller identity used for per-caller admission
pub fn caller_id(peer: SocketAddr, headers: &HeaderMap, trust_proxy: bool) -> String {
    if trust_proxy {
        let forwarded = headers
            .get("x-forwarded-for")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|v| !v.is_empty());
        if let Some(ip) = forwarded {
            return ip.to_string();
        }
    }
    peer.ip().to_string()
}

/// Price to store with a listing, if the caller may submit one
pub fn accepted_price(
    config: &ServiceConfig,
    key: Option<&str>,
    reference: &InspectReference,
    price: Option<&str>,
) -> Option<i32> {
    let expected = config.price_key.as_deref()?;
    if key != Some(expected) || !reference.is_market_listing() {
        return None;
    }
    price.filter(|p| is_only_digits(p))?.parse().ok()
}

fn price_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

async fn settle(
    state: &AppState,
    job: &Arc<InspectJob>,
    rx: oneshot::Receiver<JobResponse>,
) -> Option<JobResponse> {
    state.inspector.submit(job).await;
    rx.await.ok()
}

/// Inspect one item
///
/// GET /?url=... or GET /?s=..&a=..&d=.. (or m= instead of s=)
pub async fn inspect(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    query: Result<Query<InspectQuery>, QueryRejection>,
) -> Result<Json<ItemInfo>, InspectError> {
    let Query(query) = query.map_err(|_| InspectError::BadParams)?;
    let reference = InspectReference::from_params(&query.reference)?;

    let caller = caller_id(peer, &headers, state.config.trust_proxy);
    let price = accepted_price(
        &state.config,
        query.price_key.as_deref(),
        &reference,
        query.price.as_deref(),
    );

    let (job, rx) = InspectJob::new(caller, false);
    job.add(reference, price);

    match settle(&state, &job, rx).await {
        Some(JobResponse::Single(result)) => result.map(Json),
        // A job whose entries vanished never resolved
        _ => Err(InspectError::TtlExceeded),
    }
}

/// Inspect many items in one request
///
/// POST /bulk
pub async fn bulk(
    State(state): State<Arc<AppState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Result<Json<BulkRequest>, JsonRejection>,
) -> Result<Json<BTreeMap<String, BulkResult>>, InspectError> {
    let Json(body) = body.map_err(|e| {
        debug!(error = %e, "Rejected bulk body");
        InspectError::BadBody
    })?;

    if let Some(expected) = state.config.bulk_key.as_deref() {
        if body.bulk_key.as_deref() != Some(expected) {
            return Err(InspectError::BadSecret);
        }
    }
    if body.links.is_empty() {
        return Err(InspectError::BadBody);
    }
    let ceiling = state.queue.config().max_per_caller;
    if ceiling > 0 && body.links.len() > ceiling {
        return Err(InspectError::CapacityExceeded { scope: CapacityScope::Caller });
    }

    let caller = caller_id(peer, &headers, state.config.trust_proxy);
    let (job, rx) = InspectJob::new(caller, true);
    for link in &body.links {
        let reference = InspectReference::from_params(&link.reference)?;
        let price_text = link.price.as_ref().and_then(price_text);
        let price = accepted_price(
            &state.config,
            body.price_key.as_deref(),
            &reference,
            price_text.as_deref(),
        );
        job.add(reference, price);
    }

    match settle(&state, &job, rx).await {
        Some(JobResponse::Bulk(map)) => Ok(Json(map)),
        _ => Err(InspectError::TtlExceeded),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn listing() -> InspectReference {
        InspectReference::from_parts("0", "625254122282020305", "6760346663", "30614827701953021")
            .unwrap()
    }

    fn inventory() -> InspectReference {
        InspectReference::from_parts("76561198084749846", "0", "698323590", "7935523998312483177")
            .unwrap()
    }

    fn keyed() -> ServiceConfig {
        ServiceConfig { price_key: Some("secret".to_string()), ..ServiceConfig::default() }
    }

    #[test]
    fn test_price_needs_key_listing_and_digits() {
        let config = keyed();
        assert_eq!(accepted_price(&config, Some("secret"), &listing(), Some("1234")), Some(1234));
        assert_eq!(accepted_price(&config, Some("wrong"), &listing(), Some("1234")), None);
        assert_eq!(accepted_price(&config, Some("secret"), &inventory(), Some("1234")), None);
        assert_eq!(accepted_price(&config, Some("secret"), &listing(), Some("12.5")), None);
        assert_eq!(accepted_price(&config, Some("secret"), &listing(), Some("-3")), None);
        assert_eq!(accepted_price(&config, Some("secret"), &listing(), None), None);
    }

    #[test]
    fn test_price_disabled_without_key() {
        let config = ServiceConfig::default();
        assert_eq!(accepted_price(&config, None, &listing(), Some("1234")), None);
    }

    #[test]
    fn test_bulk_price_accepts_number_or_string() {
        assert_eq!(price_text(&serde_json::json!(250)), Some("250".to_string()));
        assert_eq!(price_text(&serde_json::json!("250")), Some("250".to_string()));
        assert_eq!(price_text(&serde_json::json!(null)), None);
    }

    #[test]
    fn test_caller_id() {
        let peer: SocketAddr = "10.1.1.1:5000".parse().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(caller_id(peer, &headers, false), "10.1.1.1");
        assert_eq!(caller_id(peer, &headers, true), "203.0.113.9");
        assert_eq!(caller_id(peer, &HeaderMap::new(), true), "10.1.1.1");
    }

    #[test]
    fn test_bulk_body_shapes() {
        let body: BulkRequest = serde_json::from_value(serde_json::json!({
            "links": [
                { "link": "steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20M625254122282020305A6760346663D30614827701953021", "price": 100 },
                { "s": "76561198084749846", "a": "698323590", "d": "7935523998312483177" }
            ],
            "bulk_key": "k",
            "priceKey": "p"
        }))
        .unwrap();
        assert_eq!(body.links.len(), 2);
        assert!(InspectReference::from_params(&body.links[0].reference).unwrap().is_market_listing());
        assert_eq!(InspectReference::from_params(&body.links[1].reference).unwrap().asset_id, 698323590);
    }
}
