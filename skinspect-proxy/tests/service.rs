//! End-to-end tests over a real listener with scripted sessions.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use skinspect_core::{InspectedItem, ItemStore};
use skinspect_proxy::annotate::PassThrough;
use skinspect_proxy::reference::InspectReference;
use skinspect_proxy::session::{Inspection, Session};
use skinspect_proxy::{
    build_router, spawn_background, AppState, InspectError, QueueConfig, ServiceConfig,
};
use tokio::task::JoinHandle;

const OWNER_A: &str = "76561198084749846";
const OWNER_B: &str = "76561198000000001";
const LISTING: &str = "625254122282020305";

/// Wear and seed follow the checksum, so one physical item keeps them
/// across asset ids.
struct ScriptedSession {
    ready: AtomicBool,
    fail: bool,
    calls: AtomicUsize,
}

impl ScriptedSession {
    fn new(ready: bool, fail: bool) -> Arc<Self> {
        Arc::new(Self { ready: AtomicBool::new(ready), fail, calls: AtomicUsize::new(0) })
    }
}

#[async_trait]
impl Session for ScriptedSession {
    fn name(&self) -> &str {
        "scripted"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn inspect(&self, reference: &InspectReference) -> Result<Inspection, InspectError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(InspectError::Protocol("gateway refused".to_string()));
        }
        let (s, m) = reference.owner_fields();
        let d = reference.checksum;
        let item = InspectedItem {
            s,
            a: reference.asset_id,
            d,
            m,
            floatvalue: 0.2 + (d % 100) as f32 / 1000.0,
            paintseed: (d % 1000) as u16,
            defindex: 7,
            paintindex: 44,
            rarity: 6,
            quality: 4,
            origin: 8,
            killeatervalue: None,
            customname: None,
            stickers: Vec::new(),
            keychains: Vec::new(),
        };
        Ok(Inspection { item, delay: Some(Duration::from_millis(1)) })
    }
}

struct Service {
    base: String,
    client: reqwest::Client,
    session: Arc<ScriptedSession>,
    handles: Vec<JoinHandle<()>>,
}

impl Drop for Service {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

impl Service {
    async fn start(session: Arc<ScriptedSession>, config: ServiceConfig, queue: QueueConfig) -> Self {
        let state = Arc::new(AppState::new(
            config,
            queue,
            ItemStore::open_in_memory().unwrap(),
            vec![session.clone() as Arc<dyn Session>],
            Arc::new(PassThrough),
        ));
        let mut handles = spawn_background(&state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = build_router(state);
        handles.push(tokio::spawn(async move {
            axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
                .await
                .unwrap();
        }));

        Self {
            base: format!("http://{addr}"),
            client: reqwest::Client::new(),
            session,
            handles,
        }
    }

    async fn default() -> Self {
        Self::start(ScriptedSession::new(true, false), config(), queue_config()).await
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let response = self.client.get(format!("{}{}", self.base, path)).send().await.unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let response = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = response.status().as_u16();
        (status, response.json().await.unwrap())
    }
}

fn config() -> ServiceConfig {
    ServiceConfig {
        price_key: Some("price-secret".to_string()),
        bulk_key: Some("bulk-secret".to_string()),
        print_banner: false,
        ..ServiceConfig::default()
    }
}

fn queue_config() -> QueueConfig {
    QueueConfig {
        max_per_caller: 3,
        default_delay: Duration::from_millis(1),
        attempt_timeout: Duration::from_secs(2),
        ..QueueConfig::default()
    }
}

fn inventory_query(a: u64, d: u64) -> String {
    format!("/?s={OWNER_A}&a={a}&d={d}")
}

#[tokio::test]
async fn test_single_inspect_then_cache_hit() {
    let service = Service::default().await;

    let (status, item) = service.get(&inventory_query(698323590, 12)).await;
    assert_eq!(status, 200, "{item}");
    assert_eq!(item["a"], "698323590");
    assert_eq!(item["s"], OWNER_A);
    assert_eq!(item["defindex"], 7);

    let (status, cached) = service.get(&inventory_query(698323590, 12)).await;
    assert_eq!(status, 200);
    assert_eq!(cached["floatid"], "698323590");
    assert_eq!(service.session.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_inspect_link_form() {
    let service = Service::default().await;
    let url = format!(
        "steam://rungame/730/76561202255233023/+csgo_econ_action_preview%20M{LISTING}A6760346663D30614827701953021"
    );

    let response = service
        .client
        .get(format!("{}/", service.base))
        .query(&[("url", url.as_str())])
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
    let item: Value = response.json().await.unwrap();
    assert_eq!(item["m"], LISTING);
    assert_eq!(item["s"], "0");
}

#[tokio::test]
async fn test_invalid_reference() {
    let service = Service::default().await;

    let (status, body) = service.get("/?s=0&m=0&a=1&d=2").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 2);

    let (status, body) = service.get("/?a=1").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 2);
}

#[tokio::test]
async fn test_no_ready_sessions() {
    let service =
        Service::start(ScriptedSession::new(false, false), config(), queue_config()).await;

    let (status, body) = service.get(&inventory_query(5, 5)).await;
    assert_eq!(status, 503);
    assert_eq!(body["code"], 5);
    assert_eq!(service.session.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_failing_session_exhausts_attempts() {
    let queue = QueueConfig { max_attempts: 2, ..queue_config() };
    let service = Service::start(ScriptedSession::new(true, true), config(), queue).await;

    let (status, body) = service.get(&inventory_query(5, 5)).await;
    assert_eq!(status, 500);
    assert_eq!(body["code"], 4);
    assert_eq!(service.session.calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_bulk_checks() {
    let service = Service::default().await;
    let link = json!({ "s": OWNER_A, "a": "1", "d": "1" });

    let (status, body) = service.post("/bulk", json!({ "links": [link], "bulk_key": "nope" })).await;
    assert_eq!((status, body["code"].clone()), (400, json!(8)));

    let (status, body) = service.post("/bulk", json!({ "links": [], "bulk_key": "bulk-secret" })).await;
    assert_eq!((status, body["code"].clone()), (400, json!(7)));

    let many: Vec<Value> = (1..=4).map(|a| json!({ "s": OWNER_A, "a": a.to_string(), "d": "1" })).collect();
    let (status, body) = service.post("/bulk", json!({ "links": many, "bulk_key": "bulk-secret" })).await;
    assert_eq!((status, body["code"].clone()), (400, json!(3)));

    let bad = json!({ "links": [{ "s": OWNER_A, "a": "x", "d": "1" }], "bulk_key": "bulk-secret" });
    let (status, body) = service.post("/bulk", bad).await;
    assert_eq!((status, body["code"].clone()), (400, json!(2)));
}

#[tokio::test]
async fn test_bulk_resolves_every_link() {
    let service = Service::default().await;
    let links: Vec<Value> = (1..=3)
        .map(|a| json!({ "s": OWNER_A, "a": a.to_string(), "d": (a * 10).to_string() }))
        .collect();

    let (status, body) = service.post("/bulk", json!({ "links": links, "bulk_key": "bulk-secret" })).await;
    assert_eq!(status, 200, "{body}");
    let map = body.as_object().unwrap();
    assert_eq!(map.len(), 3);
    for a in ["1", "2", "3"] {
        assert_eq!(map[a]["a"], a);
    }
}

#[tokio::test]
async fn test_listing_price_and_trade_history() {
    let service = Service::default().await;

    // listed with a submitted price, then bought into an inventory
    let listed = format!("/?m={LISTING}&a=100&d=42&price=1550&priceKey=price-secret");
    let (status, _) = service.get(&listed).await;
    assert_eq!(status, 200);
    let (status, _) = service.get(&inventory_query(200, 42)).await;
    assert_eq!(status, 200);
    // traded to another account
    let (status, _) = service.get(&format!("/?s={OWNER_B}&a=300&d=42")).await;
    assert_eq!(status, 200);

    let (status, body) = service.get("/api/ownership-history/100").await;
    assert_eq!(status, 200);
    assert_eq!(body["floatId"], "100");
    assert_eq!(body["totalOwners"], 2);
    assert_eq!(body["ownershipHistory"][0]["assetId"], "200");
    assert_eq!(body["ownershipHistory"][1]["price"], 1550);
    assert_eq!(body["tradeRisk"]["risk"], "HIGH");

    let (status, body) = service.get("/api/ownership-history/abc").await;
    assert_eq!(status, 400);
    assert_eq!(body["code"], 1);
}

#[tokio::test]
async fn test_rarity_and_pattern_stats() {
    let service = Service::default().await;
    for (a, d) in [(1, 10), (2, 20), (3, 30), (4, 40)] {
        let (status, _) = service.get(&inventory_query(a, d)).await;
        assert_eq!(status, 200);
    }

    // wears are 0.21, 0.22, 0.23, 0.24
    let (status, body) = service.get("/api/float-rarity/7/44/0.225").await;
    assert_eq!(status, 200);
    assert_eq!(body["totalSeen"], 4);
    assert_eq!(body["betterFloats"], 2);
    assert_eq!(body["percentile"], 50.0);

    let (status, body) = service.get("/api/pattern-stats/7/44").await;
    assert_eq!(status, 200);
    assert_eq!(body["totalItems"], 4);
    assert_eq!(body["uniquePatterns"], 4);

    let (status, body) = service.get("/api/pattern-stats/1/1").await;
    assert_eq!(status, 200);
    assert_eq!(body["totalItems"], 0);

    let (status, _) = service.get("/api/float-rarity/7/44/1.5").await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_stats_and_health() {
    let service = Service::default().await;

    let (status, stats) = service.get("/stats").await;
    assert_eq!(status, 200);
    assert_eq!(
        stats,
        json!({ "bots_online": 1, "bots_total": 1, "queue_size": 0, "queue_concurrency": 1 })
    );

    let (status, health) = service.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(health["status"], "healthy");

    let response = service
        .client
        .get(format!("{}/metrics/prometheus", service.base))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status().as_u16(), 200);
}
