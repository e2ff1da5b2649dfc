//! Skinspect Proxy Library
//!
//! Item inspection service: answers what a specific in-game item looks like
//! and how rare its wear is.
//!
//! Requests are answered from the item store when possible. Everything else
//! goes through an admission-controlled queue to a fixed pool of inspection
//! sessions; results are stored, ranked and returned.

use axum::{
    http::{HeaderValue, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

pub mod annotate;
pub mod error;
pub mod inspector;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod reference;
pub mod routes;
pub mod session;
pub mod state;
pub mod store;

pub use error::InspectError;
pub use queue::QueueConfig;
pub use state::{AppState, ServiceConfig};

/// How often buffered upserts are written
pub const BULK_FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Initialize Prometheus metrics registry.
/// Should be called once before starting the server.
pub fn init_metrics() {
    if let Err(e) = metrics::register_metrics() {
        warn!("Failed to register Prometheus metrics: {}", e);
    }
}

/// CORS restricted to the configured origins
fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

/// Build the HTTP router over shared state
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Inspection endpoints
        .route("/", get(routes::inspect))
        .route("/bulk", post(routes::bulk))
        .route("/stats", get(routes::stats))
        // Stored-item queries
        .route("/api/ownership-history/:float_id", get(routes::ownership_history))
        .route(
            "/api/float-rarity/:defindex/:paintindex/:floatvalue",
            get(routes::float_rarity),
        )
        .route("/api/pattern-stats/:defindex/:paintindex", get(routes::pattern_stats))
        // Health endpoints
        .route("/health", get(routes::health))
        .route("/live", get(routes::live))
        .route("/metrics", get(routes::metrics))
        .route("/metrics/prometheus", get(routes::metrics_prometheus))
        // Middleware
        .layer(cors_layer(&state.config.allowed_origins))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start worker slots, the readiness refresher and, in buffered mode, the
/// write flusher.
pub fn spawn_background(state: &Arc<AppState>) -> Vec<JoinHandle<()>> {
    let mut handles = queue::spawn_workers(
        state.workers,
        Arc::clone(&state.queue),
        Arc::clone(&state.pool),
        state.inspector.clone(),
    );
    handles.push(state.pool.spawn_refresher(state.config.refresh_interval));
    if let Some(flusher) = state.store.spawn_flusher(BULK_FLUSH_INTERVAL) {
        handles.push(flusher);
    }
    handles
}

/// Run the inspect service.
///
/// This function starts the HTTP server and blocks until a shutdown signal,
/// then writes any buffered upserts.
///
/// # Example
/// ```no_run
/// use skinspect_proxy::{run_server, QueueConfig, ServiceConfig};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let config = ServiceConfig {
///         port: 8000,
///         database: "skinspect.db".to_string(),
///         ..Default::default()
///     };
///     run_server(config, QueueConfig::default()).await
/// }
/// ```
pub async fn run_server(config: ServiceConfig, queue_config: QueueConfig) -> anyhow::Result<()> {
    // Initialize Prometheus metrics
    init_metrics();

    info!(
        port = config.port,
        database = %config.database,
        sessions = config.sessions.len(),
        "Starting Skinspect v{}",
        env!("CARGO_PKG_VERSION")
    );
    if config.sessions.is_empty() {
        warn!("No inspection sessions configured; only cached items can be served");
    }

    // Create application state
    let state = Arc::new(AppState::from_config(config, queue_config)?);

    let ready = state.pool.refresh_all().await;
    info!(ready, total = state.pool.total(), "Initial session check");

    let background = spawn_background(&state);
    let app = build_router(Arc::clone(&state));

    // Start server
    let addr = format!("0.0.0.0:{}", state.config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("Skinspect listening on http://{}", addr);
    info!("Inspect: http://{}/?url=...", addr);
    info!("Health:  http://{}/health", addr);

    if state.config.print_banner {
        print_banner(&state);
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, stopping workers");
    for handle in background {
        handle.abort();
    }
    match state.store.flush().await {
        Ok(0) => {}
        Ok(written) => info!(written, "Flushed buffered upserts"),
        Err(e) => warn!("Failed to flush buffered upserts: {}", e),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print the startup banner
fn print_banner(state: &Arc<AppState>) {
    let addr = format!("0.0.0.0:{}", state.config.port);
    let queue = state.queue.config();

    println!();
    println!("==================================================");
    println!("  Skinspect v{}", env!("CARGO_PKG_VERSION"));
    println!("==================================================");
    println!("  Listening on: http://{}", addr);
    println!("  Database: {}", state.config.database);
    println!(
        "  Writes: {}",
        if state.store.is_buffered() {
            "buffered (1s)"
        } else {
            "immediate"
        }
    );
    println!();
    println!("  Sessions:");
    if state.config.sessions.is_empty() {
        println!("    none (set SKINSPECT_SESSIONS=name=url,...)");
    }
    for session in &state.config.sessions {
        println!("    {} -> {}", session.name, session.base_url);
    }
    println!();
    println!("  Queue configuration:");
    println!("    Workers: {}", state.workers);
    println!(
        "    Max queue: {} (per caller: {})",
        queue.max_queue_size, queue.max_per_caller
    );
    println!(
        "    Attempts: {} (timeout {}ms, default delay {}ms)",
        queue.max_attempts,
        queue.attempt_timeout.as_millis(),
        queue.default_delay.as_millis()
    );
    println!();
    println!("  Endpoints:");
    println!("    Inspect: GET  /?url=... | /?s=..&a=..&d=..");
    println!("    Bulk:    POST /bulk");
    println!("    Stats:   GET  /stats");
    println!("    Items:   GET  /api/ownership-history/:float_id");
    println!("             GET  /api/float-rarity/:defindex/:paintindex/:floatvalue");
    println!("             GET  /api/pattern-stats/:defindex/:paintindex");
    println!("    Health:  GET  /health, /live, /metrics");
    println!("    Prometheus: GET /metrics/prometheus");
    println!("==================================================");
    println!();
}
