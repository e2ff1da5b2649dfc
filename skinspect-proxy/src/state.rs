//! Application state for the inspect service.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use skinspect_core::ItemStore;
use tracing::info;

use crate::annotate::{Annotator, CatalogAnnotator, PassThrough};
use crate::inspector::Inspector;
use crate::queue::{InspectQueue, QueueConfig, QueueMetrics};
use crate::session::{HttpSession, Session, SessionConfig, SessionPool};
use crate::store::StoreHandle;

/// Database path that selects a private in-memory store
pub const MEMORY_DATABASE: &str = ":memory:";

/// Application state shared across all handlers
pub struct AppState {
    /// Configuration
    pub config: ServiceConfig,

    /// Item store
    pub store: StoreHandle,

    /// Inspection sessions
    pub pool: Arc<SessionPool>,

    /// Pending inspections
    pub queue: Arc<InspectQueue>,

    /// Cache-then-queue fan-out, also the workers' dispatcher
    pub inspector: Arc<Inspector>,

    /// Worker slot count
    pub workers: usize,
}

impl AppState {
    /// Open the store, build gateway sessions and load the catalog
    pub fn from_config(config: ServiceConfig, queue_config: QueueConfig) -> anyhow::Result<Self> {
        let store = if config.database == MEMORY_DATABASE {
            ItemStore::open_in_memory()
        } else {
            ItemStore::open(&config.database)
        }
        .with_context(|| format!("Failed to open item store {}", config.database))?;

        let sessions = config
            .sessions
            .iter()
            .map(|session| {
                HttpSession::new(session.clone(), config.request_timeout)
                    .map(|s| Arc::new(s) as Arc<dyn Session>)
                    .with_context(|| format!("Failed to build session {}", session.name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;

        let annotator: Arc<dyn Annotator> = match &config.catalog {
            Some(path) => Arc::new(CatalogAnnotator::from_path(path)?),
            None => Arc::new(PassThrough),
        };

        Ok(Self::new(config, queue_config, store, sessions, annotator))
    }

    /// Assemble state from already-built parts
    pub fn new(
        config: ServiceConfig,
        queue_config: QueueConfig,
        store: ItemStore,
        sessions: Vec<Arc<dyn Session>>,
        annotator: Arc<dyn Annotator>,
    ) -> Self {
        let store = if config.bulk_inserts {
            StoreHandle::buffered(store)
        } else {
            StoreHandle::new(store)
        };

        let workers = queue_config.worker_count(sessions.len());
        let pool = Arc::new(
            SessionPool::new(sessions, queue_config.attempt_timeout)
                .with_default_rest(queue_config.default_delay),
        );
        let queue = Arc::new(InspectQueue::new(queue_config, Arc::new(QueueMetrics::new())));
        let inspector = Arc::new(Inspector::new(
            store.clone(),
            Arc::clone(&pool),
            Arc::clone(&queue),
            annotator,
        ));

        info!(sessions = pool.total(), workers, buffered = store.is_buffered(), "Service state ready");

        Self { config, store, pool, queue, inspector, workers }
    }
}

/// Service configuration
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Port to listen on
    pub port: u16,

    /// SQLite file, or `:memory:`
    pub database: String,

    /// Buffer upserts and write them once per second
    pub bulk_inserts: bool,

    /// Secret that lets callers submit listing prices
    pub price_key: Option<String>,

    /// Secret required by `/bulk` when set
    pub bulk_key: Option<String>,

    /// Identify callers by the first `X-Forwarded-For` hop
    pub trust_proxy: bool,

    /// CORS origins; empty disables cross-origin access
    pub allowed_origins: Vec<String>,

    /// Upstream gateway logins
    pub sessions: Vec<SessionConfig>,

    /// How often session readiness is re-checked
    pub refresh_interval: Duration,

    /// HTTP timeout for gateway calls
    pub request_timeout: Duration,

    /// Item catalog JSON for display names
    pub catalog: Option<PathBuf>,

    /// Whether to print the banner on startup
    pub print_banner: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            port: 8000,
            database: "skinspect.db".to_string(),
            bulk_inserts: false,
            price_key: None,
            bulk_key: None,
            trust_proxy: false,
            allowed_origins: Vec::new(),
            sessions: Vec::new(),
            refresh_interval: Duration::from_secs(30),
            request_timeout: Duration::from_secs(15),
            catalog: None,
            print_banner: true,
        }
    }
}

impl ServiceConfig {
    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SKINSPECT_PORT") {
            if let Ok(port) = val.parse() {
                config.port = port;
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_DATABASE") {
            config.database = val;
        }

        if let Ok(val) = std::env::var("SKINSPECT_BULK_INSERTS") {
            config.bulk_inserts = parse_flag(&val);
        }

        config.price_key = non_empty_var("SKINSPECT_PRICE_KEY");
        config.bulk_key = non_empty_var("SKINSPECT_BULK_KEY");

        if let Ok(val) = std::env::var("SKINSPECT_TRUST_PROXY") {
            config.trust_proxy = parse_flag(&val);
        }

        if let Ok(val) = std::env::var("SKINSPECT_ALLOWED_ORIGINS") {
            config.allowed_origins = split_list(&val);
        }

        if let Ok(val) = std::env::var("SKINSPECT_SESSIONS") {
            config.sessions =
                SessionConfig::parse_list(&val, non_empty_var("SKINSPECT_SESSION_TOKEN"));
        }

        if let Ok(val) = std::env::var("SKINSPECT_REFRESH_INTERVAL_MS") {
            if let Ok(ms) = val.parse() {
                config.refresh_interval = Duration::from_millis(ms);
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_REQUEST_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.request_timeout = Duration::from_millis(ms);
            }
        }

        config.catalog = non_empty_var("SKINSPECT_CATALOG").map(PathBuf::from);
        config
    }
}

fn parse_flag(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
