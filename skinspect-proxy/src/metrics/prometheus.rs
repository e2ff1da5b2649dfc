//! Prometheus metrics for the inspect service
//!
//! Exposes metrics in Prometheus format at `/metrics/prometheus`.

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

use crate::error::CapacityScope;

lazy_static! {
    /// Global Prometheus registry for skinspect metrics
    pub static ref REGISTRY: Registry = Registry::new();

    // ============== Inspection Metrics ==============

    /// Protocol attempts by outcome
    pub static ref INSPECTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("inspections_total", "Total protocol inspection attempts")
            .namespace("skinspect"),
        &["status"]
    ).expect("metric can be created");

    /// Protocol round-trip duration
    pub static ref INSPECT_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "inspect_duration_seconds",
            "Protocol round-trip duration in seconds"
        )
        .namespace("skinspect")
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    ).expect("metric can be created");

    /// Round-trips currently in flight
    pub static ref ACTIVE_INSPECTIONS: Gauge = Gauge::with_opts(
        Opts::new("active_inspections", "Protocol round-trips currently in flight")
            .namespace("skinspect")
    ).expect("metric can be created");

    // ============== Queue Metrics ==============

    /// Current queue size gauge
    pub static ref QUEUE_SIZE: Gauge = Gauge::with_opts(
        Opts::new("queue_size", "Entries waiting for a session")
            .namespace("skinspect")
    ).expect("metric can be created");

    /// Failed attempts sent back to the queue
    pub static ref ATTEMPTS_RETRIED_TOTAL: Counter = Counter::with_opts(
        Opts::new("attempts_retried_total", "Failed attempts re-enqueued")
            .namespace("skinspect")
    ).expect("metric can be created");

    /// Batches rejected by admission control
    pub static ref REJECTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("rejections_total", "Batches rejected by admission control")
            .namespace("skinspect"),
        &["scope"]
    ).expect("metric can be created");

    /// Entries that used every attempt
    pub static ref TTL_EXCEEDED_TOTAL: Counter = Counter::with_opts(
        Opts::new("ttl_exceeded_total", "Entries failed after exhausting attempts")
            .namespace("skinspect")
    ).expect("metric can be created");

    // ============== Session Metrics ==============

    /// Sessions able to serve round-trips
    pub static ref SESSIONS_READY: Gauge = Gauge::with_opts(
        Opts::new("sessions_ready", "Inspection sessions currently ready")
            .namespace("skinspect")
    ).expect("metric can be created");

    // ============== Storage Metrics ==============

    /// Cached items served without a round-trip
    pub static ref CACHE_HITS_TOTAL: Counter = Counter::with_opts(
        Opts::new("cache_hits_total", "Items answered from storage")
            .namespace("skinspect")
    ).expect("metric can be created");

    /// Items that needed a round-trip
    pub static ref CACHE_MISSES_TOTAL: Counter = Counter::with_opts(
        Opts::new("cache_misses_total", "Items not found in storage")
            .namespace("skinspect")
    ).expect("metric can be created");

    /// Storage failures by operation
    pub static ref STORAGE_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("storage_errors_total", "Storage operation failures")
            .namespace("skinspect"),
        &["operation"]
    ).expect("metric can be created");
}

/// Register all metrics with the global registry.
/// Should be called once at startup.
pub fn register_metrics() -> prometheus::Result<()> {
    // Inspection metrics
    REGISTRY.register(Box::new(INSPECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(INSPECT_DURATION_SECONDS.clone()))?;
    REGISTRY.register(Box::new(ACTIVE_INSPECTIONS.clone()))?;

    // Queue metrics
    REGISTRY.register(Box::new(QUEUE_SIZE.clone()))?;
    REGISTRY.register(Box::new(ATTEMPTS_RETRIED_TOTAL.clone()))?;
    REGISTRY.register(Box::new(REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(TTL_EXCEEDED_TOTAL.clone()))?;

    // Session metrics
    REGISTRY.register(Box::new(SESSIONS_READY.clone()))?;

    // Storage metrics
    REGISTRY.register(Box::new(CACHE_HITS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CACHE_MISSES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORAGE_ERRORS_TOTAL.clone()))?;

    Ok(())
}

/// Encode all metrics to Prometheus text format.
pub fn encode_metrics() -> String {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    encoder
        .encode_to_string(&metric_families)
        .unwrap_or_else(|e| format!("# Error encoding metrics: {}", e))
}

/// Tracks one protocol attempt.
/// Counts as a failure if dropped without an explicit record.
pub struct InspectTimer {
    start: std::time::Instant,
}

impl InspectTimer {
    pub fn new() -> Self {
        ACTIVE_INSPECTIONS.inc();
        Self { start: std::time::Instant::now() }
    }

    pub fn record_success(self) {
        self.finish("success");
    }

    pub fn record_failure(self) {
        self.finish("error");
    }

    fn finish(self, status: &str) {
        INSPECT_DURATION_SECONDS.observe(self.start.elapsed().as_secs_f64());
        INSPECTIONS_TOTAL.with_label_values(&[status]).inc();
        ACTIVE_INSPECTIONS.dec();
        // Prevent the Drop impl from running
        std::mem::forget(self);
    }
}

impl Default for InspectTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InspectTimer {
    fn drop(&mut self) {
        ACTIVE_INSPECTIONS.dec();
        INSPECTIONS_TOTAL.with_label_values(&["error"]).inc();
    }
}

/// Update queue size gauge.
pub fn set_queue_size(size: usize) {
    QUEUE_SIZE.set(size as f64);
}

/// Update ready sessions gauge.
pub fn set_sessions_ready(ready: usize) {
    SESSIONS_READY.set(ready as f64);
}

/// Record an admission rejection.
pub fn record_rejected(scope: CapacityScope) {
    REJECTIONS_TOTAL.with_label_values(&[scope.as_str()]).inc();
}

/// Record a re-enqueued attempt.
pub fn record_retry() {
    ATTEMPTS_RETRIED_TOTAL.inc();
}

/// Record an entry failing for good.
pub fn record_ttl_exceeded() {
    TTL_EXCEEDED_TOTAL.inc();
}

/// Record items answered from storage.
pub fn record_cache_hits(count: usize) {
    CACHE_HITS_TOTAL.inc_by(count as f64);
}

/// Record items sent to the queue.
pub fn record_cache_misses(count: usize) {
    CACHE_MISSES_TOTAL.inc_by(count as f64);
}

/// Record a storage failure.
pub fn record_storage_error(operation: &str) {
    STORAGE_ERRORS_TOTAL.with_label_values(&[operation]).inc();
}
