//! Metrics module for the inspect service
//!
//! Provides Prometheus metrics for monitoring and observability.

pub mod prometheus;

// Re-export commonly used items
pub use prometheus::{
    encode_metrics, record_cache_hits, record_cache_misses, record_rejected, record_retry,
    record_storage_error, record_ttl_exceeded, register_metrics, set_queue_size,
    set_sessions_ready, InspectTimer,
};
