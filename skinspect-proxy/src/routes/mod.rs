//! HTTP route handlers for the inspect service.
//!
//! This module organizes all route handlers:
//! - `inspect`: single and bulk inspection
//! - `items`: ownership history, float rarity and pattern stats
//! - `stats`: session and queue counts
//! - `health`: health check and metrics endpoints

pub mod health;
pub mod inspect;
pub mod items;
pub mod stats;

// Re-export handlers for convenience
pub use health::{health, live, metrics, metrics_prometheus};
pub use inspect::{bulk, inspect};
pub use items::{float_rarity, ownership_history, pattern_stats};
pub use stats::stats;
