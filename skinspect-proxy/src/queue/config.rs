//! Configuration for the inspection queue.

use std::time::Duration;

/// Configuration for admission control and dispatch
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum pending-or-in-flight entries per caller (0 disables the check)
    pub max_per_caller: usize,

    /// Maximum entries waiting in the queue (0 disables the check)
    pub max_queue_size: usize,

    /// Protocol attempts per entry before it fails with a TTL error
    pub max_attempts: u32,

    /// Worker slots; `None` means one per session
    pub workers: Option<usize>,

    /// Wall-clock deadline for one protocol attempt
    pub attempt_timeout: Duration,

    /// Rest after a dispatch when the session gave no pacing hint
    pub default_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_per_caller: 100,
            max_queue_size: 500,
            max_attempts: 1,
            workers: None,
            attempt_timeout: Duration::from_secs(10),
            default_delay: Duration::from_millis(1100),
        }
    }
}

impl QueueConfig {
    /// Worker slot count for a pool of `sessions`
    pub fn worker_count(&self, sessions: usize) -> usize {
        self.workers.unwrap_or(sessions).max(1)
    }

    /// Create config from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("SKINSPECT_MAX_PER_CALLER") {
            if let Ok(n) = val.parse() {
                config.max_per_caller = n;
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_MAX_QUEUE_SIZE") {
            if let Ok(n) = val.parse() {
                config.max_queue_size = n;
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_MAX_ATTEMPTS") {
            if let Ok(n) = val.parse::<u32>() {
                config.max_attempts = n.max(1);
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_WORKERS") {
            if let Ok(n) = val.parse::<usize>() {
                config.workers = (n > 0).then_some(n);
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_ATTEMPT_TIMEOUT_MS") {
            if let Ok(n) = val.parse() {
                config.attempt_timeout = Duration::from_millis(n);
            }
        }

        if let Ok(val) = std::env::var("SKINSPECT_DEFAULT_DELAY_MS") {
            if let Ok(n) = val.parse() {
                config.default_delay = Duration::from_millis(n);
            }
        }

        config
    }
}
