//! Authenticated inspection sessions.
//!
//! # Architecture
//!
//! ```text
//!   worker slot ──► SessionPool::inspect ──► idle set (mutex)
//!                                              │ take one ready session
//!                                     ┌────────▼────────┐
//!                                     │  dyn Session    │ ← one round-trip,
//!                                     │  (HttpSession)  │   bounded by
//!                                     └────────┬────────┘   attempt_timeout
//!                                              │ item + pacing hint
//!                   back to the idle set, resting until the hint elapses
//! ```
//!
//! A session handles one round-trip at a time. The pool keeps it out of
//! rotation for the pacing hint it returned (or the default rest), and the
//! worker slot that used it rests for the same hint.

mod http;
mod pool;
#[cfg(test)]
pub(crate) mod testing;

use std::time::Duration;

use async_trait::async_trait;
use skinspect_core::InspectedItem;

use crate::error::InspectError;
use crate::reference::InspectReference;

pub use http::{HttpSession, SessionConfig};
pub use pool::SessionPool;

/// Result of one successful protocol round-trip
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    pub item: InspectedItem,
    /// How long the session wants to rest before its next round-trip
    pub delay: Option<Duration>,
}

/// One authenticated connection to the inspection protocol
#[async_trait]
pub trait Session: Send + Sync {
    fn name(&self) -> &str;

    /// Whether the session is logged in and can serve round-trips
    fn is_ready(&self) -> bool;

    /// Perform one inspection round-trip
    async fn inspect(&self, reference: &InspectReference) -> Result<Inspection, InspectError>;

    /// Re-check readiness against the upstream; returns the new state
    async fn refresh(&self) -> bool {
        self.is_ready()
    }
}
