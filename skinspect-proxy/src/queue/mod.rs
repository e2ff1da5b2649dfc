//! Admission-controlled inspection queue and its worker slots.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │              Inspector::submit (cache misses)            │
//! └───────────────────────────┬─────────────────────────────┘
//!                             │ whole batch or nothing
//!                    ┌────────▼────────┐
//!                    │  InspectQueue   │ ← per-caller + global ceilings
//!                    │  FIFO deque     │
//!                    └────────┬────────┘
//!                             │ next()
//!                    ┌────────▼────────┐
//!                    │  worker slots   │ ← one per session by default
//!                    │  (N tasks)      │
//!                    └────────┬────────┘
//!                             │ SessionPool::inspect
//!              ok ┌───────────┴───────────┐ err
//!                 ▼                       ▼
//!        Dispatcher::deliver     attempts left? retry at tail
//!                                 else resolve TTL exceeded
//! ```
//!
//! Every entry ends either delivered or failed; nothing is dropped.
//! Each transition is published as a [`QueueEvent`].

mod config;
mod inspect_queue;
mod metrics;
mod worker;

pub use config::QueueConfig;
pub use inspect_queue::{EntryState, InspectQueue, QueueEntry, QueueEvent};
pub use metrics::{MetricsSnapshot, QueueMetrics};
pub use worker::{dispatch, spawn_workers, Dispatcher};
