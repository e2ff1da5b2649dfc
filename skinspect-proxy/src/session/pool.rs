//! Pool of inspection sessions with an idle set.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{Inspection, Session};
use crate::error::InspectError;
use crate::metrics;
use crate::reference::InspectReference;

/// Fixed set of sessions; each serves at most one round-trip at a time and
/// rests for its pacing hint before the next one
pub struct SessionPool {
    sessions: Vec<Arc<dyn Session>>,
    /// Sessions not currently in a round-trip, with the instant each may be
    /// used again
    idle: Mutex<VecDeque<(usize, Instant)>>,
    attempt_timeout: Duration,
    /// Rest when a round-trip failed or returned no pacing hint
    default_rest: Duration,
}

impl SessionPool {
    pub fn new(sessions: Vec<Arc<dyn Session>>, attempt_timeout: Duration) -> Self {
        let now = Instant::now();
        let idle = (0..sessions.len()).map(|i| (i, now)).collect();
        Self {
            sessions,
            idle: Mutex::new(idle),
            attempt_timeout,
            default_rest: Duration::ZERO,
        }
    }

    /// Rest applied to a session whose round-trip gave no pacing hint
    pub fn with_default_rest(mut self, rest: Duration) -> Self {
        self.default_rest = rest;
        self
    }

    pub fn total(&self) -> usize {
        self.sessions.len()
    }

    pub fn ready_count(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_ready()).count()
    }

    pub fn is_any_ready(&self) -> bool {
        self.sessions.iter().any(|s| s.is_ready())
    }

    /// Run one round-trip on an idle, ready session.
    ///
    /// A session still resting from its last round-trip is waited for. Having
    /// no idle ready session at all is an attempt failure, like a protocol
    /// error.
    pub async fn inspect(&self, reference: &InspectReference) -> Result<Inspection, InspectError> {
        let index = loop {
            match self.take_idle().await {
                Ok(index) => break index,
                Err(Some(until)) => tokio::time::sleep_until(until).await,
                Err(None) => {
                    return Err(InspectError::Protocol("no idle session available".to_string()))
                }
            }
        };
        let session = &self.sessions[index];

        debug!(session = session.name(), asset_id = reference.asset_id, "Dispatching inspection");
        let outcome = tokio::time::timeout(self.attempt_timeout, session.inspect(reference)).await;

        let rest = match &outcome {
            Ok(Ok(inspection)) => inspection.delay.unwrap_or(self.default_rest),
            _ => self.default_rest,
        };
        self.idle.lock().await.push_back((index, Instant::now() + rest));

        match outcome {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    session = session.name(),
                    asset_id = reference.asset_id,
                    timeout_ms = self.attempt_timeout.as_millis() as u64,
                    "Inspection attempt timed out"
                );
                Err(InspectError::Protocol(format!(
                    "no reply within {}ms",
                    self.attempt_timeout.as_millis()
                )))
            }
        }
    }

    /// Take an idle, ready session whose rest is over.
    ///
    /// `Err(Some(instant))` is the earliest moment a resting one frees up;
    /// `Err(None)` means no idle session is ready at all.
    async fn take_idle(&self) -> Result<usize, Option<Instant>> {
        let mut idle = self.idle.lock().await;
        let now = Instant::now();
        let mut earliest: Option<Instant> = None;

        for position in 0..idle.len() {
            let (index, available_at) = idle[position];
            if !self.sessions[index].is_ready() {
                continue;
            }
            if available_at <= now {
                idle.remove(position);
                return Ok(index);
            }
            earliest = Some(earliest.map_or(available_at, |e| e.min(available_at)));
        }
        Err(earliest)
    }

    /// Re-check every session's readiness once
    pub async fn refresh_all(&self) -> usize {
        let checks = self.sessions.iter().map(|session| async move {
            let ready = session.refresh().await;
            debug!(session = session.name(), ready, "Refreshed session");
        });
        join_all(checks).await;

        let ready = self.ready_count();
        metrics::set_sessions_ready(ready);
        ready
    }

    /// Periodically refresh readiness in the background
    pub fn spawn_refresher(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let pool = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                let ready = pool.refresh_all().await;
                if ready == 0 {
                    warn!(total = pool.total(), "No inspection sessions ready");
                } else {
                    info!(ready, total = pool.total(), "Session readiness refreshed");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::testing::{reference, FakeSession};
    use std::sync::atomic::Ordering;

    #[tokio::test]
    async fn test_pool_readiness() {
        let first = Arc::new(FakeSession::ok("first"));
        let second = Arc::new(FakeSession::ok("second"));
        second.ready.store(false, Ordering::SeqCst);

        let pool = SessionPool::new(
            vec![first as Arc<dyn Session>, second as Arc<dyn Session>],
            Duration::from_secs(1),
        );
        assert_eq!(pool.total(), 2);
        assert_eq!(pool.ready_count(), 1);
        assert!(pool.is_any_ready());
    }

    #[tokio::test]
    async fn test_inspect_returns_session_to_idle() {
        let session = Arc::new(FakeSession::ok("only"));
        let pool = SessionPool::new(vec![session.clone() as Arc<dyn Session>], Duration::from_secs(1));

        let first = pool.inspect(&reference(5)).await.unwrap();
        assert_eq!(first.item.a, 5);
        pool.inspect(&reference(6)).await.unwrap();
        assert_eq!(session.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_ready_session_is_attempt_failure() {
        let session = Arc::new(FakeSession::ok("down"));
        session.ready.store(false, Ordering::SeqCst);
        let pool = SessionPool::new(vec![session as Arc<dyn Session>], Duration::from_secs(1));

        let err = pool.inspect(&reference(1)).await.unwrap_err();
        assert!(matches!(err, InspectError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_attempt_deadline() {
        let session = FakeSession { latency: Duration::from_millis(200), ..FakeSession::ok("slow") };
        let pool = SessionPool::new(vec![Arc::new(session) as Arc<dyn Session>], Duration::from_millis(20));

        let err = pool.inspect(&reference(1)).await.unwrap_err();
        assert!(matches!(err, InspectError::Protocol(_)));
        // the session is usable again after the timeout
        assert_eq!(pool.idle.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn test_session_rests_for_pacing_hint() {
        let session = Arc::new(FakeSession {
            delay: Some(Duration::from_millis(300)),
            ..FakeSession::ok("paced")
        });
        let pool = SessionPool::new(vec![session.clone() as Arc<dyn Session>], Duration::from_secs(1));

        let first = pool.inspect(&reference(1)).await.unwrap();
        assert_eq!(first.delay, Some(Duration::from_millis(300)));

        let started = std::time::Instant::now();
        pool.inspect(&reference(2)).await.unwrap();
        assert!(
            started.elapsed() >= Duration::from_millis(280),
            "session reused after {:?}",
            started.elapsed()
        );
        assert_eq!(session.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_resting_session_is_skipped_for_a_free_one() {
        let paced = Arc::new(FakeSession {
            delay: Some(Duration::from_secs(5)),
            ..FakeSession::ok("paced")
        });
        let spare = Arc::new(FakeSession::ok("spare"));
        let pool = SessionPool::new(
            vec![paced.clone() as Arc<dyn Session>, spare.clone() as Arc<dyn Session>],
            Duration::from_secs(1),
        );

        pool.inspect(&reference(1)).await.unwrap();
        let started = std::time::Instant::now();
        pool.inspect(&reference(2)).await.unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(paced.calls.load(Ordering::SeqCst), 1);
        assert_eq!(spare.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_attempt_rests_default() {
        let session = Arc::new(FakeSession::failing("down"));
        let pool = SessionPool::new(vec![session.clone() as Arc<dyn Session>], Duration::from_secs(1))
            .with_default_rest(Duration::from_millis(200));

        pool.inspect(&reference(1)).await.unwrap_err();
        let started = std::time::Instant::now();
        pool.inspect(&reference(2)).await.unwrap_err();
        assert!(started.elapsed() >= Duration::from_millis(180));
    }

    #[tokio::test]
    async fn test_refresh_all_counts_ready() {
        let up = Arc::new(FakeSession::ok("up"));
        let down = Arc::new(FakeSession::ok("down"));
        down.ready.store(false, Ordering::SeqCst);
        let pool = SessionPool::new(
            vec![up as Arc<dyn Session>, down.clone() as Arc<dyn Session>],
            Duration::from_secs(1),
        );

        assert_eq!(pool.refresh_all().await, 1);
        down.ready.store(true, Ordering::SeqCst);
        assert_eq!(pool.refresh_all().await, 2);
    }
}
