//! Admission control and drain for in-flight calls.
//!
//! Every accepted call holds a [`CallGuard`]. The tracker counts guards so
//! that shutdown can wait for running calls before cancelling them, and owns
//! the service-wide [`CancellationToken`] that every call context derives
//! from.

use crate::server::telemetry::{call_finished, call_started};
use calculator_tonic_core::{Error, Result};
use core::time::Duration;
use portable_atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::time::{Instant, sleep, timeout};
use tokio_util::sync::CancellationToken;

/// Interval at which [`CallTracker::shutdown`] polls the in-flight count.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug)]
pub struct CallTracker {
    shutdown_token: CancellationToken,
    accepting: AtomicBool,
    inflight: AtomicUsize,
}

impl Default for CallTracker {
    fn default() -> Self {
        Self {
            shutdown_token: CancellationToken::new(),
            accepting: AtomicBool::new(true),
            inflight: AtomicUsize::new(0),
        }
    }
}

impl CallTracker {
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown_token
    }

    pub fn inflight(&self) -> usize {
        self.inflight.load(Ordering::Acquire)
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Admits a new call, or fails with [`Error::ServiceShutdown`] once
    /// shutdown has begun.
    pub fn begin(self: &Arc<Self>, operation: &'static str) -> Result<CallGuard> {
        // Count first so a concurrent drain never observes zero while this
        // call is being admitted.
        self.inflight.fetch_add(1, Ordering::AcqRel);
        if !self.is_accepting() {
            self.inflight.fetch_sub(1, Ordering::AcqRel);
            return Err(Error::ServiceShutdown);
        }

        call_started(operation);
        Ok(CallGuard {
            tracker: Arc::clone(self),
            operation,
            started: Instant::now(),
        })
    }

    /// Stops admitting calls, waits up to `drain_timeout` for running calls
    /// to finish, then cancels whatever is left.
    pub async fn shutdown(&self, drain_timeout: Duration) {
        tracing::info!("Refusing new calls");
        self.accepting.store(false, Ordering::Release);

        tracing::info!(inflight = self.inflight(), "Draining in-flight calls");
        let drained = timeout(drain_timeout, async {
            while self.inflight() > 0 {
                sleep(DRAIN_POLL_INTERVAL).await;
            }
        })
        .await;

        match drained {
            Ok(()) => tracing::debug!("All in-flight calls drained"),
            Err(_) => tracing::warn!(
                inflight = self.inflight(),
                "Graceful drain timed out, cancelling remaining calls"
            ),
        }

        self.shutdown_token.cancel();
        tracing::info!("Call tracker shut down");
    }
}

/// Keeps a call counted as in flight until dropped.
#[derive(Debug)]
pub struct CallGuard {
    tracker: Arc<CallTracker>,
    operation: &'static str,
    started: Instant,
}

impl CallGuard {
    pub fn operation(&self) -> &'static str {
        self.operation
    }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        self.tracker.inflight.fetch_sub(1, Ordering::AcqRel);
        call_finished(
            self.operation,
            self.started.elapsed().as_secs_f64() * 1000.0,
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn guards_are_counted_until_dropped() {
        let tracker = Arc::new(CallTracker::default());
        let first = tracker.begin("sum").unwrap();
        let second = tracker.begin("pnd").unwrap();
        assert_eq!(tracker.inflight(), 2);
        assert_eq!(second.operation(), "pnd");

        drop(first);
        drop(second);
        assert_eq!(tracker.inflight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_refuses_then_cancels_after_drain_timeout() {
        let tracker = Arc::new(CallTracker::default());
        let straggler = tracker.begin("find_max").unwrap();
        let token = tracker.shutdown_token().clone();

        let started = Instant::now();
        tracker.shutdown(Duration::from_secs(3)).await;

        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(token.is_cancelled());
        assert_eq!(tracker.begin("sum").unwrap_err(), Error::ServiceShutdown);
        // The refused call is not counted.
        assert_eq!(tracker.inflight(), 1);
        drop(straggler);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_returns_early_once_drained() {
        let tracker = Arc::new(CallTracker::default());
        let guard = tracker.begin("average").unwrap();

        tokio::spawn(async move {
            sleep(Duration::from_millis(200)).await;
            drop(guard);
        });

        let started = Instant::now();
        tracker.shutdown(Duration::from_secs(3)).await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(tracker.shutdown_token().is_cancelled());
    }
}
