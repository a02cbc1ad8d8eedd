//! Per-call cancellation and deadline state.
//!
//! Every call the service accepts gets its own [`CallContext`]: a
//! [`CancellationToken`] (a child of the service-wide shutdown token), an
//! optional absolute deadline taken from the `grpc-timeout` request header,
//! and the name of the operation. Handlers never assume uninterrupted
//! execution; they consult the context at each suspension point:
//!
//! - [`CallContext::check`] before each unit of work,
//! - [`CallContext::pause`] for interruptible waits,
//! - [`CallContext::guard`] around any other suspension (a send that may block
//!   on backpressure, a read that waits for the next inbound message).
//!
//! The token is cancelled by the transport when the caller goes away (the
//! response stream holds a [`DropGuard`]) and by the service during shutdown.
//! A passed deadline is treated exactly like cancellation, but reported as
//! [`Error::DeadlineExceeded`].

use calculator_tonic_core::Error;
use core::time::Duration;
use tokio::time::{Instant, sleep, sleep_until};
use tokio_util::sync::{CancellationToken, DropGuard};
use tonic::metadata::MetadataMap;

/// Header carrying the caller's remaining time budget.
pub const GRPC_TIMEOUT_HEADER: &str = "grpc-timeout";

#[derive(Clone, Debug)]
pub struct CallContext {
    operation: &'static str,
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A detached context with no deadline.
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// A context cancelled whenever `parent` is.
    pub fn with_parent(operation: &'static str, parent: &CancellationToken) -> Self {
        Self {
            operation,
            token: parent.child_token(),
            deadline: None,
        }
    }

    /// Sets the deadline, keeping the earlier one if already set.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });
        self
    }

    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Applies the `grpc-timeout` header, if present and well formed.
    #[must_use]
    pub fn with_metadata(self, metadata: &MetadataMap) -> Self {
        let timeout = metadata
            .get(GRPC_TIMEOUT_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(parse_grpc_timeout);

        match timeout {
            Some(timeout) => self.with_timeout(timeout),
            None => self,
        }
    }

    pub fn operation(&self) -> &'static str {
        self.operation
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns a guard that cancels this call when dropped.
    pub fn drop_guard(&self) -> DropGuard {
        self.token.clone().drop_guard()
    }

    /// Fails if the call was cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), Error> {
        if self.token.is_cancelled() {
            return Err(Error::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(Error::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Resolves once the call must be abandoned, yielding the reason.
    pub async fn done(&self) -> Error {
        match self.deadline {
            Some(deadline) => tokio::select! {
                biased;
                () = self.token.cancelled() => Error::Cancelled,
                () = sleep_until(deadline) => Error::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                Error::Cancelled
            }
        }
    }

    /// Waits for `duration` unless the call is abandoned first.
    pub async fn pause(&self, duration: Duration) -> Result<(), Error> {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            () = sleep(duration) => Ok(()),
        }
    }

    /// Drives `fut` to completion unless the call is abandoned first.
    pub async fn guard<F>(&self, fut: F) -> Result<F::Output, Error>
    where
        F: Future,
    {
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }
}

/// Parses a `grpc-timeout` value: up to eight ASCII digits followed by one of
/// `H`, `M`, `S`, `m`, `u`, `n`.
pub fn parse_grpc_timeout(value: &str) -> Option<Duration> {
    if !value.is_ascii() || value.len() < 2 || value.len() > 9 {
        return None;
    }

    let (digits, unit) = value.split_at(value.len() - 1);
    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let amount: u64 = digits.parse().ok()?;

    let timeout = match unit {
        "H" => Duration::from_secs(amount * 60 * 60),
        "M" => Duration::from_secs(amount * 60),
        "S" => Duration::from_secs(amount),
        "m" => Duration::from_millis(amount),
        "u" => Duration::from_micros(amount),
        "n" => Duration::from_nanos(amount),
        _ => return None,
    };
    Some(timeout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    #[test]
    fn parses_every_grpc_timeout_unit() {
        assert_eq!(parse_grpc_timeout("2H"), Some(Duration::from_secs(7200)));
        assert_eq!(parse_grpc_timeout("3M"), Some(Duration::from_secs(180)));
        assert_eq!(parse_grpc_timeout("5S"), Some(Duration::from_secs(5)));
        assert_eq!(parse_grpc_timeout("1500m"), Some(Duration::from_millis(1500)));
        assert_eq!(parse_grpc_timeout("99999999u"), Some(Duration::from_micros(99_999_999)));
        assert_eq!(parse_grpc_timeout("7n"), Some(Duration::from_nanos(7)));
    }

    #[test]
    fn rejects_malformed_grpc_timeouts() {
        for value in ["", "S", "10", "10x", "+5S", "123456789S", "1.5S", "5ß"] {
            assert_eq!(parse_grpc_timeout(value), None, "{value:?}");
        }
    }

    #[tokio::test]
    async fn metadata_timeout_becomes_a_deadline() {
        let mut metadata = MetadataMap::new();
        metadata.insert(GRPC_TIMEOUT_HEADER, MetadataValue::from_static("500m"));

        let before = Instant::now();
        let ctx = CallContext::new("sum").with_metadata(&metadata);
        let deadline = ctx.deadline().expect("deadline from header");
        assert!(deadline >= before + Duration::from_millis(500));
        assert!(deadline <= Instant::now() + Duration::from_millis(500));
    }

    #[tokio::test]
    async fn keeps_the_earliest_deadline() {
        let now = Instant::now();
        let ctx = CallContext::new("sum")
            .with_deadline(now + Duration::from_secs(1))
            .with_deadline(now + Duration::from_secs(5));
        assert_eq!(ctx.deadline(), Some(now + Duration::from_secs(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn pause_stops_at_the_deadline() {
        let ctx = CallContext::new("sum").with_timeout(Duration::from_millis(100));
        assert_eq!(ctx.pause(Duration::from_millis(50)).await, Ok(()));
        assert_eq!(
            ctx.pause(Duration::from_secs(10)).await,
            Err(Error::DeadlineExceeded)
        );
        assert_eq!(ctx.check(), Err(Error::DeadlineExceeded));
    }

    #[tokio::test]
    async fn parent_cancellation_reaches_the_call() {
        let shutdown = CancellationToken::new();
        let ctx = CallContext::with_parent("pnd", &shutdown);
        assert_eq!(ctx.check(), Ok(()));

        shutdown.cancel();
        assert_eq!(ctx.check(), Err(Error::Cancelled));
        assert_eq!(ctx.done().await, Error::Cancelled);
    }

    #[tokio::test]
    async fn dropping_the_guard_cancels_the_call() {
        let ctx = CallContext::new("max");
        let guard = ctx.drop_guard();
        let pending = ctx.guard(std::future::pending::<()>());

        drop(guard);
        assert_eq!(pending.await, Err(Error::Cancelled));
    }
}
