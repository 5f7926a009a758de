//! Exponential backoff for retrying control-plane calls.
//!
//! The policy is deliberately simple: the interval doubles on every
//! attempt up to a cap, and the whole loop is bounded by a maximum
//! elapsed time. Retries stop immediately when the owning cancellation
//! token fires, so shutdown is never delayed by a sleeping retry loop.

use super::error::ApiError;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default initial retry interval.
pub const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default cap on a single retry interval.
pub const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Default bound on total elapsed time across all attempts.
pub const DEFAULT_MAX_ELAPSED: Duration = Duration::from_secs(120);

/// Interval growth factor between attempts.
const MULTIPLIER: u32 = 2;

/// Exponential backoff state for one retry loop.
///
/// `next_backoff` returns the delay before the next attempt, or `None`
/// once the maximum elapsed time has been spent, signalling exhaustion.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max_interval: Duration,
    max_elapsed: Duration,
    started: Option<Instant>,
}

impl ExponentialBackoff {
    /// Creates a policy with the given bounds.
    pub fn new(initial: Duration, max_interval: Duration, max_elapsed: Duration) -> Self {
        Self {
            current: initial,
            max_interval,
            max_elapsed,
            started: None,
        }
    }

    /// Creates a policy with default intervals bounded by `max_elapsed`.
    pub fn with_max_elapsed(max_elapsed: Duration) -> Self {
        Self::new(DEFAULT_INITIAL_INTERVAL, DEFAULT_MAX_INTERVAL, max_elapsed)
    }

    /// Total time spent since the first `next_backoff` call.
    pub fn elapsed(&self) -> Duration {
        self.started.map(|s| s.elapsed()).unwrap_or_default()
    }

    /// Returns the delay before the next attempt, or `None` on exhaustion.
    ///
    /// The elapsed-time clock starts on the first call, so the policy
    /// bounds time spent retrying rather than time since construction.
    pub fn next_backoff(&mut self) -> Option<Duration> {
        let started = *self.started.get_or_insert_with(Instant::now);
        if started.elapsed() >= self.max_elapsed {
            return None;
        }

        let delay = self.current;
        self.current = (self.current * MULTIPLIER).min(self.max_interval);
        Some(delay)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(
            DEFAULT_INITIAL_INTERVAL,
            DEFAULT_MAX_INTERVAL,
            DEFAULT_MAX_ELAPSED,
        )
    }
}

/// Runs `operation` until it succeeds, a terminal error occurs, the
/// policy is exhausted, or `cancel` fires.
///
/// Retryable errors (transport failures and HTTP 502+) are retried with
/// the policy's delays. Non-retryable errors are returned as-is on the
/// first occurrence. On exhaustion the last observed error is surfaced
/// inside [`ApiError::RetriesExhausted`].
///
/// Intended for idempotent calls only; non-idempotent endpoints own
/// their retry decision.
pub async fn retry_with_backoff<T, F, Fut>(
    mut policy: ExponentialBackoff,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, ApiError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ApiError>>,
{
    loop {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() => e,
            Err(e) => return Err(e),
        };

        let Some(delay) = policy.next_backoff() else {
            warn!(elapsed_ms = policy.elapsed().as_millis(), error = %error, "Retry budget exhausted");
            return Err(ApiError::RetriesExhausted {
                elapsed: policy.elapsed(),
                last: Box::new(error),
            });
        };

        debug!(delay_ms = delay.as_millis(), error = %error, "Backing off before retry");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = cancel.cancelled() => return Err(ApiError::Cancelled),
        }
    }
}
