//! Exponential backoff with jitter, plus a generic retry combinator.
//!
//! Every remote call site shares the same retry-loop shape: attempt the
//! call, classify the failure, back off, try again. The shape lives here
//! once instead of being copied into each source.

use std::future::Future;
use std::time::Duration;

/// Retry-delay policy for rate-limit and transient failures.
///
/// The delay before retrying zero-indexed attempt `k` is
/// `min(base_delay * 2^k + jitter, max_delay)` with jitter uniform in
/// [0, 1) seconds. Jitter keeps independent process invocations that hit
/// the same limit from retrying in lockstep.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    pub max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(5, Duration::from_secs(1), Duration::from_secs(60))
    }
}

impl ExponentialBackoff {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    /// Jitter-free delay for `attempt`. Deterministic, for diagnostics
    /// and logging; [`wait`](Self::wait) adds the jitter.
    pub fn get_delay(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.as_secs_f64() * 2f64.powi(attempt.min(63) as i32);
        Duration::from_secs_f64(exp.min(self.max_delay.as_secs_f64()))
    }

    /// Sleep before retrying zero-indexed `attempt`.
    ///
    /// Returns `false` immediately, without sleeping, once the attempt
    /// budget is spent: the caller should give up.
    pub async fn wait(&self, attempt: u32) -> bool {
        if attempt + 1 >= self.max_attempts {
            return false;
        }
        let jitter = Duration::from_secs_f64(fastrand::f64());
        let delay = (self.get_delay(attempt) + jitter).min(self.max_delay);
        tracing::debug!(attempt, delay_secs = delay.as_secs_f64(), "backing off");
        tokio::time::sleep(delay).await;
        true
    }
}

/// What to do with a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Transient: back off and try again.
    Retry,
    /// Permanent: surface the error immediately.
    Fail,
}

/// Run `op` until it succeeds, the classifier declares the error
/// permanent, or the backoff budget is exhausted. The last error is
/// returned unchanged either way.
pub async fn retry_with_backoff<T, E, F, Fut>(
    backoff: &ExponentialBackoff,
    classify: impl Fn(&E) -> RetryDecision,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if classify(&err) == RetryDecision::Fail || !backoff.wait(attempt).await {
                    return Err(err);
                }
                attempt += 1;
            }
        }
    }
}
