//! Retry with backoff
//!
//! The single retry loop used for whole-leg operations. Whether an error is
//! retried is decided on its [`ErrorKind`](crate::error::ErrorKind), never on
//! message text. Adapters do not retry their own publish calls; bounded
//! polling of platform-side processing lives in
//! [`platforms::media`](crate::platforms::media).

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

use crate::error::{PlatformError, PlatformResult};

/// Growth of the delay between attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `base * 2^(attempt - 1)`: 1s, 2s, 4s for a 1s base
    Exponential,
    /// `base * attempt`: 2s, 4s, 6s for a 2s base
    Linear,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub backoff: Backoff,
    /// A server `retry_after` hint longer than this ends the loop early
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Exponential,
            max_delay: Duration::from_secs(300),
        }
    }

    pub fn linear(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            backoff: Backoff::Linear,
            max_delay: Duration::from_secs(300),
        }
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Delay after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self.backoff {
            Backoff::Exponential => self
                .base_delay
                .saturating_mul(2_u32.saturating_pow(attempt - 1)),
            Backoff::Linear => self.base_delay.saturating_mul(attempt),
        }
    }
}

/// Result of a retried operation together with the attempts it took
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: PlatformResult<T>,
    pub attempts: u32,
}

/// Run `op` until it succeeds, fails with a non-retryable error, or the
/// policy's attempts are used up
///
/// `op` receives the 1-based attempt number.
pub async fn retry_with_policy<T, F, Fut>(policy: &RetryPolicy, op: F) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PlatformResult<T>>,
{
    retry_when(policy, op, PlatformError::is_retryable, |_, _, _| {}).await
}

/// Like [`retry_with_policy`] with a custom retry predicate and a hook
/// invoked before each backoff sleep
pub async fn retry_when<T, F, Fut, P, R>(
    policy: &RetryPolicy,
    mut op: F,
    should_retry: P,
    mut on_retry: R,
) -> RetryOutcome<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PlatformResult<T>>,
    P: Fn(&PlatformError) -> bool,
    R: FnMut(u32, &PlatformError, Duration),
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        let error = match op(attempt).await {
            Ok(value) => {
                return RetryOutcome {
                    result: Ok(value),
                    attempts: attempt,
                }
            }
            Err(e) => e,
        };

        if attempt >= max_attempts || !should_retry(&error) {
            return RetryOutcome {
                result: Err(error),
                attempts: attempt,
            };
        }

        let mut delay = policy.delay_for(attempt);
        if let Some(hint) = error.retry_after {
            if hint > policy.max_delay {
                warn!(
                    attempt,
                    retry_after_secs = hint.as_secs(),
                    "Platform asked to wait longer than allowed, giving up for now"
                );
                return RetryOutcome {
                    result: Err(error),
                    attempts: attempt,
                };
            }
            delay = delay.max(hint);
        }

        on_retry(attempt, &error, delay);
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::exponential(max_attempts, Duration::from_millis(1))
    }

    #[test]
    fn test_exponential_delays() {
        let policy = RetryPolicy::exponential(3, Duration::from_secs(1));
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
    }

    #[test]
    fn test_linear_delays() {
        let policy = RetryPolicy::linear(3, Duration::from_secs(2));
        assert_eq!(policy.delay_for(1), Duration::from_secs(2));
        assert_eq!(policy.delay_for(2), Duration::from_secs(4));
        assert_eq!(policy.delay_for(3), Duration::from_secs(6));
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let outcome = retry_with_policy(&fast(3), |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err(PlatformError::transient("502 Bad Gateway"))
                } else {
                    Ok("id-1")
                }
            }
        })
        .await;

        assert_eq!(outcome.result.unwrap(), "id-1");
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_stops_at_max_attempts() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = retry_with_policy(&fast(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PlatformError::rate_limited("429")) }
        })
        .await;

        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::RateLimited);
        assert_eq!(outcome.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_no_retry_after_permanent_error() {
        let calls = AtomicU32::new(0);
        let outcome: RetryOutcome<()> = retry_with_policy(&fast(3), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(PlatformError::new(ErrorKind::DuplicatePost, "status is a duplicate")) }
        })
        .await;

        assert_eq!(outcome.result.unwrap_err().kind, ErrorKind::DuplicatePost);
        assert_eq!(outcome.attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_long_retry_after_gives_up_early() {
        let policy = fast(3).with_max_delay(Duration::from_secs(1));
        let outcome: RetryOutcome<()> = retry_with_policy(&policy, |_| async {
            Err(PlatformError::rate_limited("429")
                .with_retry_after(Some(Duration::from_secs(900))))
        })
        .await;

        assert_eq!(outcome.attempts, 1);
        assert!(outcome.result.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn test_custom_predicate_and_hook() {
        let mut retries = Vec::new();
        let outcome: RetryOutcome<()> = retry_when(
            &fast(3),
            |_| async { Err(PlatformError::new(ErrorKind::InvalidCredentials, "401")) },
            |e| e.kind == ErrorKind::InvalidCredentials,
            |attempt, _, delay| retries.push((attempt, delay)),
        )
        .await;

        assert_eq!(outcome.attempts, 3);
        assert_eq!(
            retries,
            vec![(1, Duration::from_millis(1)), (2, Duration::from_millis(2))]
        );
    }
}
