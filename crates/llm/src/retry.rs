//! Bounded exponential backoff with full jitter.
//!
//! Wraps provider invocations. Classification lives on [`LlmError`]: only
//! transient classes are re-attempted, everything else surfaces on the
//! first failure. Streaming callers wrap stream establishment only; once a
//! chunk has been delivered, mid-stream errors are surfaced in-band.

use std::future::Future;
use std::time::Duration;

use rand::Rng as _;

use crate::error::{LlmError, LlmResult};

/// Retry policy derived from `[llm.retry]`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    wait_min: Duration,
    wait_max: Duration,
}

impl RetryPolicy {
    pub fn new(config: &config::RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            wait_min: config.wait_min,
            wait_max: config.wait_max,
        }
    }

    /// Runs `op` until it succeeds, fails terminally, or attempts run out.
    ///
    /// The sleep before attempt `n` is drawn uniformly from
    /// `[0, min(wait_max, wait_min * 2^(n-1))]` — full jitter, so
    /// concurrent retries against a struggling upstream spread out instead
    /// of stampeding.
    pub async fn run<T, F, Fut>(&self, operation_name: &str, mut op: F) -> LlmResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = LlmResult<T>> + Send,
    {
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match op().await {
                Ok(value) => return Ok(value),
                Err(error) if error.is_transient() && attempt < self.max_attempts => {
                    let wait = self.jittered_wait(attempt);

                    log::debug!(
                        "{operation_name} failed transiently (attempt {attempt}/{}), retrying in {wait:?}: {error}",
                        self.max_attempts
                    );

                    tokio::time::sleep(wait).await;
                }
                Err(error) => return Err(error),
            }
        }
    }

    fn jittered_wait(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let cap = self
            .wait_min
            .saturating_mul(1u32 << exponent)
            .min(self.wait_max)
            .max(Duration::from_millis(1));

        let cap_millis = u64::try_from(cap.as_millis()).unwrap_or(u64::MAX);
        Duration::from_millis(rand::rng().random_range(0..=cap_millis))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            wait_min: Duration::from_millis(1),
            wait_max: Duration::from_millis(2),
        }
    }

    #[tokio::test]
    async fn non_transient_errors_are_never_retried() {
        let calls = AtomicU32::new(0);

        let result: LlmResult<()> = policy(5)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::Validation("bad input".to_string())) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transient_errors_retry_until_success() {
        let calls = AtomicU32::new(0);

        let result = policy(5)
            .run("test", || {
                let attempt = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if attempt < 3 {
                        Err(LlmError::ServiceUnavailable("flaky".to_string()))
                    } else {
                        Ok(attempt)
                    }
                }
            })
            .await;

        assert_eq!(result.expect("eventually succeeds"), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn attempts_are_bounded() {
        let calls = AtomicU32::new(0);

        let result: LlmResult<()> = policy(3)
            .run("test", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LlmError::RateLimited("throttled".to_string())) }
            })
            .await;

        assert!(matches!(result, Err(LlmError::RateLimited(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn jitter_stays_within_the_exponential_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            wait_min: Duration::from_millis(100),
            wait_max: Duration::from_millis(350),
        };

        for attempt in 1..=5 {
            for _ in 0..50 {
                let wait = policy.jittered_wait(attempt);
                let cap = Duration::from_millis(100)
                    .saturating_mul(1 << (attempt - 1))
                    .min(Duration::from_millis(350));
                assert!(wait <= cap, "attempt {attempt}: {wait:?} exceeds {cap:?}");
            }
        }
    }
}
