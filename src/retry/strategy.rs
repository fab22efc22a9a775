// src/retry/strategy.rs

use crate::config::ProbeConfig;
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

/// Growing per-attempt timeouts with linear backoff between attempts.
///
/// Attempt `i` (0-indexed) runs under `base_timeout * (i + 1)`; after a failed
/// attempt the strategy sleeps `backoff_step * (i + 1)` before the next one.
#[derive(Debug, Clone)]
pub struct RetryStrategy {
    max_retries: u32,
    base_timeout: Duration,
    backoff_step: Duration,
}

/// Which attempt is running and how long it may take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptContext {
    pub attempt: u32,
    pub timeout: Duration,
}

impl AttemptContext {
    /// 1-based attempt number, as reported in diagnostics.
    pub fn number(&self) -> u32 {
        self.attempt + 1
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttemptError<E: fmt::Display> {
    #[error("request timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("{0}")]
    Failed(E),
}

#[derive(Debug, thiserror::Error)]
#[error("Maximum retry attempts ({attempts}) exceeded: {last_error}")]
pub struct RetriesExhausted<E: fmt::Display> {
    pub attempts: u32,
    pub last_timeout: Duration,
    pub last_error: AttemptError<E>,
}

impl RetryStrategy {
    pub fn new(max_retries: u32, base_timeout: Duration, backoff_step: Duration) -> Self {
        Self {
            max_retries,
            base_timeout,
            backoff_step,
        }
    }

    pub fn from_config(config: &ProbeConfig) -> Self {
        Self::new(config.max_retries, config.base_timeout(), config.backoff_step())
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    pub fn timeout_for(&self, attempt: u32) -> Duration {
        self.base_timeout.saturating_mul(attempt + 1)
    }

    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt + 1)
    }

    /// Upper bound on wall time spent inside [`execute`](Self::execute),
    /// excluding scheduling overhead.
    pub fn worst_case(&self) -> Duration {
        (0..self.max_attempts()).fold(Duration::ZERO, |total, attempt| {
            let backoff = if attempt < self.max_retries {
                self.backoff_for(attempt)
            } else {
                Duration::ZERO
            };
            total + self.timeout_for(attempt) + backoff
        })
    }

    /// Runs `f` until it succeeds or attempts run out. Each attempt is bound
    /// to its own timeout; dropping the returned future cancels the attempt
    /// in flight.
    pub async fn execute<F, Fut, T, E>(
        &self,
        mut f: F,
    ) -> Result<(T, AttemptContext), RetriesExhausted<E>>
    where
        F: FnMut(AttemptContext) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: fmt::Display,
    {
        let mut attempt = 0;

        loop {
            let context = AttemptContext {
                attempt,
                timeout: self.timeout_for(attempt),
            };

            let error = match timeout(context.timeout, f(context)).await {
                Ok(Ok(value)) => return Ok((value, context)),
                Ok(Err(e)) => AttemptError::Failed(e),
                Err(_) => AttemptError::TimedOut(context.timeout),
            };

            if attempt >= self.max_retries {
                warn!(
                    "Retry failed after {} attempts: {}",
                    context.number(),
                    error
                );
                return Err(RetriesExhausted {
                    attempts: context.number(),
                    last_timeout: context.timeout,
                    last_error: error,
                });
            }

            let backoff = self.backoff_for(attempt);
            debug!(
                "Attempt {} failed: {}. Retrying in {:?}",
                context.number(),
                error,
                backoff
            );
            sleep(backoff).await;
            attempt += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn strategy() -> RetryStrategy {
        RetryStrategy::new(2, Duration::from_millis(50), Duration::from_millis(10))
    }

    #[test]
    fn schedule_grows_linearly() {
        let strategy = RetryStrategy::new(2, Duration::from_millis(5000), Duration::from_millis(1000));
        assert_eq!(strategy.max_attempts(), 3);
        assert_eq!(strategy.timeout_for(0), Duration::from_secs(5));
        assert_eq!(strategy.timeout_for(1), Duration::from_secs(10));
        assert_eq!(strategy.timeout_for(2), Duration::from_secs(15));
        assert_eq!(strategy.backoff_for(0), Duration::from_secs(1));
        assert_eq!(strategy.backoff_for(1), Duration::from_secs(2));
        // 5 + 10 + 15 seconds of attempts, 1 + 2 seconds of backoff
        assert_eq!(strategy.worst_case(), Duration::from_secs(33));
    }

    #[tokio::test]
    async fn test_retry_success_after_failures() {
        let counter = AtomicU32::new(0);

        let result = strategy()
            .execute(|_| async {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err("Temporary failure")
                } else {
                    Ok("Success")
                }
            })
            .await;

        let (value, context) = result.unwrap();
        assert_eq!(value, "Success");
        assert_eq!(context.number(), 3);
        assert_eq!(context.timeout, Duration::from_millis(150));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_max_attempts() {
        let counter = AtomicU32::new(0);

        let result: Result<((), AttemptContext), _> = strategy()
            .execute(|_| async {
                counter.fetch_add(1, Ordering::SeqCst);
                Err("Always fails")
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_error.to_string(), "Always fails");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_attempt_timeouts_are_reported() {
        let result: Result<((), AttemptContext), RetriesExhausted<&str>> = strategy()
            .execute(|context| async move {
                sleep(context.timeout * 2).await;
                Ok(())
            })
            .await;

        let exhausted = result.unwrap_err();
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.last_timeout, Duration::from_millis(150));
        assert!(matches!(exhausted.last_error, AttemptError::TimedOut(_)));
        assert_eq!(
            exhausted.last_error.to_string(),
            "request timed out after 150ms"
        );
    }
}
