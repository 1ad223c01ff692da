use std::{future::Future, time::Duration};

use tracing::warn;

use crate::embeddings::EmbedderError;

/// Bounded exponential backoff for embedding calls.
///
/// Only [transient](EmbedderError::is_transient) errors are retried; the
/// delay before retry `n` (1-based) is `base_delay * 2^(n-1)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(250))
    }
}

impl RetryPolicy {
    /// `max_attempts` counts the first call, values below 1 are raised to 1.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    #[must_use]
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1 << exponent)
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, EmbedderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, EmbedderError>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(attempt, max_attempts = self.max_attempts, ?delay, error = %e, "Transient embedding failure, retrying");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    #[test]
    fn delays_grow_exponentially() {
        let policy = RetryPolicy::new(3, Duration::from_millis(250));
        assert_eq!(policy.delay_for(1), Duration::from_millis(250));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(3), Duration::from_millis(1000));
        assert_eq!(RetryPolicy::new(0, Duration::ZERO).max_attempts(), 1);
    }

    #[tokio::test]
    async fn retries_transient_errors_up_to_the_bound() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EmbedderError::RateLimited("slow down".into()))
            })
            .await;
        assert_eq!(result, Err(EmbedderError::RateLimited("slow down".into())));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn recovers_after_transient_failure() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result = policy
            .run(move || async move {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(EmbedderError::Unavailable(503, String::new()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn permanent_errors_fail_immediately() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let calls = AtomicU32::new(0);
        let counter = &calls;
        let result: Result<(), _> = policy
            .run(move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(EmbedderError::Unauthorized(401, "bad key".into()))
            })
            .await;
        assert!(matches!(result, Err(EmbedderError::Unauthorized(..))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
