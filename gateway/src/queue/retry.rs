//! Exponential backoff for fallible broker operations.
//!
//! The delay calculation is a pure function so both the publisher's
//! reconnect loop and per-publish retries share one policy. Delays are
//! deterministic: min(initial × multiplier^(attempt−1), max).

use std::future::Future;
use std::time::Duration;

use tracing::warn;

/// Backoff policy for retrying a fallible async operation.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Retries after the initial attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_delay: Duration,
    /// Upper bound on any single delay
    pub max_delay: Duration,
    /// Growth factor per attempt, at least 1.0
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Errors that can tell the retry loop whether another attempt makes sense.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Delay before retry `attempt` (1-indexed).
///
/// Non-decreasing in `attempt` and bounded by `config.max_delay`.
pub fn delay_for_attempt(attempt: u32, config: &RetryConfig) -> Duration {
    debug_assert!(attempt >= 1, "attempts are 1-indexed");

    let exponent = attempt.saturating_sub(1).min(63);
    let scaled =
        config.initial_delay.as_secs_f64() * config.backoff_multiplier.max(1.0).powi(exponent as i32);

    if !scaled.is_finite() || scaled >= config.max_delay.as_secs_f64() {
        config.max_delay
    } else {
        Duration::from_secs_f64(scaled)
    }
}

/// Run `op`, retrying retryable failures with exponential backoff.
///
/// The initial attempt plus up to `max_retries` retries; the final failure
/// propagates unchanged. Non-retryable failures surface immediately.
pub async fn with_backoff<T, E, F, Fut>(config: &RetryConfig, mut op: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Retryable + std::fmt::Display,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt <= config.max_retries => {
                let delay = delay_for_attempt(attempt, config);
                warn!(
                    attempt = attempt,
                    max_retries = config.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "operation_retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl std::fmt::Display for TestError {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "test error")
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    fn config() -> RetryConfig {
        RetryConfig::default()
    }

    #[test]
    fn test_delay_progression() {
        let cfg = config();
        assert_eq!(delay_for_attempt(1, &cfg), Duration::from_secs(1));
        assert_eq!(delay_for_attempt(2, &cfg), Duration::from_secs(2));
        assert_eq!(delay_for_attempt(3, &cfg), Duration::from_secs(4));
        assert_eq!(delay_for_attempt(4, &cfg), Duration::from_secs(8));
        assert_eq!(delay_for_attempt(5, &cfg), Duration::from_secs(16));
        assert_eq!(delay_for_attempt(6, &cfg), Duration::from_secs(30));
    }

    #[test]
    fn test_delay_non_decreasing_and_capped() {
        let cfg = config();
        let mut previous = Duration::ZERO;
        for attempt in 1..=100 {
            let delay = delay_for_attempt(attempt, &cfg);
            assert!(delay >= previous, "delay must not decrease");
            assert!(delay <= cfg.max_delay, "delay must stay within max_delay");
            previous = delay;
        }
    }

    #[test]
    fn test_delay_with_unit_multiplier_is_constant() {
        let cfg = RetryConfig {
            backoff_multiplier: 1.0,
            ..config()
        };
        for attempt in 1..=10 {
            assert_eq!(delay_for_attempt(attempt, &cfg), cfg.initial_delay);
        }
    }

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test]
    async fn test_with_backoff_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_backoff(&fast_config(), || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(TestError { retryable: true })
            } else {
                Ok("done")
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_with_backoff_stops_on_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: Result<(), TestError> = with_backoff(&fast_config(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { retryable: false })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_with_backoff_exhausts_at_max_retries() {
        let calls = AtomicU32::new(0);
        let cfg = RetryConfig {
            max_retries: 2,
            ..fast_config()
        };
        let result: Result<(), TestError> = with_backoff(&cfg, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(TestError { retryable: true })
        })
        .await;

        assert!(result.is_err());
        // Initial attempt plus two retries
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
