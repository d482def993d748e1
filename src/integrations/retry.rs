//! Bounded retry for external provider calls
//!
//! Transient failures (connect errors, 5xx, 429, storage conflicts) are
//! retried a fixed number of times with capped exponential backoff. Nothing
//! here loops without a bound.
//!
//! Calls that are unsafe to repeat, such as a POST that creates an item, go
//! through [`with_retry_non_idempotent`], which only retries failures that
//! prove the request never reached the provider.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff settings for one class of call
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,

    pub initial_backoff: Duration,

    pub max_backoff: Duration,

    pub multiplier: f64,

    /// Spread concurrent retries apart by up to a quarter of the backoff
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(5),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// Default backoff with a configured attempt budget
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// No retries at all
    pub fn none() -> Self {
        Self::with_max_retries(0)
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_backoff.as_secs_f64());

        let secs = if self.jitter {
            capped * (1.0 + jitter_fraction() * 0.25)
        } else {
            capped
        };
        Duration::from_secs_f64(secs)
    }

    /// Longest total backoff a call can spend between its attempts
    pub fn max_total_backoff(&self) -> Duration {
        let jitter = if self.jitter { 1.25 } else { 1.0 };
        (0..self.max_retries)
            .map(|attempt| {
                let base =
                    self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
                Duration::from_secs_f64(base.min(self.max_backoff.as_secs_f64()) * jitter)
            })
            .sum()
    }

    /// Per-attempt timeout that fits every attempt and its backoff inside
    /// `budget`. None when the backoff alone uses up the budget.
    pub fn attempt_timeout(&self, budget: Duration) -> Option<Duration> {
        let remaining = budget.checked_sub(self.max_total_backoff())?;
        let per_attempt = remaining / (self.max_retries + 1);
        (!per_attempt.is_zero()).then_some(per_attempt)
    }
}

/// Uniform value in [0, 1) taken from a random v4 uuid
fn jitter_fraction() -> f64 {
    let bits = uuid::Uuid::new_v4().as_u128() as u64;
    (bits % 10_000) as f64 / 10_000.0
}

/// How a failed call should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retry, waiting at least this long (e.g. a provider's Retry-After)
    RetryAfter(Duration),
    NoRetry,
}

/// Errors that know whether they are transient
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;

    /// Decision for a call that must not run twice once the provider may
    /// have acted on it. Only failures that prove the request was never
    /// delivered should be retried.
    fn non_idempotent_retry_decision(&self) -> RetryDecision {
        RetryDecision::NoRetry
    }
}

/// Run `operation` until it succeeds, fails permanently, or the retry
/// budget is spent. The last error is returned.
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    retry_loop(config, operation_name, operation, E::retry_decision).await
}

/// [`with_retry`] for operations that must not be repeated after the
/// provider may have applied them
pub async fn with_retry_non_idempotent<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    retry_loop(
        config,
        operation_name,
        operation,
        E::non_idempotent_retry_decision,
    )
    .await
}

async fn retry_loop<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
    decide: fn(&E) -> RetryDecision,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let delay = match decide(&err) {
            RetryDecision::NoRetry => {
                debug!(operation = operation_name, attempt, error = %err, "Permanent failure");
                return Err(err);
            }
            _ if attempt >= config.max_retries => {
                warn!(
                    operation = operation_name,
                    attempts = attempt + 1,
                    error = %err,
                    "Giving up after retries"
                );
                return Err(err);
            }
            RetryDecision::RetryAfter(d) => d.min(config.max_backoff),
            RetryDecision::Retry => config.backoff_duration(attempt),
        };

        warn!(
            operation = operation_name,
            attempt = attempt + 1,
            max_attempts = config.max_retries + 1,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "Transient failure, retrying"
        );
        crate::metrics::record_external_retry(operation_name);

        sleep(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_millis(500),
            jitter: false,
            ..Default::default()
        };
        assert_eq!(config.backoff_duration(0), Duration::from_millis(100));
        assert_eq!(config.backoff_duration(2), Duration::from_millis(400));
        assert_eq!(config.backoff_duration(5), Duration::from_millis(500));
    }

    #[test]
    fn test_jitter_stays_within_a_quarter() {
        let config = RetryConfig {
            initial_backoff: Duration::from_millis(100),
            ..Default::default()
        };
        let d = config.backoff_duration(0);
        assert!(d >= Duration::from_millis(100));
        assert!(d <= Duration::from_millis(125));
    }

    #[test]
    fn test_attempt_timeout_fits_budget() {
        let config = RetryConfig::with_max_retries(2);
        let backoff = config.max_total_backoff();
        assert_eq!(backoff, Duration::from_secs_f64(0.25 * 1.25 + 0.5 * 1.25));

        let per_attempt = config.attempt_timeout(Duration::from_secs(10)).unwrap();
        assert!(per_attempt * 3 + backoff <= Duration::from_secs(10));
        assert!(config.attempt_timeout(Duration::from_millis(500)).is_none());
        assert_eq!(
            RetryConfig::none().attempt_timeout(Duration::from_secs(4)),
            Some(Duration::from_secs(4))
        );
    }

    #[derive(Debug)]
    struct Flaky(RetryDecision);

    impl std::fmt::Display for Flaky {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "flaky({:?})", self.0)
        }
    }

    impl RetryableError for Flaky {
        fn retry_decision(&self) -> RetryDecision {
            self.0
        }
    }

    /// Timed out after the request went out: safe to resend only if idempotent
    #[derive(Debug)]
    struct LostResponse;

    impl std::fmt::Display for LostResponse {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "response lost")
        }
    }

    impl RetryableError for LostResponse {
        fn retry_decision(&self) -> RetryDecision {
            RetryDecision::Retry
        }
    }

    fn fast(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_backoff: Duration::from_millis(1),
            jitter: false,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_transient_failures() {
        let calls = AtomicU32::new(0);
        let result: Result<u32, Flaky> = with_retry(&fast(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err(Flaky(RetryDecision::Retry))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_budget_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_retry(&fast(2), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(RetryDecision::RetryAfter(Duration::from_millis(1)))) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), Flaky> = with_retry(&fast(5), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Flaky(RetryDecision::NoRetry)) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_idempotent_call_is_sent_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LostResponse> =
            with_retry_non_idempotent(&fast(3), "test.create", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(LostResponse) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let resent: Result<(), LostResponse> = with_retry(&fast(3), "test.update", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LostResponse) }
        })
        .await;
        assert!(resent.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }
}
