//! Bounded retry with exponential backoff and down-jitter.
//!
//! The supervisor is generic over the operation's error type. It only needs
//! `Display` to log the failure, so plain strings and other non-`Error`
//! values are captured and wrapped like any other failure.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Retry configuration accepted by callers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryOptions {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry, in milliseconds.
    pub base_delay_ms: u64,
    /// Upper bound for any single delay, in milliseconds.
    pub max_delay_ms: u64,
    /// Down-jitter ratio in `[0, 1]` (0.25 = up to 25% shorter delays).
    pub jitter_ratio: f64,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter_ratio: 0.25,
        }
    }
}

impl RetryOptions {
    /// Create options with the given attempt budget and default delays.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the delay cap.
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay_ms = delay.as_millis() as u64;
        self
    }

    /// Set the jitter ratio (clamped to `[0, 1]`).
    pub fn with_jitter(mut self, ratio: f64) -> Self {
        self.jitter_ratio = ratio.clamp(0.0, 1.0);
        self
    }

    /// Exponential backoff ceiling before retry number `retry` (1-based),
    /// without jitter.
    pub fn backoff_ceiling(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let ms = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(ms)
    }

    /// Jittered delay before retry number `retry` (1-based).
    ///
    /// The ceiling is multiplied by a factor drawn from
    /// `[1 - jitter_ratio, 1.0]`, so the result never exceeds the cap.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let ceiling = self.backoff_ceiling(retry);
        let ratio = if self.jitter_ratio.is_finite() {
            self.jitter_ratio.clamp(0.0, 1.0)
        } else {
            0.0
        };
        if ratio == 0.0 {
            return ceiling;
        }
        let factor = 1.0 - rand::random::<f64>() * ratio;
        ceiling.mul_f64(factor.clamp(0.0, 1.0))
    }
}

/// Failure of a supervised operation.
#[derive(Debug, Error)]
pub enum RetryError<E> {
    /// Every attempt failed; carries the last failure.
    #[error("retry attempts exhausted after {attempts} attempt(s): {last}")]
    Exhausted {
        /// Number of attempts made.
        attempts: u32,
        /// Failure returned by the final attempt.
        last: E,
    },
    /// The retry predicate refused to retry this failure.
    #[error("non-retryable failure on attempt {attempt}: {error}")]
    Rejected {
        /// Attempt on which the failure occurred.
        attempt: u32,
        /// The failure that was not retried.
        error: E,
    },
}

impl<E> RetryError<E> {
    /// Number of attempts made before giving up.
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } => *attempts,
            RetryError::Rejected { attempt, .. } => *attempt,
        }
    }

    /// Whether the attempt budget ran out.
    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }

    /// Borrow the underlying failure.
    pub fn inner(&self) -> &E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected { error, .. } => error,
        }
    }

    /// Take the underlying failure.
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { last, .. } => last,
            RetryError::Rejected { error, .. } => error,
        }
    }
}

/// Run `operation` until it succeeds or the attempt budget runs out,
/// retrying every failure.
pub async fn with_retry<T, E, F, Fut>(
    options: &RetryOptions,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    with_retry_if(options, |_: &E| true, operation).await
}

/// Run `operation` until it succeeds, the attempt budget runs out, or
/// `should_retry` rejects a failure.
///
/// A `max_attempts` of zero is treated as one attempt.
pub async fn with_retry_if<T, E, F, Fut, P>(
    options: &RetryOptions,
    mut should_retry: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E) -> bool,
    E: fmt::Display,
{
    let max_attempts = options.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        attempt += 1;

        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(attempt, "Operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(error) => {
                if !should_retry(&error) {
                    debug!(attempt, error = %error, "Failure is not retryable");
                    return Err(RetryError::Rejected { attempt, error });
                }

                if attempt >= max_attempts {
                    warn!(attempts = attempt, error = %error, "Retry attempts exhausted");
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: error,
                    });
                }

                let delay = options.delay_for(attempt);
                warn!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast_options(max_attempts: u32) -> RetryOptions {
        RetryOptions::new(max_attempts)
            .with_base_delay(Duration::from_millis(10))
            .with_max_delay(Duration::from_millis(40))
            .with_jitter(0.5)
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_after_transient_failures() {
        for failures in 0..4u32 {
            let mut calls = 0u32;
            let result = with_retry(&fast_options(5), || {
                calls += 1;
                let call = calls;
                async move {
                    if call <= failures {
                        Err(format!("transient failure {}", call))
                    } else {
                        Ok(call)
                    }
                }
            })
            .await;

            assert_eq!(result.unwrap(), failures + 1);
            assert_eq!(calls, failures + 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_false_stops_after_one_attempt() {
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry_if(
            &fast_options(10),
            |_: &String| false,
            || {
                calls += 1;
                async { Err("logic bug".to_string()) }
            },
        )
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls, 1);
        assert!(!err.is_exhausted());
        assert_eq!(err.attempts(), 1);
        assert_eq!(err.inner(), "logic bug");
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_can_inspect_error() {
        let mut calls = 0u32;
        let result: Result<(), _> = with_retry_if(
            &fast_options(10),
            |e: &&str| *e == "busy",
            || {
                calls += 1;
                let call = calls;
                async move {
                    if call < 3 {
                        Err("busy")
                    } else {
                        Err("corrupt")
                    }
                }
            },
        )
        .await;

        assert_eq!(calls, 3);
        assert!(matches!(
            result,
            Err(RetryError::Rejected {
                attempt: 3,
                error: "corrupt"
            })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_wraps_plain_string() {
        let mut calls = 0u32;
        let result: Result<(), RetryError<&str>> = with_retry(&fast_options(3), || {
            calls += 1;
            async { Err("plain string thrown") }
        })
        .await;

        let err = result.unwrap_err();
        assert_eq!(calls, 3);
        assert!(err.is_exhausted());
        assert_eq!(err.attempts(), 3);
        let message = err.to_string();
        assert!(message.contains("exhausted"));
        assert!(message.contains("plain string thrown"));
        assert_eq!(err.into_inner(), "plain string thrown");
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_attempts_still_runs_once() {
        let mut calls = 0u32;
        let result: Result<(), RetryError<&str>> = with_retry(&fast_options(0), || {
            calls += 1;
            async { Err("nope") }
        })
        .await;

        assert_eq!(calls, 1);
        assert!(result.unwrap_err().is_exhausted());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_between_attempts() {
        let options = RetryOptions::new(3)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(1000))
            .with_jitter(0.0);
        let start = tokio::time::Instant::now();

        let result: Result<(), RetryError<&str>> =
            with_retry(&options, || async { Err("down") }).await;

        assert!(result.is_err());
        // 100ms before the second attempt, 200ms before the third.
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(310));
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let options = RetryOptions::new(10)
            .with_base_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(500));

        assert_eq!(options.backoff_ceiling(1), Duration::from_millis(100));
        assert_eq!(options.backoff_ceiling(2), Duration::from_millis(200));
        assert_eq!(options.backoff_ceiling(3), Duration::from_millis(400));
        assert_eq!(options.backoff_ceiling(4), Duration::from_millis(500));
        assert_eq!(options.backoff_ceiling(60), Duration::from_millis(500));
    }

    #[test]
    fn test_jittered_delay_within_bounds() {
        let options = RetryOptions::new(5)
            .with_base_delay(Duration::from_millis(1000))
            .with_max_delay(Duration::from_millis(1000))
            .with_jitter(0.25);

        for _ in 0..200 {
            let delay = options.delay_for(1);
            assert!(delay <= Duration::from_millis(1000));
            assert!(delay >= Duration::from_millis(749));
        }
    }

    #[test]
    fn test_jitter_clamped() {
        let options = RetryOptions::default().with_jitter(3.0);
        assert_eq!(options.jitter_ratio, 1.0);
        let options = RetryOptions::default().with_jitter(-1.0);
        assert_eq!(options.jitter_ratio, 0.0);
    }

    #[test]
    fn test_options_serde_camel_case() {
        let options: RetryOptions = serde_json::from_str(
            r#"{"maxAttempts":4,"baseDelayMs":50,"maxDelayMs":800,"jitterRatio":0.1}"#,
        )
        .unwrap();
        assert_eq!(options.max_attempts, 4);
        assert_eq!(options.base_delay_ms, 50);
        assert_eq!(options.max_delay_ms, 800);
        assert!((options.jitter_ratio - 0.1).abs() < f64::EPSILON);
    }
}
