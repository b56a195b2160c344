//! Deadline racing for async operations.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::warn;

const DEFAULT_TIMEOUT_MESSAGE: &str = "Operation timed out";

/// Timeout configuration accepted by callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeoutOptions {
    /// Deadline in milliseconds.
    pub timeout_ms: u64,
    /// Message carried by the timeout error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_message: Option<String>,
}

impl TimeoutOptions {
    /// Create options with the given deadline.
    pub fn new(timeout_ms: u64) -> Self {
        Self {
            timeout_ms,
            timeout_message: None,
        }
    }

    /// Set the message used when the deadline elapses.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.timeout_message = Some(message.into());
        self
    }

    /// Deadline as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    fn error(&self) -> TimeoutError {
        TimeoutError {
            timeout_ms: self.timeout_ms,
            message: self
                .timeout_message
                .clone()
                .unwrap_or_else(|| DEFAULT_TIMEOUT_MESSAGE.to_string()),
        }
    }
}

impl Default for TimeoutOptions {
    fn default() -> Self {
        Self::new(5000)
    }
}

/// The deadline elapsed before the operation settled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} (after {timeout_ms}ms)")]
pub struct TimeoutError {
    /// Deadline that elapsed.
    pub timeout_ms: u64,
    /// Caller-supplied or default message.
    pub message: String,
}

/// Race `operation` against the deadline.
///
/// The operation's own output (including its own errors) is returned
/// untouched inside `Ok`; only the deadline produces `Err`. The timer is
/// dropped with the race, whichever side wins. On timeout the operation
/// future is dropped; use [`with_timeout_detached`] to keep the work
/// running after the caller stops waiting.
pub async fn with_timeout<F>(
    options: &TimeoutOptions,
    operation: F,
) -> Result<F::Output, TimeoutError>
where
    F: Future,
{
    match tokio::time::timeout(options.duration(), operation).await {
        Ok(output) => Ok(output),
        Err(_) => {
            let err = options.error();
            warn!(timeout_ms = options.timeout_ms, message = %err.message, "Operation timed out");
            Err(err)
        }
    }
}

/// Wait for a spawned task up to the deadline.
///
/// On timeout the join handle is dropped, which detaches the task: it keeps
/// running, the caller just stops waiting for it.
pub async fn with_timeout_detached<T>(
    options: &TimeoutOptions,
    handle: JoinHandle<T>,
) -> Result<Result<T, JoinError>, TimeoutError>
where
    T: Send + 'static,
{
    with_timeout(options, handle).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test(start_paused = true)]
    async fn test_never_settling_operation_times_out() {
        let options = TimeoutOptions::new(250);
        let start = tokio::time::Instant::now();

        let result = with_timeout(&options, std::future::pending::<u32>()).await;

        let err = result.unwrap_err();
        assert_eq!(err.timeout_ms, 250);
        assert_eq!(err.message, "Operation timed out");
        assert!(start.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test(start_paused = true)]
    async fn test_fast_operation_resolves() {
        let options = TimeoutOptions::new(1000);

        let result = with_timeout(&options, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            42
        })
        .await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test(start_paused = true)]
    async fn test_operation_error_is_not_a_timeout() {
        let options = TimeoutOptions::new(1000);

        let result = with_timeout(&options, async { Err::<u32, _>("disk on fire") }).await;

        assert_eq!(result.unwrap(), Err("disk on fire"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_message() {
        let options = TimeoutOptions::new(5).with_message("Session load timed out");

        let err = with_timeout(&options, std::future::pending::<()>())
            .await
            .unwrap_err();

        assert_eq!(err.message, "Session load timed out");
        assert_eq!(err.to_string(), "Session load timed out (after 5ms)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_task_keeps_running() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(500)).await;
            flag.store(true, Ordering::SeqCst);
        });

        let result = with_timeout_detached(&TimeoutOptions::new(100), handle).await;
        assert!(result.is_err());
        assert!(!finished.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_options_serde() {
        let options: TimeoutOptions = serde_json::from_str(r#"{"timeoutMs":1500}"#).unwrap();
        assert_eq!(options.timeout_ms, 1500);
        assert!(options.timeout_message.is_none());

        let json = serde_json::to_value(TimeoutOptions::new(10).with_message("slow")).unwrap();
        assert_eq!(json["timeoutMessage"], "slow");
    }
}
