//! Generic resilience primitives.
//!
//! - [`with_retry`] / [`with_retry_if`]: bounded attempts with exponential
//!   backoff, down-jitter and a retry predicate
//! - [`with_timeout`]: race an operation against a deadline
//! - [`RecoveryNotice`]: user-facing description of a failure
//!
//! None of these know anything about sessions; the store layer decides
//! which failures are worth retrying.

mod notice;
mod retry;
mod timeout;

pub use notice::{ActionVariant, NoticeAction, NoticeSeverity, RecoveryNotice};
pub use retry::{with_retry, with_retry_if, RetryError, RetryOptions};
pub use timeout::{with_timeout, with_timeout_detached, TimeoutError, TimeoutOptions};
