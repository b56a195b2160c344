//! Test queue: designed tests waiting to be executed.
//!
//! Tests leave the queue strictly in enqueue order. The queue does not
//! reorder by discriminative power; choosing what to run first belongs to
//! the caller. A dequeued test moves to the consumed list and is expected
//! to be followed by a `record_evidence` call.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{LedgerError, LedgerResult};
use crate::session::TestDesign;

/// A test held by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedTest {
    /// The designed test.
    pub test: TestDesign,
    /// Hypothesis version the test was designed against, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hypothesis_version: Option<String>,
    /// When the test entered the queue.
    pub enqueued_at: DateTime<Utc>,
    /// When the test was taken for execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consumed_at: Option<DateTime<Utc>>,
}

/// FIFO of pending tests plus the history of consumed ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestQueue {
    #[serde(default)]
    pending: VecDeque<QueuedTest>,
    #[serde(default)]
    consumed: Vec<QueuedTest>,
}

impl TestQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a test to the back of the queue, returning its id.
    pub fn enqueue(&mut self, test: TestDesign) -> LedgerResult<String> {
        self.push(test, None)
    }

    /// Append a test designed against a specific hypothesis version.
    pub fn enqueue_for(
        &mut self,
        test: TestDesign,
        hypothesis_version: impl Into<String>,
    ) -> LedgerResult<String> {
        self.push(test, Some(hypothesis_version.into()))
    }

    fn push(
        &mut self,
        test: TestDesign,
        hypothesis_version: Option<String>,
    ) -> LedgerResult<String> {
        if test.description.trim().is_empty() {
            return Err(LedgerError::validation("description", "cannot be empty"));
        }
        if self.contains(&test.id) {
            return Err(LedgerError::validation(
                "test_id",
                format!("test {} is already queued or consumed", test.id),
            ));
        }

        let id = test.id.clone();
        debug!(test_id = %id, pending = self.pending.len() + 1, "Test enqueued");
        self.pending.push_back(QueuedTest {
            test,
            hypothesis_version,
            enqueued_at: Utc::now(),
            consumed_at: None,
        });

        Ok(id)
    }

    /// Take the oldest pending test for execution.
    pub fn dequeue(&mut self) -> Option<QueuedTest> {
        let mut next = self.pending.pop_front()?;
        next.consumed_at = Some(Utc::now());
        debug!(test_id = %next.test.id, remaining = self.pending.len(), "Test dequeued");
        self.consumed.push(next.clone());
        Some(next)
    }

    /// The oldest pending test, without consuming it.
    pub fn peek(&self) -> Option<&QueuedTest> {
        self.pending.front()
    }

    /// Pending tests, oldest first.
    pub fn pending(&self) -> impl Iterator<Item = &QueuedTest> {
        self.pending.iter()
    }

    /// Consumed tests, in consumption order.
    pub fn consumed(&self) -> &[QueuedTest] {
        &self.consumed
    }

    /// Whether a test id is pending or consumed.
    pub fn contains(&self, test_id: &str) -> bool {
        self.pending.iter().any(|q| q.test.id == test_id)
            || self.consumed.iter().any(|q| q.test.id == test_id)
    }

    /// Number of pending tests.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
