//! # Hypothesis Session Engine
//!
//! Persistence and bookkeeping for guided hypothesis-testing sessions: a
//! researcher states candidate explanations, designs discriminating tests,
//! records evidence, and retires hypotheses the evidence rules out.
//!
//! ## Features
//!
//! - **Versioned session records**: one JSON record per session in a shared
//!   key-value namespace, validated on every load and save
//! - **Corruption recovery**: a damaged record triggers a read-only scan of
//!   the namespace for a usable copy
//! - **Evidence ledger**: append-only evidence per hypothesis version with a
//!   pluggable confidence update policy
//! - **Test queue**: FIFO of designed tests, pending versus consumed
//! - **Resilience primitives**: retry with capped exponential backoff and
//!   jitter, deadline guard, and user-facing recovery notices
//!
//! ## Architecture
//!
//! ```text
//! SessionEngine → Ledger / TestQueue (in-memory mutation)
//!       ↓
//! SessionStore (retry + timeout, backup, recovery scan)
//!       ↓
//! KeyValueStore (SQLite | memory)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use hypothesis_session_engine::{SessionEngine, SessionStore};
//! use hypothesis_session_engine::session::ConfidencePercent;
//! use hypothesis_session_engine::storage::MemoryStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = SessionEngine::new(SessionStore::new(MemoryStore::new()));
//!     engine.open_session("latency-spike").await?;
//!     engine
//!         .add_hypothesis("latency-spike", "H1", "The cache is cold", ConfidencePercent::EVEN)
//!         .await?;
//!     engine.set_primary("latency-spike", "H1").await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Operator command-line interface.
pub mod cli;
/// Configuration management loaded from the environment.
pub mod config;
/// Session engine composing the store, ledger and queue.
pub mod engine;
/// Error types and result aliases for the application.
pub mod error;
/// Hypothesis and evidence ledger with confidence policies.
pub mod ledger;
/// FIFO queue of designed tests.
pub mod queue;
/// Retry, timeout and recovery notice primitives.
pub mod resilience;
/// Session records, persistence and recovery.
pub mod session;
/// Key-value storage backends.
pub mod storage;

pub use config::Config;
pub use engine::{OpenedSession, SessionEngine};
pub use error::{AppError, AppResult};
pub use session::{LoadOutcome, Session, SessionStore};
