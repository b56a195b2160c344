//! Session records and their persistence.
//!
//! A [`Session`] is the root aggregate persisted as a single versioned JSON
//! record under `"{namespace}:{session_id}"`. [`SessionStore`] reads and
//! writes those records through a [`KeyValueStore`](crate::storage::KeyValueStore)
//! with retry and timeout applied to every call, and falls back to the
//! [`RecoveryScanner`] when a record fails validation.

mod model;
mod recovery;
mod store;
mod values;


pub use model::{
    EvidenceEntry, EvidenceResult, HypothesisCard, Phase, Session, TestDesign, TestResult,
    KEY_SEPARATOR, SCHEMA_VERSION,
};
pub use recovery::{RecordHealth, RecordStatus, RecoveryOutcome, RecoveryScanner};
pub use store::{LoadOutcome, SessionStore};
pub use values::{ConfidencePercent, DiscriminativePower};
