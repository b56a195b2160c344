//! Recovery scan over a session namespace.
//!
//! When a session's primary record fails to load, every record under the
//! namespace is examined in key order and the first one that parses,
//! validates and belongs to the requested session is taken as the
//! recovered state. The scan never writes or deletes anything.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{debug, info, warn};

use super::model::Session;
use super::store::SessionStore;
use crate::error::StorageResult;
use crate::resilience::RecoveryNotice;
use crate::storage::KeyValueStore;

/// Result of a recovery scan.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryOutcome {
    /// Whether a usable record was found.
    pub recovered: bool,
    /// The recovered session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Session>,
    /// Key the recovered record was read from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_key: Option<String>,
    /// What to tell the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<RecoveryNotice>,
}

/// Health of one record in the namespace.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordHealth {
    /// Storage key of the record.
    pub key: String,
    /// Session id, when the payload is at least readable JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Whether the record is usable.
    #[serde(flatten)]
    pub status: RecordStatus,
}

/// Record status reported by [`RecoveryScanner::audit`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RecordStatus {
    /// Parsed and validated.
    Valid,
    /// Present but unusable.
    Invalid { reason: String },
    /// The backend failed to return the value.
    Unreadable { reason: String },
    /// Listed by `keys` but gone by the time it was read.
    Missing,
}

impl RecordHealth {
    /// Whether the record can be loaded.
    pub fn is_valid(&self) -> bool {
        self.status == RecordStatus::Valid
    }
}

/// Read-only scanner over a [`SessionStore`] namespace.
pub struct RecoveryScanner<'a, S> {
    store: &'a SessionStore<S>,
}

impl<'a, S: KeyValueStore> RecoveryScanner<'a, S> {
    /// Create a scanner over the store's namespace.
    pub fn new(store: &'a SessionStore<S>) -> Self {
        Self { store }
    }

    /// Look for a usable copy of `session_id` anywhere in the namespace.
    ///
    /// `reason` describes why the primary record was rejected and ends up in
    /// the notice detail when nothing usable is found. Listing failures are
    /// returned; a failed read of a single key is logged and skipped.
    pub async fn recover(&self, session_id: &str, reason: &str) -> StorageResult<RecoveryOutcome> {
        let keys = self.store.list_keys().await?;
        debug!(session_id = %session_id, candidates = keys.len(), "Scanning namespace");

        let mut intact_others = BTreeSet::new();

        for key in keys {
            let Some(session) = self.read_valid(&key).await else {
                continue;
            };

            if session.id == session_id {
                info!(
                    session_id = %session_id,
                    source_key = %key,
                    version = session.version,
                    "Session recovered from alternate record"
                );
                let notice = RecoveryNotice::session_recovered(session_id, &key);
                return Ok(RecoveryOutcome {
                    recovered: true,
                    data: Some(session),
                    source_key: Some(key),
                    notice: Some(notice),
                });
            }

            intact_others.insert(session.id);
        }

        warn!(
            session_id = %session_id,
            intact_sessions = intact_others.len(),
            reason = %reason,
            "No usable record found for session"
        );

        Ok(RecoveryOutcome {
            recovered: false,
            data: None,
            source_key: None,
            notice: Some(RecoveryNotice::session_unrecoverable(
                session_id,
                reason,
                intact_others.len(),
            )),
        })
    }

    /// Report the health of every record in the namespace, in key order.
    pub async fn audit(&self) -> StorageResult<Vec<RecordHealth>> {
        let keys = self.store.list_keys().await?;
        let mut report = Vec::with_capacity(keys.len());

        for key in keys {
            let health = match self.store.read(&key).await {
                Ok(Some(raw)) => match Session::from_record(&raw) {
                    Ok(session) => RecordHealth {
                        key,
                        session_id: Some(session.id),
                        status: RecordStatus::Valid,
                    },
                    Err(e) => RecordHealth {
                        session_id: loose_session_id(&raw),
                        key,
                        status: RecordStatus::Invalid {
                            reason: e.to_string(),
                        },
                    },
                },
                Ok(None) => RecordHealth {
                    key,
                    session_id: None,
                    status: RecordStatus::Missing,
                },
                Err(e) => RecordHealth {
                    key,
                    session_id: None,
                    status: RecordStatus::Unreadable {
                        reason: e.to_string(),
                    },
                },
            };
            report.push(health);
        }

        Ok(report)
    }

    async fn read_valid(&self, key: &str) -> Option<Session> {
        match self.store.read(key).await {
            Ok(Some(raw)) => match Session::from_record(&raw) {
                Ok(session) => Some(session),
                Err(e) => {
                    debug!(key = %key, error = %e, "Skipping invalid record");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "Skipping unreadable record");
                None
            }
        }
    }
}

/// Best-effort session id from a record that failed validation.
fn loose_session_id(raw: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(raw)
        .ok()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}
