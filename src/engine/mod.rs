//! Session engine: the operations upstream handlers call.
//!
//! Every mutating operation is load, mutate, save. A failed mutation is
//! never saved, so a rejected change leaves the stored record untouched.
//! The engine holds no per-session lock; concurrent writers to the same
//! session race and the last save wins.

use std::sync::Arc;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{AppError, AppResult, LedgerError, LedgerResult};
use crate::ledger::{ConfidencePolicy, Ledger};
use crate::queue::QueuedTest;
use crate::resilience::RecoveryNotice;
use crate::session::{
    ConfidencePercent, EvidenceEntry, HypothesisCard, LoadOutcome, Phase, RecordHealth, Session,
    SessionStore, TestDesign, TestResult,
};
use crate::storage::KeyValueStore;

/// Result of [`SessionEngine::open_session`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenedSession {
    /// The session state.
    pub session: Session,
    /// Whether this call created the session.
    pub created: bool,
    /// Key the session was recovered from, when its own record was damaged.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_from: Option<String>,
    /// Notice to show alongside the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<RecoveryNotice>,
}

/// Hypothesis-testing sessions on top of a key-value store.
pub struct SessionEngine<S> {
    store: SessionStore<S>,
    ledger: Ledger,
}

impl<S: KeyValueStore> SessionEngine<S> {
    /// Create an engine with the default confidence policy.
    pub fn new(store: SessionStore<S>) -> Self {
        Self {
            store,
            ledger: Ledger::default(),
        }
    }

    /// Replace the confidence policy.
    pub fn with_policy(mut self, policy: Arc<dyn ConfidencePolicy>) -> Self {
        self.ledger = Ledger::new(policy);
        self
    }

    /// The underlying session store.
    pub fn store(&self) -> &SessionStore<S> {
        &self.store
    }

    /// The ledger used for mutations.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Open a session, creating it on first use.
    ///
    /// A damaged record is replaced by the first valid copy found in the
    /// namespace; when there is none the call fails with
    /// [`AppError::Unrecoverable`] carrying the notice to show.
    pub async fn open_session(&self, session_id: &str) -> AppResult<OpenedSession> {
        check_session_id(session_id)?;
        match self.store.load(session_id).await? {
            LoadOutcome::Found(session) => Ok(OpenedSession {
                session,
                created: false,
                recovered_from: None,
                notice: None,
            }),
            LoadOutcome::NotFound => {
                let session = self.create_new(session_id).await?;
                Ok(OpenedSession {
                    session,
                    created: true,
                    recovered_from: None,
                    notice: None,
                })
            }
            LoadOutcome::Recovery(outcome) => match outcome.data {
                Some(session) if outcome.recovered => Ok(OpenedSession {
                    session,
                    created: false,
                    recovered_from: outcome.source_key,
                    notice: outcome.notice,
                }),
                _ => Err(unrecoverable(session_id, outcome.notice)),
            },
        }
    }

    /// Create a session, failing if a usable one already exists.
    ///
    /// A damaged record with no usable copy does not block creation; the
    /// save moves it to a quarantine key first.
    pub async fn create_session(&self, session_id: &str) -> AppResult<Session> {
        check_session_id(session_id)?;
        match self.store.load(session_id).await? {
            LoadOutcome::NotFound => self.create_new(session_id).await,
            LoadOutcome::Recovery(outcome) if !outcome.recovered => {
                warn!(session_id = %session_id, "Replacing unrecoverable session record");
                self.create_new(session_id).await
            }
            LoadOutcome::Found(_) | LoadOutcome::Recovery(_) => Err(AppError::SessionExists {
                session_id: session_id.to_string(),
            }),
        }
    }

    /// Read a session without changing it.
    pub async fn get_session(&self, session_id: &str) -> AppResult<Session> {
        self.load_existing(session_id).await
    }

    /// Add a hypothesis version to a session.
    pub async fn add_hypothesis(
        &self,
        session_id: &str,
        version: &str,
        statement: &str,
        confidence: ConfidencePercent,
    ) -> AppResult<HypothesisCard> {
        self.mutate(session_id, |ledger, session| {
            ledger.add_hypothesis(session, version, statement, confidence)?;
            session
                .card(version)
                .cloned()
                .ok_or_else(|| LedgerError::HypothesisNotFound {
                    version: version.to_string(),
                })
        })
        .await
    }

    /// Make `version` the primary hypothesis.
    pub async fn set_primary(&self, session_id: &str, version: &str) -> AppResult<()> {
        self.mutate(session_id, |ledger, session| {
            ledger.set_primary(session, version)
        })
        .await
    }

    /// Track `version` as an alternative hypothesis.
    pub async fn add_alternative(&self, session_id: &str, version: &str) -> AppResult<()> {
        self.mutate(session_id, |ledger, session| {
            ledger.add_alternative(session, version)
        })
        .await
    }

    /// Record the outcome of a test against a hypothesis version.
    pub async fn record_evidence(
        &self,
        session_id: &str,
        version: &str,
        outcome: TestResult,
    ) -> AppResult<EvidenceEntry> {
        self.mutate(session_id, move |ledger, session| {
            ledger.record_evidence(session, version, outcome)
        })
        .await
    }

    /// Retire a non-primary hypothesis version.
    pub async fn retire_hypothesis(&self, session_id: &str, version: &str) -> AppResult<()> {
        self.mutate(session_id, |ledger, session| {
            ledger.retire_hypothesis(session, version)
        })
        .await
    }

    /// Evidence for one version, in recorded order or newest first.
    pub async fn evidence(
        &self,
        session_id: &str,
        version: &str,
        newest_first: bool,
    ) -> AppResult<Vec<EvidenceEntry>> {
        let session = self.load_existing(session_id).await?;
        let entries = self.ledger.evidence(&session, version, newest_first)?;
        Ok(entries.into_iter().cloned().collect())
    }

    /// Queue a designed test, optionally tied to a hypothesis version.
    pub async fn enqueue_test(
        &self,
        session_id: &str,
        test: TestDesign,
        hypothesis_version: Option<&str>,
    ) -> AppResult<String> {
        self.mutate(session_id, move |_, session| match hypothesis_version {
            Some(version) => {
                if session.card(version).is_none() {
                    return Err(LedgerError::HypothesisNotFound {
                        version: version.to_string(),
                    });
                }
                session.test_queue.enqueue_for(test, version)
            }
            None => session.test_queue.enqueue(test),
        })
        .await
    }

    /// Take the oldest pending test. Nothing is saved when the queue is empty.
    pub async fn dequeue_test(&self, session_id: &str) -> AppResult<Option<QueuedTest>> {
        let mut session = self.load_existing(session_id).await?;
        let Some(next) = session.test_queue.dequeue() else {
            return Ok(None);
        };
        self.store.save(&mut session).await?;
        Ok(Some(next))
    }

    /// Pending tests, oldest first.
    pub async fn pending_tests(&self, session_id: &str) -> AppResult<Vec<QueuedTest>> {
        let session = self.load_existing(session_id).await?;
        Ok(session.test_queue.pending().cloned().collect())
    }

    /// Move the session to another workflow phase.
    pub async fn set_phase(&self, session_id: &str, phase: Phase) -> AppResult<()> {
        self.mutate(session_id, |_, session| {
            if session.phase != phase {
                info!(session_id = %session.id, from = %session.phase, to = %phase, "Phase changed");
                session.phase = phase;
            }
            Ok(())
        })
        .await
    }

    /// Health of every record in the namespace.
    pub async fn audit(&self) -> AppResult<Vec<RecordHealth>> {
        Ok(self.store.scanner().audit().await?)
    }

    async fn create_new(&self, session_id: &str) -> AppResult<Session> {
        let mut session = Session::new(session_id);
        self.store.save(&mut session).await?;
        info!(session_id = %session_id, "Session created");
        Ok(session)
    }

    async fn load_existing(&self, session_id: &str) -> AppResult<Session> {
        check_session_id(session_id)?;
        match self.store.load(session_id).await? {
            LoadOutcome::Found(session) => Ok(session),
            LoadOutcome::NotFound => Err(AppError::SessionNotFound {
                session_id: session_id.to_string(),
            }),
            LoadOutcome::Recovery(outcome) => match outcome.data {
                Some(session) if outcome.recovered => {
                    warn!(
                        session_id = %session_id,
                        source_key = ?outcome.source_key,
                        "Continuing from recovered record"
                    );
                    Ok(session)
                }
                _ => Err(unrecoverable(session_id, outcome.notice)),
            },
        }
    }

    async fn mutate<T, F>(&self, session_id: &str, change: F) -> AppResult<T>
    where
        F: FnOnce(&Ledger, &mut Session) -> LedgerResult<T>,
    {
        let mut session = self.load_existing(session_id).await?;
        let value = change(&self.ledger, &mut session)?;
        self.store.save(&mut session).await?;
        Ok(value)
    }
}

fn check_session_id(session_id: &str) -> LedgerResult<()> {
    Session::check_id(session_id).map_err(|e| LedgerError::validation("session_id", e.to_string()))
}

fn unrecoverable(session_id: &str, notice: Option<RecoveryNotice>) -> AppError {
    let notice = notice.unwrap_or_else(|| {
        RecoveryNotice::session_unrecoverable(session_id, "no usable record found", 0)
    });
    error!(session_id = %session_id, "Session is unrecoverable");
    AppError::Unrecoverable {
        session_id: session_id.to_string(),
        notice: Box::new(notice),
    }
}
