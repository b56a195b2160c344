use std::future::Future;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::model::{Session, SCHEMA_VERSION};
use super::recovery::{RecoveryOutcome, RecoveryScanner};
use crate::config::{RequestConfig, SessionConfig};
use crate::error::{StorageError, StorageResult};
use crate::resilience::{with_retry_if, with_timeout, RetryOptions, TimeoutOptions};
use crate::storage::KeyValueStore;

/// Result of loading a session record.
#[derive(Debug, Clone)]
pub enum LoadOutcome {
    /// The record parsed and validated.
    Found(Session),
    /// No record exists under the session key.
    NotFound,
    /// The record failed validation and the namespace was scanned.
    Recovery(RecoveryOutcome),
}

impl LoadOutcome {
    /// The usable session, whether loaded directly or recovered.
    pub fn session(&self) -> Option<&Session> {
        match self {
            LoadOutcome::Found(session) => Some(session),
            LoadOutcome::Recovery(outcome) => outcome.data.as_ref(),
            LoadOutcome::NotFound => None,
        }
    }

    /// Take the usable session, whether loaded directly or recovered.
    pub fn into_session(self) -> Option<Session> {
        match self {
            LoadOutcome::Found(session) => Some(session),
            LoadOutcome::Recovery(outcome) => outcome.data,
            LoadOutcome::NotFound => None,
        }
    }

    /// Whether the session came from the recovery scan.
    pub fn is_recovered(&self) -> bool {
        matches!(self, LoadOutcome::Recovery(outcome) if outcome.recovered)
    }
}

/// Durable session records on top of a [`KeyValueStore`].
///
/// Every backend call goes through the timeout guard and the retry
/// supervisor; only transient storage failures are retried.
pub struct SessionStore<S> {
    backend: S,
    namespace: String,
    keep_backup: bool,
    retry: RetryOptions,
    timeout: TimeoutOptions,
}

impl<S: KeyValueStore> SessionStore<S> {
    /// Create a store with default namespace, retry and timeout settings.
    pub fn new(backend: S) -> Self {
        Self::from_config(backend, &SessionConfig::default(), &RequestConfig::default())
    }

    /// Create a store from configuration.
    pub fn from_config(backend: S, session: &SessionConfig, request: &RequestConfig) -> Self {
        Self {
            backend,
            namespace: session.namespace.clone(),
            keep_backup: session.keep_backup,
            retry: request.retry_options(),
            timeout: request.timeout_options(),
        }
    }

    /// Set namespace
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Set retry options
    pub fn with_retry(mut self, retry: RetryOptions) -> Self {
        self.retry = retry;
        self
    }

    /// Set timeout options
    pub fn with_timeout(mut self, timeout: TimeoutOptions) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enable or disable the backup copy written on save
    pub fn with_backup(mut self, keep_backup: bool) -> Self {
        self.keep_backup = keep_backup;
        self
    }

    /// The underlying key-value store.
    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Key prefix shared by every session record.
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Primary key of a session record.
    pub fn key_for(&self, session_id: &str) -> String {
        format!("{}:{}", self.namespace, session_id)
    }

    /// Key holding the previous valid record of a session.
    pub fn backup_key_for(&self, session_id: &str) -> String {
        format!("{}:{}:backup", self.namespace, session_id)
    }

    fn quarantine_key_for(&self, session_id: &str) -> String {
        format!(
            "{}:{}:corrupt:{}",
            self.namespace,
            session_id,
            Utc::now().timestamp_millis()
        )
    }

    /// Scanner over this store's namespace.
    pub fn scanner(&self) -> RecoveryScanner<'_, S> {
        RecoveryScanner::new(self)
    }

    /// Load a session.
    ///
    /// A record that fails to parse or validate is not an error: the
    /// namespace is scanned for a usable copy and the outcome is returned as
    /// [`LoadOutcome::Recovery`]. Only I/O failures surface as `Err`.
    pub async fn load(&self, session_id: &str) -> StorageResult<LoadOutcome> {
        Session::check_id(session_id)?;
        let key = self.key_for(session_id);

        let raw = match self.read(&key).await? {
            Some(raw) => raw,
            None => {
                debug!(session_id = %session_id, key = %key, "No session record");
                return Ok(LoadOutcome::NotFound);
            }
        };

        let reason = match Session::from_record(&raw) {
            Ok(session) if session.id == session_id => {
                debug!(session_id = %session_id, version = session.version, "Session loaded");
                return Ok(LoadOutcome::Found(session));
            }
            Ok(session) => format!("record under {} belongs to session {}", key, session.id),
            Err(e) => e.to_string(),
        };

        warn!(
            session_id = %session_id,
            key = %key,
            reason = %reason,
            "Session record failed validation, scanning for a usable copy"
        );

        let outcome = self.scanner().recover(session_id, &reason).await?;
        Ok(LoadOutcome::Recovery(outcome))
    }

    /// Persist a session, overwriting its record.
    ///
    /// Touches `updated_at`, raises the schema version to the current one,
    /// and refuses to write a record that would fail validation. The record
    /// being replaced is kept: a valid one goes to the backup key, a
    /// corrupt one to a quarantine key. `session` is only updated once the
    /// write has succeeded.
    pub async fn save(&self, session: &mut Session) -> StorageResult<()> {
        let mut record = session.clone();
        record.touch();
        if record.version < SCHEMA_VERSION {
            record.version = SCHEMA_VERSION;
        }
        record.validate()?;

        let payload = serde_json::to_string(&record)?;
        let key = self.key_for(&record.id);

        if let Some(previous) = self.read(&key).await? {
            if previous != payload {
                self.preserve_previous(&record.id, &previous).await?;
            }
        }

        self.write(&key, &payload).await?;

        info!(
            session_id = %record.id,
            key = %key,
            version = record.version,
            bytes = payload.len(),
            "Session saved"
        );
        *session = record;
        Ok(())
    }

    async fn preserve_previous(&self, session_id: &str, previous: &str) -> StorageResult<()> {
        match Session::from_record(previous) {
            Ok(prior) if prior.id == session_id => {
                if self.keep_backup {
                    let backup_key = self.backup_key_for(session_id);
                    self.write(&backup_key, previous).await?;
                    debug!(session_id = %session_id, key = %backup_key, "Previous record backed up");
                }
            }
            Ok(_) | Err(_) => {
                let quarantine_key = self.quarantine_key_for(session_id);
                self.write(&quarantine_key, previous).await?;
                warn!(
                    session_id = %session_id,
                    key = %quarantine_key,
                    "Unreadable record moved aside before overwrite"
                );
            }
        }
        Ok(())
    }

    pub(crate) async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        self.guarded("get", || self.backend.get(key)).await
    }

    pub(crate) async fn write(&self, key: &str, value: &str) -> StorageResult<()> {
        self.guarded("set", || self.backend.set(key, value)).await
    }

    pub(crate) async fn list_keys(&self) -> StorageResult<Vec<String>> {
        let prefix = format!("{}:", self.namespace);
        self.guarded("keys", || self.backend.keys(&prefix)).await
    }

    /// Run one backend call under the timeout guard, retrying transient
    /// failures.
    async fn guarded<T, F, Fut>(&self, operation: &'static str, mut call: F) -> StorageResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = StorageResult<T>>,
    {
        let timeout = &self.timeout;

        with_retry_if(&self.retry, StorageError::is_transient, || {
            let attempt = call();
            async move {
                with_timeout(timeout, attempt)
                    .await
                    .map_err(StorageError::from)
                    .and_then(|result| result)
            }
        })
        .await
        .map_err(|e| {
            let err = StorageError::from(e);
            error!(operation, error = %err, "Storage call failed");
            err
        })
    }
}
