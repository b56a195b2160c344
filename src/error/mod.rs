use thiserror::Error;

use crate::resilience::{RecoveryNotice, RetryError, TimeoutError};

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Session not found: {session_id}")]
    SessionNotFound { session_id: String },

    #[error("Session already exists: {session_id}")]
    SessionExists { session_id: String },

    #[error("Session {session_id} could not be recovered: {}", notice.message())]
    Unrecoverable {
        session_id: String,
        notice: Box<RecoveryNotice>,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Storage layer errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database connection failed: {message}")]
    Connection { message: String },

    #[error("Query failed: {message}")]
    Query { message: String },

    #[error("Migration failed: {message}")]
    Migration { message: String },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid session record: {0}")]
    Schema(#[from] SchemaError),

    #[error("Storage timeout: {0}")]
    Timeout(#[from] TimeoutError),

    #[error("Storage unavailable after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: Box<StorageError>,
    },

    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl StorageError {
    /// Whether the failure is worth retrying.
    ///
    /// Serialization and migration failures are deterministic and are never
    /// retried.
    pub fn is_transient(&self) -> bool {
        match self {
            StorageError::Connection { .. }
            | StorageError::Query { .. }
            | StorageError::Timeout(_) => true,
            StorageError::Sqlx(e) => match e {
                sqlx::Error::Io(_)
                | sqlx::Error::PoolTimedOut
                | sqlx::Error::PoolClosed
                | sqlx::Error::WorkerCrashed => true,
                sqlx::Error::Database(db) => {
                    let msg = db.message().to_lowercase();
                    msg.contains("locked") || msg.contains("busy")
                }
                _ => false,
            },
            StorageError::Migration { .. }
            | StorageError::Serialization(_)
            | StorageError::Schema(_)
            | StorageError::Exhausted { .. } => false,
        }
    }

    /// Whether the failure (or the last failure behind an exhausted retry)
    /// was a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            StorageError::Timeout(_) => true,
            StorageError::Exhausted { last, .. } => last.is_timeout(),
            _ => false,
        }
    }
}

impl From<RetryError<StorageError>> for StorageError {
    fn from(err: RetryError<StorageError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } if attempts > 1 => StorageError::Exhausted {
                attempts,
                last: Box::new(last),
            },
            other => other.into_inner(),
        }
    }
}

/// Structural problems found while validating a persisted session record
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Malformed session record: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("Unsupported schema version {found} (reader supports 1..={supported})")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("Session id is empty")]
    EmptyId,

    #[error("Session id '{id}' contains the reserved ':' separator")]
    InvalidId { id: String },

    #[error("Primary hypothesis '{id}' has no card")]
    DanglingPrimary { id: String },

    #[error("Alternative hypothesis '{id}' has no card")]
    DanglingAlternative { id: String },

    #[error("Retired hypothesis '{id}' has no card")]
    DanglingRetired { id: String },

    #[error("Primary hypothesis '{id}' is retired")]
    RetiredPrimary { id: String },

    #[error("Alternative hypothesis '{id}' is retired")]
    RetiredAlternative { id: String },

    #[error("Card stored under '{key}' belongs to hypothesis '{id}'")]
    CardKeyMismatch { key: String, id: String },
}

/// Ledger and queue validation errors
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Validation failed: {field} - {reason}")]
    Validation { field: String, reason: String },

    #[error("Hypothesis not found: {version}")]
    HypothesisNotFound { version: String },

    #[error("Hypothesis already exists: {version}")]
    HypothesisExists { version: String },

    #[error("Cannot retire primary hypothesis {version}; reassign the primary first")]
    PrimaryRetirement { version: String },

    #[error("Hypothesis {version} is retired")]
    HypothesisRetired { version: String },
}

impl LedgerError {
    /// Shorthand for a field validation failure.
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl AppError {
    /// Machine-readable error code for upstream handlers.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Config { .. } => "CONFIG_ERROR",
            AppError::Storage(StorageError::Schema(_)) => "INVALID_SESSION_RECORD",
            AppError::Storage(e) if e.is_timeout() => "STORAGE_TIMEOUT",
            AppError::Storage(_) => "STORAGE_UNAVAILABLE",
            AppError::Ledger(LedgerError::Validation { .. }) => "VALIDATION_ERROR",
            AppError::Ledger(LedgerError::HypothesisNotFound { .. }) => "HYPOTHESIS_NOT_FOUND",
            AppError::Ledger(LedgerError::HypothesisExists { .. }) => "HYPOTHESIS_EXISTS",
            AppError::Ledger(LedgerError::PrimaryRetirement { .. }) => "PRIMARY_RETIREMENT",
            AppError::Ledger(LedgerError::HypothesisRetired { .. }) => "HYPOTHESIS_RETIRED",
            AppError::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            AppError::SessionExists { .. } => "SESSION_EXISTS",
            AppError::Unrecoverable { .. } => "SESSION_UNRECOVERABLE",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// HTTP status an upstream handler should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            AppError::Ledger(LedgerError::HypothesisNotFound { .. })
            | AppError::SessionNotFound { .. } => 404,
            AppError::Ledger(LedgerError::HypothesisExists { .. })
            | AppError::SessionExists { .. } => 409,
            AppError::Ledger(_) | AppError::Storage(StorageError::Schema(_)) => 400,
            AppError::Storage(e) if e.is_timeout() => 504,
            AppError::Storage(_) => 503,
            AppError::Config { .. } | AppError::Unrecoverable { .. } | AppError::Internal { .. } => {
                500
            }
        }
    }

    /// User-facing notice describing this failure.
    pub fn recovery_notice(&self) -> RecoveryNotice {
        match self {
            AppError::Unrecoverable { notice, .. } => (**notice).clone(),
            AppError::Storage(StorageError::Timeout(e)) => RecoveryNotice::operation_timed_out(e),
            AppError::Storage(StorageError::Schema(e)) => RecoveryNotice::change_rejected(e.to_string()),
            AppError::Storage(e) => RecoveryNotice::storage_unavailable(e.to_string()),
            AppError::Ledger(e) => RecoveryNotice::change_rejected(e.to_string()),
            AppError::SessionNotFound { session_id } => RecoveryNotice::new(
                "Session not found",
                format!("No session named '{}' exists yet.", session_id),
                crate::resilience::NoticeSeverity::Info,
            )
            .with_action("Start a new session", crate::resilience::ActionVariant::Primary),
            AppError::SessionExists { session_id } => RecoveryNotice::new(
                "Session already exists",
                format!("A session named '{}' already exists.", session_id),
                crate::resilience::NoticeSeverity::Warning,
            )
            .with_action("Open the existing session", crate::resilience::ActionVariant::Primary),
            AppError::Config { .. } | AppError::Internal { .. } => RecoveryNotice::new(
                "Something went wrong",
                "The session engine hit an unexpected problem.",
                crate::resilience::NoticeSeverity::Error,
            )
            .with_action("Contact support", crate::resilience::ActionVariant::Primary)
            .with_detail(self.to_string()),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type alias for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
