use std::env;
use std::path::PathBuf;

use crate::error::AppError;
use crate::resilience::{RetryOptions, TimeoutOptions};

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend selection.
    pub store: StoreConfig,
    /// SQLite settings.
    pub database: DatabaseConfig,
    /// Record layout settings.
    pub session: SessionConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
    /// Retry and timeout settings for storage calls.
    pub request: RequestConfig,
}

/// Which key-value backend holds session records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Durable SQLite database.
    Sqlite,
    /// Process-local map.
    Memory,
}

/// Store selection
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Selected backend.
    pub backend: StoreBackend,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Database file path.
    pub path: PathBuf,
    /// Pool size.
    pub max_connections: u32,
}

/// Session record layout
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Key prefix shared by every session record.
    pub namespace: String,
    /// Copy the previous valid record to a backup key before overwriting.
    pub keep_backup: bool,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`.
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    /// Human-readable.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Storage I/O retry and timeout configuration
#[derive(Debug, Clone)]
pub struct RequestConfig {
    /// Deadline for one storage call.
    pub timeout_ms: u64,
    /// Attempts per storage call, first one included.
    pub max_attempts: u32,
    /// Backoff before the first retry.
    pub base_delay_ms: u64,
    /// Backoff cap.
    pub max_delay_ms: u64,
    /// Fraction of each delay that may be shaved off at random.
    pub jitter_ratio: f64,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let store = StoreConfig {
            backend: match env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "sqlite".to_string())
                .to_lowercase()
                .as_str()
            {
                "sqlite" => StoreBackend::Sqlite,
                "memory" => StoreBackend::Memory,
                other => {
                    return Err(AppError::Config {
                        message: format!("STORE_BACKEND must be sqlite or memory, got {}", other),
                    })
                }
            },
        };

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/sessions.db".to_string()),
            ),
            max_connections: parse_var("DATABASE_MAX_CONNECTIONS", 5),
        };

        let session = SessionConfig {
            namespace: env::var("SESSION_NAMESPACE")
                .unwrap_or_else(|_| SessionConfig::default().namespace),
            keep_backup: env::var("SESSION_KEEP_BACKUP")
                .map(|v| v.to_lowercase() != "false")
                .unwrap_or(true),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let defaults = RequestConfig::default();
        let request = RequestConfig {
            timeout_ms: parse_var("STORAGE_TIMEOUT_MS", defaults.timeout_ms),
            max_attempts: parse_var("RETRY_MAX_ATTEMPTS", defaults.max_attempts),
            base_delay_ms: parse_var("RETRY_BASE_DELAY_MS", defaults.base_delay_ms),
            max_delay_ms: parse_var("RETRY_MAX_DELAY_MS", defaults.max_delay_ms),
            jitter_ratio: parse_var("RETRY_JITTER_RATIO", defaults.jitter_ratio),
        };

        let config = Config {
            store,
            database,
            session,
            logging,
            request,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<(), AppError> {
        if self.session.namespace.trim().is_empty() {
            return Err(AppError::Config {
                message: "SESSION_NAMESPACE cannot be empty".to_string(),
            });
        }
        self.request.validate()
    }
}

impl RequestConfig {
    /// Reject out-of-range retry settings
    pub fn validate(&self) -> Result<(), AppError> {
        if self.max_attempts == 0 {
            return Err(AppError::Config {
                message: "RETRY_MAX_ATTEMPTS must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(AppError::Config {
                message: format!(
                    "RETRY_JITTER_RATIO must be within 0..=1, got {}",
                    self.jitter_ratio
                ),
            });
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(AppError::Config {
                message: "RETRY_BASE_DELAY_MS cannot exceed RETRY_MAX_DELAY_MS".to_string(),
            });
        }
        if self.timeout_ms == 0 {
            return Err(AppError::Config {
                message: "STORAGE_TIMEOUT_MS must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    /// Retry options for storage I/O
    pub fn retry_options(&self) -> RetryOptions {
        RetryOptions {
            max_attempts: self.max_attempts,
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
            jitter_ratio: self.jitter_ratio,
        }
    }

    /// Timeout options for a single storage call
    pub fn timeout_options(&self) -> TimeoutOptions {
        TimeoutOptions::new(self.timeout_ms).with_message("Storage operation timed out")
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 5000,
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 2000,
            jitter_ratio: 0.25,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: "hypothesis-session".to_string(),
            keep_backup: true,
        }
    }
}
