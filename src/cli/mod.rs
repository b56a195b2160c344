//! Operator commands for inspecting stored sessions.
//!
//! Every command is read-only: loading a damaged session runs the recovery
//! scan but nothing is written back.

use clap::Subcommand;
use serde::Serialize;
use serde_json::json;
use tracing::debug;

use crate::engine::SessionEngine;
use crate::error::AppError;
use crate::storage::KeyValueStore;

/// Operator subcommands.
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Show a session record
    Show {
        /// Session identifier
        session_id: String,
    },

    /// List the evidence recorded against one hypothesis version
    Evidence {
        /// Session identifier
        session_id: String,

        /// Hypothesis version label (e.g. H1)
        version: String,

        /// List the newest entry first
        #[arg(long)]
        newest_first: bool,
    },

    /// List pending tests, oldest first
    Queue {
        /// Session identifier
        session_id: String,
    },

    /// Report the health of every record in the namespace
    Audit,
}

/// Result of CLI command execution.
#[derive(Debug)]
pub struct CliResult {
    /// Exit code (0 = success)
    pub exit_code: i32,
    /// Output message
    pub message: String,
}

impl CliResult {
    /// Create a success result with the given message.
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            message: message.into(),
        }
    }

    /// Create an error result with the given message.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            exit_code: 1,
            message: message.into(),
        }
    }

    /// Render a failure as its code plus the user-facing notice.
    pub fn from_error(err: &AppError) -> Self {
        let body = json!({
            "error": err.code(),
            "status": err.status_code(),
            "notice": err.recovery_notice(),
        });
        Self::error(pretty(&body))
    }
}

/// Execute an operator command.
pub async fn execute_command<S: KeyValueStore>(
    command: Commands,
    engine: &SessionEngine<S>,
) -> CliResult {
    debug!(command = ?command, "Executing command");

    let rendered = match command {
        Commands::Show { session_id } => engine
            .get_session(&session_id)
            .await
            .map(|session| pretty(&session)),
        Commands::Evidence {
            session_id,
            version,
            newest_first,
        } => engine
            .evidence(&session_id, &version, newest_first)
            .await
            .map(|entries| pretty(&entries)),
        Commands::Queue { session_id } => engine
            .pending_tests(&session_id)
            .await
            .map(|pending| pretty(&pending)),
        Commands::Audit => engine.audit().await.map(|report| {
            let valid = report.iter().filter(|r| r.is_valid()).count();
            pretty(&json!({
                "records": report.len(),
                "valid": valid,
                "invalid": report.len() - valid,
                "report": report,
            }))
        }),
    };

    match rendered {
        Ok(output) => CliResult::success(output),
        Err(e) => CliResult::from_error(&e),
    }
}

fn pretty<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| json!({ "error": format!("failed to render output: {}", e) }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{
        ConfidencePercent, DiscriminativePower, EvidenceResult, SessionStore, TestDesign,
        TestResult,
    };
    use crate::storage::MemoryStore;
    use serde_json::Value;

    async fn seeded_engine() -> SessionEngine<MemoryStore> {
        let engine = SessionEngine::new(SessionStore::new(MemoryStore::new()));
        engine.create_session("s-1").await.unwrap();
        engine
            .add_hypothesis("s-1", "H1", "cold cache", ConfidencePercent::EVEN)
            .await
            .unwrap();
        let test = TestDesign::new("warm and rerun", "experiment", DiscriminativePower::MODERATE);
        engine
            .record_evidence("s-1", "H1", TestResult::new(test.clone(), EvidenceResult::Supports))
            .await
            .unwrap();
        engine
            .record_evidence("s-1", "H1", TestResult::new(test, EvidenceResult::Neutral))
            .await
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn test_show_outputs_record_json() {
        let engine = seeded_engine().await;
        let result = execute_command(
            Commands::Show {
                session_id: "s-1".to_string(),
            },
            &engine,
        )
        .await;

        assert_eq!(result.exit_code, 0);
        let value: Value = serde_json::from_str(&result.message).unwrap();
        assert_eq!(value["id"], "s-1");
        assert_eq!(value["_version"], 1);
    }

    #[tokio::test]
    async fn test_evidence_newest_first() {
        let engine = seeded_engine().await;
        let result = execute_command(
            Commands::Evidence {
                session_id: "s-1".to_string(),
                version: "H1".to_string(),
                newest_first: true,
            },
            &engine,
        )
        .await;

        let value: Value = serde_json::from_str(&result.message).unwrap();
        assert_eq!(value[0]["result"], "neutral");
        assert_eq!(value[1]["result"], "supports");
    }

    #[tokio::test]
    async fn test_missing_session_renders_notice() {
        let engine = seeded_engine().await;
        let result = execute_command(
            Commands::Queue {
                session_id: "nope".to_string(),
            },
            &engine,
        )
        .await;

        assert_eq!(result.exit_code, 1);
        let value: Value = serde_json::from_str(&result.message).unwrap();
        assert_eq!(value["error"], "SESSION_NOT_FOUND");
        assert_eq!(value["status"], 404);
        assert!(value["notice"]["actions"].is_array());
    }

    #[tokio::test]
    async fn test_audit_counts_records() {
        let engine = seeded_engine().await;
        let result = execute_command(Commands::Audit, &engine).await;

        let value: Value = serde_json::from_str(&result.message).unwrap();
        // Primary record plus the backup written by each later save.
        assert_eq!(value["records"], 2);
        assert_eq!(value["invalid"], 0);
    }
}
