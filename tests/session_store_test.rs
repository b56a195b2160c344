//! Session store integration tests
//!
//! Exercises load/save and the recovery scan against both key-value
//! backends: the in-memory map and SQLite (in-memory and on disk).

use std::sync::Arc;

use hypothesis_session_engine::error::{SchemaError, StorageError};
use hypothesis_session_engine::resilience::NoticeSeverity;
use hypothesis_session_engine::session::{
    ConfidencePercent, HypothesisCard, LoadOutcome, Phase, RecordStatus, Session, SessionStore,
};
use hypothesis_session_engine::storage::{KeyValueStore, MemoryStore, SqliteStore};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const NS: &str = "hypothesis-session";

fn session_with_card(id: &str) -> Session {
    let mut session = Session::new(id);
    session.hypothesis_cards.insert(
        "H1".to_string(),
        HypothesisCard::new("H1", "The cache is cold", ConfidencePercent::EVEN),
    );
    session.primary_hypothesis_id = Some("H1".to_string());
    session
}

async fn sqlite_store() -> SessionStore<SqliteStore> {
    SessionStore::new(SqliteStore::new_in_memory().await.unwrap())
}

// ============================================================================
// Load / save
// ============================================================================

#[tokio::test]
async fn test_load_missing_session() {
    let store = SessionStore::new(MemoryStore::new());
    let outcome = store.load("nobody").await.unwrap();
    assert!(matches!(outcome, LoadOutcome::NotFound));
    assert!(outcome.session().is_none());
}

#[tokio::test]
async fn test_save_is_idempotent_overwrite() {
    let store = SessionStore::new(MemoryStore::new());
    let mut session = session_with_card("s-1");

    store.save(&mut session).await.unwrap();
    store.save(&mut session).await.unwrap();

    let loaded = store.load("s-1").await.unwrap().into_session().unwrap();
    assert_eq!(loaded, session);
}

#[tokio::test]
async fn test_save_keeps_previous_record_as_backup() {
    let store = SessionStore::new(MemoryStore::new());
    let mut session = session_with_card("s-1");
    store.save(&mut session).await.unwrap();
    let first = store.backend().get(&store.key_for("s-1")).await.unwrap().unwrap();

    session.phase = Phase::Formulation;
    store.save(&mut session).await.unwrap();

    let backup = store
        .backend()
        .get(&store.backup_key_for("s-1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(backup, first);
}

#[tokio::test]
async fn test_backup_can_be_disabled() {
    let store = SessionStore::new(MemoryStore::new()).with_backup(false);
    let mut session = session_with_card("s-1");
    store.save(&mut session).await.unwrap();
    session.phase = Phase::Formulation;
    store.save(&mut session).await.unwrap();

    assert_eq!(store.backend().keys(NS).await.unwrap(), vec![store.key_for("s-1")]);
}

#[tokio::test]
async fn test_save_raises_old_version() {
    let store = SessionStore::new(MemoryStore::new());
    let mut session = Session::new("s-1");
    session.version = 0;

    store.save(&mut session).await.unwrap();
    assert_eq!(session.version, 1);
}

// ============================================================================
// Recovery
// ============================================================================

#[tokio::test]
async fn test_corrupt_record_recovered_from_other_key() {
    let store = SessionStore::new(MemoryStore::new());

    // A valid copy of s-1 lives under another key in the namespace.
    let mut copy = session_with_card("s-1");
    copy.touch();
    let copy_json = serde_json::to_string(&copy).unwrap();
    store
        .backend()
        .set(&format!("{}:s-1:backup", NS), &copy_json)
        .await
        .unwrap();

    let mut other = session_with_card("s-2");
    store.save(&mut other).await.unwrap();

    store
        .backend()
        .set(&store.key_for("s-1"), "{\"id\": \"s-1\", \"_vers")
        .await
        .unwrap();

    let outcome = store.load("s-1").await.unwrap();
    assert!(outcome.is_recovered());

    let LoadOutcome::Recovery(recovery) = outcome else {
        panic!("expected a recovery outcome");
    };
    assert!(recovery.recovered);
    assert_eq!(recovery.source_key.as_deref(), Some("hypothesis-session:s-1:backup"));
    assert_eq!(recovery.data.as_ref().map(|s| s.id.as_str()), Some("s-1"));
    assert_eq!(recovery.data.unwrap().primary_id(), Some("H1"));
    assert_eq!(recovery.notice.unwrap().severity(), NoticeSeverity::Warning);
}

#[tokio::test]
async fn test_unrecoverable_record_reports_notice() {
    let store = SessionStore::new(MemoryStore::new());

    let mut other = session_with_card("s-2");
    store.save(&mut other).await.unwrap();
    store
        .backend()
        .set(&store.key_for("s-1"), "not json at all")
        .await
        .unwrap();

    let LoadOutcome::Recovery(recovery) = store.load("s-1").await.unwrap() else {
        panic!("expected a recovery outcome");
    };

    assert!(!recovery.recovered);
    assert!(recovery.data.is_none());
    let notice = recovery.notice.expect("notice is populated");
    assert_eq!(notice.severity(), NoticeSeverity::Error);
    assert!(notice.is_actionable());
    let labels: Vec<&str> = notice.actions().iter().map(|a| a.label()).collect();
    assert_eq!(labels, vec!["Start a new session", "Contact support"]);
    assert!(notice.safe_state_message().unwrap().contains("1 session"));
}

#[tokio::test]
async fn test_unrecoverable_without_other_sessions_has_no_safe_state() {
    let store = SessionStore::new(MemoryStore::new());
    store
        .backend()
        .set(&store.key_for("s-1"), "{}")
        .await
        .unwrap();

    let LoadOutcome::Recovery(recovery) = store.load("s-1").await.unwrap() else {
        panic!("expected a recovery outcome");
    };
    assert!(!recovery.recovered);
    assert!(recovery.notice.unwrap().safe_state_message().is_none());
}

#[tokio::test]
async fn test_record_with_wrong_id_is_not_accepted() {
    let store = SessionStore::new(MemoryStore::new());
    let stray = serde_json::to_string(&session_with_card("s-9")).unwrap();
    store
        .backend()
        .set(&store.key_for("s-1"), &stray)
        .await
        .unwrap();

    let outcome = store.load("s-1").await.unwrap();
    assert!(matches!(outcome, LoadOutcome::Recovery(ref r) if !r.recovered));
}

#[tokio::test]
async fn test_recovery_scan_never_writes() {
    let backend = Arc::new(MemoryStore::new());
    let store = SessionStore::new(Arc::clone(&backend));

    let mut other = session_with_card("s-2");
    store.save(&mut other).await.unwrap();
    store
        .backend()
        .set(&store.key_for("s-1"), "{broken")
        .await
        .unwrap();
    backend.set("unrelated:key", "also broken").await.unwrap();

    let before = backend.snapshot().await;
    let _ = store.load("s-1").await.unwrap();
    let _ = store.scanner().audit().await.unwrap();

    assert_eq!(backend.snapshot().await, before);
}

#[tokio::test]
async fn test_save_over_corrupt_record_quarantines_it() {
    let store = SessionStore::new(MemoryStore::new());
    store
        .backend()
        .set(&store.key_for("s-1"), "{broken")
        .await
        .unwrap();

    let mut fresh = Session::new("s-1");
    store.save(&mut fresh).await.unwrap();

    let keys = store.backend().keys(NS).await.unwrap();
    let quarantined: Vec<&String> = keys.iter().filter(|k| k.contains(":corrupt:")).collect();
    assert_eq!(quarantined.len(), 1);
    assert_eq!(
        store.backend().get(quarantined[0]).await.unwrap().as_deref(),
        Some("{broken")
    );
    assert!(store.load("s-1").await.unwrap().session().is_some());
}

#[tokio::test]
async fn test_session_id_cannot_alias_another_sessions_backup() {
    let store = SessionStore::new(MemoryStore::new());
    let mut x = session_with_card("x");
    store.save(&mut x).await.unwrap();
    x.phase = Phase::Formulation;
    store.save(&mut x).await.unwrap();

    let backup_key = store.backup_key_for("x");
    assert_eq!(backup_key, store.key_for("x:backup"));
    let backup_before = store.backend().get(&backup_key).await.unwrap();
    assert!(backup_before.is_some());

    let err = store.load("x:backup").await.unwrap_err();
    assert!(matches!(err, StorageError::Schema(SchemaError::InvalidId { .. })));

    let mut alias = Session::new("x:backup");
    let err = store.save(&mut alias).await.unwrap_err();
    assert!(matches!(err, StorageError::Schema(SchemaError::InvalidId { .. })));

    assert_eq!(store.backend().get(&backup_key).await.unwrap(), backup_before);
    let loaded = store.load("x").await.unwrap();
    assert!(matches!(loaded, LoadOutcome::Found(ref s) if s.phase == Phase::Formulation));
}

#[tokio::test]
async fn test_stored_record_with_separator_in_id_is_invalid() {
    let store = SessionStore::new(MemoryStore::new());
    let mut alias = Session::new("x");
    alias.id = "x:backup".to_string();
    let raw = serde_json::to_string(&alias).unwrap();
    store.backend().set(&format!("{}:y", NS), &raw).await.unwrap();

    let report = store.scanner().audit().await.unwrap();
    assert!(matches!(report[0].status, RecordStatus::Invalid { .. }));
}

#[tokio::test]
async fn test_corruption_of_one_session_does_not_block_others() {
    let store = SessionStore::new(MemoryStore::new());
    let mut healthy = session_with_card("s-2");
    store.save(&mut healthy).await.unwrap();
    store
        .backend()
        .set(&store.key_for("s-1"), "{broken")
        .await
        .unwrap();

    let loaded = store.load("s-2").await.unwrap();
    assert!(matches!(loaded, LoadOutcome::Found(_)));
}

// ============================================================================
// SQLite backend
// ============================================================================

#[tokio::test]
async fn test_sqlite_recovery_roundtrip() {
    let store = sqlite_store().await;

    let mut session = session_with_card("s-1");
    store.save(&mut session).await.unwrap();
    session.phase = Phase::Execution;
    store.save(&mut session).await.unwrap();

    store
        .backend()
        .set(&store.key_for("s-1"), "{\"_version\": 1")
        .await
        .unwrap();

    let outcome = store.load("s-1").await.unwrap();
    assert!(outcome.is_recovered());
    let recovered = outcome.into_session().unwrap();
    // The backup holds the record as of the first save.
    assert_eq!(recovered.phase, Phase::Intake);

    let report = store.scanner().audit().await.unwrap();
    assert_eq!(report.len(), 2);
    assert!(matches!(report[0].status, RecordStatus::Invalid { .. }));
    assert_eq!(report[1].key, "hypothesis-session:s-1:backup");
    assert!(report[1].is_valid());
}

#[tokio::test]
async fn test_sqlite_file_survives_reopen() {
    let dir = TempDir::new().unwrap();
    let config = hypothesis_session_engine::config::DatabaseConfig {
        path: dir.path().join("nested").join("sessions.db"),
        max_connections: 2,
    };

    {
        let store = SessionStore::new(SqliteStore::new(&config).await.unwrap());
        let mut session = session_with_card("s-1");
        store.save(&mut session).await.unwrap();
    }

    let store = SessionStore::new(SqliteStore::new(&config).await.unwrap());
    let loaded = store.load("s-1").await.unwrap();
    assert_eq!(loaded.session().and_then(|s| s.primary_id()), Some("H1"));
}
