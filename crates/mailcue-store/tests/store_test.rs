//! Integration tests for the SQLite state store.

use mailcue_store::{
  ClaimOutcome, Error, FieldSnapshot, SqliteStore, StateStore, TriggerStatus,
};
use sqlx::sqlite::SqlitePoolOptions;

async fn store() -> SqliteStore {
  // A single connection so the in-memory database is shared.
  let pool = SqlitePoolOptions::new()
    .max_connections(1)
    .connect("sqlite::memory:")
    .await
    .expect("failed to open in-memory database");
  let store = SqliteStore::new(pool);
  store.migrate().await.expect("migrations failed");
  store
}

#[tokio::test]
async fn test_claim_creates_pending_row() {
  let store = store().await;

  let outcome = store.claim("cfg-1", "rec-1", "2024-01-01").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 0 });

  let state = store.get("cfg-1", "rec-1").await.unwrap().unwrap();
  assert_eq!(state.status, TriggerStatus::Pending);
  assert_eq!(state.snapshot, "2024-01-01");
  assert_eq!(state.attempts, 0);
}

#[tokio::test]
async fn test_claim_confirms_pending_and_keeps_attempts() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.record_attempt("cfg-1", "rec-1", "timeout").await.unwrap();
  store.record_attempt("cfg-1", "rec-1", "timeout").await.unwrap();

  let outcome = store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 2 });
}

#[tokio::test]
async fn test_claim_suppresses_sent_row_with_same_snapshot() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.mark_sent("cfg-1", "rec-1").await.unwrap();

  let outcome = store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Suppressed);

  let state = store.get("cfg-1", "rec-1").await.unwrap().unwrap();
  assert_eq!(state.status, TriggerStatus::Sent);
}

#[tokio::test]
async fn test_claim_rearms_sent_row_on_changed_snapshot() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.mark_sent("cfg-1", "rec-1").await.unwrap();

  let outcome = store.claim("cfg-1", "rec-1", "v2").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 0 });

  let state = store.get("cfg-1", "rec-1").await.unwrap().unwrap();
  assert_eq!(state.status, TriggerStatus::Pending);
  assert_eq!(state.snapshot, "v2");
}

#[tokio::test]
async fn test_terminal_transitions_require_pending() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.mark_sent("cfg-1", "rec-1").await.unwrap();

  let err = store.mark_sent("cfg-1", "rec-1").await.unwrap_err();
  assert!(matches!(err, Error::Conflict { .. }));

  let err = store.mark_failed("cfg-1", "rec-1", "boom").await.unwrap_err();
  assert!(matches!(err, Error::Conflict { .. }));
}

#[tokio::test]
async fn test_failed_row_suppressed_until_value_changes() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.mark_failed("cfg-1", "rec-1", "rejected").await.unwrap();

  let outcome = store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Suppressed);

  // A new trigger value is a new event.
  let outcome = store.claim("cfg-1", "rec-1", "v2").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 0 });
}

#[tokio::test]
async fn test_reset_removes_row() {
  let store = store().await;

  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.mark_failed("cfg-1", "rec-1", "rejected").await.unwrap();

  store.reset("cfg-1", "rec-1").await.unwrap();
  assert!(store.get("cfg-1", "rec-1").await.unwrap().is_none());

  // Reset re-arms: the same snapshot claims fresh.
  let outcome = store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  assert_eq!(outcome, ClaimOutcome::Claimed { attempts: 0 });

  let err = store.reset("cfg-9", "rec-9").await.unwrap_err();
  assert!(matches!(err, Error::NotFound(_)));
}

#[tokio::test]
async fn test_list_pending_is_scoped_and_ordered() {
  let store = store().await;

  store.claim("cfg-1", "rec-2", "v1").await.unwrap();
  store.claim("cfg-1", "rec-1", "v1").await.unwrap();
  store.claim("cfg-2", "rec-3", "v1").await.unwrap();
  store.claim("cfg-1", "rec-9", "v1").await.unwrap();
  store.mark_sent("cfg-1", "rec-9").await.unwrap();

  let pending = store.list_pending("cfg-1").await.unwrap();
  let ids: Vec<&str> = pending.iter().map(|s| s.record_id.as_str()).collect();
  assert_eq!(ids, vec!["rec-1", "rec-2"]);
}

#[tokio::test]
async fn test_replace_snapshots_drops_absent_records() {
  let store = store().await;

  let snapshot = |record_id: &str, value: &str| FieldSnapshot {
    table_id: "tbl-1".to_string(),
    field: "PaidDate".to_string(),
    record_id: record_id.to_string(),
    value: value.to_string(),
  };

  store
    .replace_snapshots("tbl-1", &["PaidDate".to_string()], &[
      snapshot("rec-1", ""),
      snapshot("rec-2", "2024-01-01"),
    ])
    .await
    .unwrap();

  let loaded = store.load_snapshots("tbl-1").await.unwrap();
  assert_eq!(loaded.len(), 2);

  // rec-1 disappeared from the source; its snapshot goes away too.
  store
    .replace_snapshots("tbl-1", &["PaidDate".to_string()], &[snapshot(
      "rec-2",
      "2024-02-02",
    )])
    .await
    .unwrap();

  let loaded = store.load_snapshots("tbl-1").await.unwrap();
  assert_eq!(loaded.len(), 1);
  assert_eq!(loaded[0].record_id, "rec-2");
  assert_eq!(loaded[0].value, "2024-02-02");
}
