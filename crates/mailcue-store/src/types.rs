use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Delivery status of a (configuration, record) pair.
///
/// Transitions are monotone: `Pending` moves to `Sent` or `Failed` and a
/// `Sent` row never re-fires unless the observed trigger value changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum TriggerStatus {
  Pending,
  Sent,
  Failed,
}

/// A trigger state row as stored in the database.
///
/// Keyed by (configuration_id, record_id); at most one row exists per
/// pair. `snapshot` holds the trigger-field value the row was claimed
/// with, which is what re-arming compares against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct TriggerState {
  pub configuration_id: String,
  pub record_id: String,
  pub status: TriggerStatus,
  pub snapshot: String,
  pub attempts: i32,
  pub last_attempt_at: Option<DateTime<Utc>>,
  pub last_error: Option<String>,
}

/// Outcome of an atomic claim on a trigger state row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimOutcome {
  /// The pair is pending and owned by this dispatch; carries the attempt
  /// count accumulated so far (non-zero when resuming an interrupted
  /// dispatch).
  Claimed { attempts: i32 },
  /// A terminal row already covers this trigger value; do not send.
  Suppressed,
}

/// An observed trigger-field value, keyed by (table, field, record).
///
/// Distinct configurations on the same table may watch distinct fields,
/// so snapshots carry the field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct FieldSnapshot {
  pub table_id: String,
  pub field: String,
  pub record_id: String,
  pub value: String,
}
