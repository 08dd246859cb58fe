//! Mailcue trigger state store.
//!
//! This crate provides the storage trait and SQLite implementation for
//! trigger state rows and field snapshots. The store is the only shared
//! mutable resource in the engine: its atomic claim is the single-send
//! guard that keeps delivery at-most-once across overlapping cycles and
//! restarts.
//!
//! The [`StateStore`] trait defines operations for:
//! - Atomically claiming a (configuration, record) pair for dispatch
//! - Recording attempts and terminal sent/failed transitions
//! - Listing and resetting rows for operator review
//! - Loading and replacing per-table field snapshots

mod sqlite;
mod types;

pub use sqlite::SqliteStore;
pub use types::{ClaimOutcome, FieldSnapshot, TriggerState, TriggerStatus};

use async_trait::async_trait;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested row was not found.
  #[error("not found: {0}")]
  NotFound(String),

  /// A state transition was attempted on a row not in the expected status.
  #[error("conflicting state transition for ({configuration_id}, {record_id})")]
  Conflict {
    configuration_id: String,
    record_id: String,
  },

  /// A database error occurred.
  #[error("database error: {0}")]
  Database(#[from] sqlx::Error),
}

/// Storage trait for trigger state and field snapshots.
#[async_trait]
pub trait StateStore: Send + Sync {
  /// Atomically claim a (configuration, record) pair for dispatch.
  ///
  /// Creates the row as pending, confirms an existing pending row, or
  /// re-arms a terminal row whose snapshot differs from `snapshot`.
  /// Returns [`ClaimOutcome::Suppressed`] when a terminal row already
  /// covers this snapshot value.
  async fn claim(
    &self,
    configuration_id: &str,
    record_id: &str,
    snapshot: &str,
  ) -> Result<ClaimOutcome, Error>;

  /// Get a trigger state row, if one exists.
  async fn get(
    &self,
    configuration_id: &str,
    record_id: &str,
  ) -> Result<Option<TriggerState>, Error>;

  /// Record a failed attempt on a pending row, keeping it pending.
  async fn record_attempt(
    &self,
    configuration_id: &str,
    record_id: &str,
    error: &str,
  ) -> Result<(), Error>;

  /// Transition a pending row to sent.
  async fn mark_sent(&self, configuration_id: &str, record_id: &str) -> Result<(), Error>;

  /// Transition a pending row to failed with a final error.
  async fn mark_failed(
    &self,
    configuration_id: &str,
    record_id: &str,
    error: &str,
  ) -> Result<(), Error>;

  /// List pending rows for a configuration (dispatch resume set).
  async fn list_pending(&self, configuration_id: &str) -> Result<Vec<TriggerState>, Error>;

  /// List all trigger state rows for operator review.
  async fn list(&self) -> Result<Vec<TriggerState>, Error>;

  /// Delete a trigger state row (operator reset, the explicit re-arm).
  async fn reset(&self, configuration_id: &str, record_id: &str) -> Result<(), Error>;

  /// Load the stored snapshots for a table.
  async fn load_snapshots(&self, table_id: &str) -> Result<Vec<FieldSnapshot>, Error>;

  /// Replace a table's snapshots for the given fields with the current
  /// observations.
  async fn replace_snapshots(
    &self,
    table_id: &str,
    fields: &[String],
    snapshots: &[FieldSnapshot],
  ) -> Result<(), Error>;
}
