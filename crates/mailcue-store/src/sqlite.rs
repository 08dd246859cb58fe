use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use crate::{ClaimOutcome, Error, FieldSnapshot, StateStore, TriggerState};

/// SQLite-based state store implementation.
pub struct SqliteStore {
  pool: SqlitePool,
}

impl SqliteStore {
  /// Create a new SQLite store with the given connection pool.
  pub fn new(pool: SqlitePool) -> Self {
    Self { pool }
  }

  /// Run database migrations.
  pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(&self.pool).await
  }
}

#[async_trait]
impl StateStore for SqliteStore {
  async fn claim(
    &self,
    configuration_id: &str,
    record_id: &str,
    snapshot: &str,
  ) -> Result<ClaimOutcome, Error> {
    // Single upsert so the claim is atomic against concurrent cycles:
    // insert a fresh pending row, keep an existing pending row (and its
    // attempt count), or re-arm a terminal row whose snapshot differs.
    // A terminal row with the same snapshot matches no branch and
    // returns no row, which is the suppression case.
    let attempts: Option<i32> = sqlx::query_scalar(
      r#"
            INSERT INTO trigger_state (configuration_id, record_id, status, snapshot, attempts, last_attempt_at, last_error)
            VALUES (?, ?, 'pending', ?, 0, NULL, NULL)
            ON CONFLICT(configuration_id, record_id) DO UPDATE SET
                status = 'pending',
                snapshot = excluded.snapshot,
                attempts = CASE WHEN trigger_state.status = 'pending' THEN trigger_state.attempts ELSE 0 END,
                last_error = NULL
            WHERE trigger_state.status = 'pending'
               OR trigger_state.snapshot != excluded.snapshot
            RETURNING attempts
            "#,
    )
    .bind(configuration_id)
    .bind(record_id)
    .bind(snapshot)
    .fetch_optional(&self.pool)
    .await?;

    Ok(match attempts {
      Some(attempts) => ClaimOutcome::Claimed { attempts },
      None => ClaimOutcome::Suppressed,
    })
  }

  async fn get(
    &self,
    configuration_id: &str,
    record_id: &str,
  ) -> Result<Option<TriggerState>, Error> {
    let state = sqlx::query_as(
      r#"
            SELECT configuration_id, record_id, status, snapshot, attempts, last_attempt_at, last_error
            FROM trigger_state
            WHERE configuration_id = ? AND record_id = ?
            "#,
    )
    .bind(configuration_id)
    .bind(record_id)
    .fetch_optional(&self.pool)
    .await?;

    Ok(state)
  }

  async fn record_attempt(
    &self,
    configuration_id: &str,
    record_id: &str,
    error: &str,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE trigger_state
            SET attempts = attempts + 1, last_attempt_at = ?, last_error = ?
            WHERE configuration_id = ? AND record_id = ? AND status = 'pending'
            "#,
    )
    .bind(Utc::now())
    .bind(error)
    .bind(configuration_id)
    .bind(record_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::Conflict {
        configuration_id: configuration_id.to_string(),
        record_id: record_id.to_string(),
      });
    }

    Ok(())
  }

  async fn mark_sent(&self, configuration_id: &str, record_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE trigger_state
            SET status = 'sent', last_attempt_at = ?, last_error = NULL
            WHERE configuration_id = ? AND record_id = ? AND status = 'pending'
            "#,
    )
    .bind(Utc::now())
    .bind(configuration_id)
    .bind(record_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::Conflict {
        configuration_id: configuration_id.to_string(),
        record_id: record_id.to_string(),
      });
    }

    Ok(())
  }

  async fn mark_failed(
    &self,
    configuration_id: &str,
    record_id: &str,
    error: &str,
  ) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            UPDATE trigger_state
            SET status = 'failed', last_attempt_at = ?, last_error = ?
            WHERE configuration_id = ? AND record_id = ? AND status = 'pending'
            "#,
    )
    .bind(Utc::now())
    .bind(error)
    .bind(configuration_id)
    .bind(record_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::Conflict {
        configuration_id: configuration_id.to_string(),
        record_id: record_id.to_string(),
      });
    }

    Ok(())
  }

  async fn list_pending(&self, configuration_id: &str) -> Result<Vec<TriggerState>, Error> {
    let rows = sqlx::query_as(
      r#"
            SELECT configuration_id, record_id, status, snapshot, attempts, last_attempt_at, last_error
            FROM trigger_state
            WHERE configuration_id = ? AND status = 'pending'
            ORDER BY record_id ASC
            "#,
    )
    .bind(configuration_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows)
  }

  async fn list(&self) -> Result<Vec<TriggerState>, Error> {
    let rows = sqlx::query_as(
      r#"
            SELECT configuration_id, record_id, status, snapshot, attempts, last_attempt_at, last_error
            FROM trigger_state
            ORDER BY configuration_id ASC, record_id ASC
            "#,
    )
    .fetch_all(&self.pool)
    .await?;

    Ok(rows)
  }

  async fn reset(&self, configuration_id: &str, record_id: &str) -> Result<(), Error> {
    let result = sqlx::query(
      r#"
            DELETE FROM trigger_state
            WHERE configuration_id = ? AND record_id = ?
            "#,
    )
    .bind(configuration_id)
    .bind(record_id)
    .execute(&self.pool)
    .await?;

    if result.rows_affected() == 0 {
      return Err(Error::NotFound(format!(
        "trigger state ({configuration_id}, {record_id})"
      )));
    }

    Ok(())
  }

  async fn load_snapshots(&self, table_id: &str) -> Result<Vec<FieldSnapshot>, Error> {
    let rows = sqlx::query_as(
      r#"
            SELECT table_id, field, record_id, value
            FROM field_snapshots
            WHERE table_id = ?
            "#,
    )
    .bind(table_id)
    .fetch_all(&self.pool)
    .await?;

    Ok(rows)
  }

  async fn replace_snapshots(
    &self,
    table_id: &str,
    fields: &[String],
    snapshots: &[FieldSnapshot],
  ) -> Result<(), Error> {
    let mut tx = self.pool.begin().await?;

    for field in fields {
      sqlx::query(
        r#"
                DELETE FROM field_snapshots
                WHERE table_id = ? AND field = ?
                "#,
      )
      .bind(table_id)
      .bind(field)
      .execute(&mut *tx)
      .await?;
    }

    for snapshot in snapshots {
      sqlx::query(
        r#"
                INSERT INTO field_snapshots (table_id, field, record_id, value)
                VALUES (?, ?, ?, ?)
                "#,
      )
      .bind(&snapshot.table_id)
      .bind(&snapshot.field)
      .bind(&snapshot.record_id)
      .bind(&snapshot.value)
      .execute(&mut *tx)
      .await?;
    }

    tx.commit().await?;
    Ok(())
  }
}
