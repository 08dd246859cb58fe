//! Change detection over trigger-field snapshots.
//!
//! The detector is configuration-agnostic: it diffs the current
//! observations of a table's watched fields against the snapshot stored
//! after the previous cycle, and reports every difference. Which of
//! those differences qualify for delivery is the evaluator's job.

use std::collections::HashMap;

use mailcue_model::SourceRecord;
use mailcue_store::FieldSnapshot;

/// A watched field whose value differs from the previous observation.
///
/// `previous` is `None` for newly observed records, which count as a
/// transition from an absent (blank) baseline.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldChange {
  pub record_id: String,
  pub field: String,
  pub previous: Option<String>,
  pub current: String,
}

/// Diff current observations against the stored snapshot.
///
/// Fields a record does not carry read as blank. Records present in the
/// snapshot but missing from `records` were deleted from the source and
/// are not reported.
pub fn detect(
  previous: &[FieldSnapshot],
  records: &[SourceRecord],
  fields: &[String],
) -> Vec<FieldChange> {
  let prior: HashMap<(&str, &str), &str> = previous
    .iter()
    .map(|s| ((s.field.as_str(), s.record_id.as_str()), s.value.as_str()))
    .collect();

  let mut changes = Vec::new();
  for record in records {
    for field in fields {
      let current = record.field(field).unwrap_or("");
      let prior_value = prior.get(&(field.as_str(), record.id.as_str())).copied();

      if prior_value != Some(current) {
        changes.push(FieldChange {
          record_id: record.id.clone(),
          field: field.clone(),
          previous: prior_value.map(str::to_string),
          current: current.to_string(),
        });
      }
    }
  }

  changes
}

/// Build the snapshot rows that replace a table's previous snapshot.
///
/// Called after evaluation with the same observations the detector saw,
/// whether or not anything fired.
pub fn to_snapshots(
  table_id: &str,
  records: &[SourceRecord],
  fields: &[String],
) -> Vec<FieldSnapshot> {
  let mut snapshots = Vec::with_capacity(records.len() * fields.len());
  for record in records {
    for field in fields {
      snapshots.push(FieldSnapshot {
        table_id: table_id.to_string(),
        field: field.clone(),
        record_id: record.id.clone(),
        value: record.field(field).unwrap_or("").to_string(),
      });
    }
  }
  snapshots
}
