use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mailcue_model::SourceRecord;

use crate::{ConfigSnapshot, ConfigStore, Error, SourceRecords};

/// In-memory configuration store holding a fixed snapshot.
#[derive(Debug, Clone, Default)]
pub struct MemoryConfigStore {
  snapshot: ConfigSnapshot,
}

impl MemoryConfigStore {
  /// Create a store serving the given snapshot.
  pub fn new(snapshot: ConfigSnapshot) -> Self {
    Self { snapshot }
  }
}

#[async_trait]
impl ConfigStore for MemoryConfigStore {
  async fn load(&self) -> Result<ConfigSnapshot, Error> {
    Ok(self.snapshot.clone())
  }
}

/// In-memory source tables, mutable between cycles.
///
/// Tests drive trigger transitions by mutating fields with [`set_field`]
/// between `run_cycle` calls.
///
/// [`set_field`]: MemorySource::set_field
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
  tables: Arc<Mutex<HashMap<String, Vec<SourceRecord>>>>,
}

impl MemorySource {
  pub fn new() -> Self {
    Self::default()
  }

  /// Insert or replace a record in a table, creating the table if needed.
  pub fn upsert_record(&self, external_id: &str, record: SourceRecord) {
    let mut tables = self.tables.lock().unwrap();
    let records = tables.entry(external_id.to_string()).or_default();
    match records.iter_mut().find(|r| r.id == record.id) {
      Some(existing) => *existing = record,
      None => records.push(record),
    }
  }

  /// Set one field on an existing record.
  pub fn set_field(&self, external_id: &str, record_id: &str, field: &str, value: &str) {
    let mut tables = self.tables.lock().unwrap();
    if let Some(records) = tables.get_mut(external_id)
      && let Some(record) = records.iter_mut().find(|r| r.id == record_id)
    {
      record.fields.insert(field.to_string(), value.to_string());
    }
  }

  /// Remove a record from a table.
  pub fn remove_record(&self, external_id: &str, record_id: &str) {
    let mut tables = self.tables.lock().unwrap();
    if let Some(records) = tables.get_mut(external_id) {
      records.retain(|r| r.id != record_id);
    }
  }
}

#[async_trait]
impl SourceRecords for MemorySource {
  async fn fetch_fields(
    &self,
    external_id: &str,
    fields: &[String],
  ) -> Result<Vec<SourceRecord>, Error> {
    let tables = self.tables.lock().unwrap();
    let records = tables
      .get(external_id)
      .ok_or_else(|| Error::TableNotFound(external_id.to_string()))?;

    Ok(
      records
        .iter()
        .map(|record| SourceRecord {
          id: record.id.clone(),
          fields: record
            .fields
            .iter()
            .filter(|(name, _)| fields.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect(),
        })
        .collect(),
    )
  }

  async fn fetch_record(
    &self,
    external_id: &str,
    record_id: &str,
  ) -> Result<Option<SourceRecord>, Error> {
    let tables = self.tables.lock().unwrap();
    let records = tables
      .get(external_id)
      .ok_or_else(|| Error::TableNotFound(external_id.to_string()))?;

    Ok(records.iter().find(|r| r.id == record_id).cloned())
  }
}
