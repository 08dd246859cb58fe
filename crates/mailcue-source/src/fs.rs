use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mailcue_model::{Configuration, SourceRecord, SourceTable, Template};
use tokio::fs;

use crate::{ConfigSnapshot, ConfigStore, Error, SourceRecords};

/// Filesystem-based configuration store.
///
/// The configuration database is exported as three JSON files:
/// ```text
/// {root}/
/// ├── templates.json
/// ├── tables.json
/// └── configurations.json
/// ```
pub struct FsConfigStore {
  root: PathBuf,
}

impl FsConfigStore {
  /// Create a new filesystem config store at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  /// Get the root directory of the store.
  pub fn root(&self) -> &Path {
    &self.root
  }

  async fn read_json<T: serde::de::DeserializeOwned>(&self, name: &str) -> Result<T, Error> {
    let content = fs::read_to_string(self.root.join(name)).await?;
    Ok(serde_json::from_str(&content)?)
  }
}

#[async_trait]
impl ConfigStore for FsConfigStore {
  async fn load(&self) -> Result<ConfigSnapshot, Error> {
    let templates: Vec<Template> = self.read_json("templates.json").await?;
    let tables: Vec<SourceTable> = self.read_json("tables.json").await?;
    let configurations: Vec<Configuration> = self.read_json("configurations.json").await?;

    Ok(ConfigSnapshot {
      templates,
      tables,
      configurations,
    })
  }
}

/// Filesystem-based source record adapter.
///
/// Each source table is one JSON file named by its external id:
/// ```text
/// {root}/
/// ├── invoices.json
/// └── purchase-orders.json
/// ```
/// holding an array of `{ "id": ..., "fields": { ... } }` records.
pub struct FsSourceRecords {
  root: PathBuf,
}

impl FsSourceRecords {
  /// Create a new filesystem record adapter at the given root path.
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  async fn read_table(&self, external_id: &str) -> Result<Vec<SourceRecord>, Error> {
    let path = self.root.join(format!("{external_id}.json"));
    if !path.exists() {
      return Err(Error::TableNotFound(external_id.to_string()));
    }
    let content = fs::read_to_string(&path).await?;
    Ok(serde_json::from_str(&content)?)
  }
}

#[async_trait]
impl SourceRecords for FsSourceRecords {
  async fn fetch_fields(
    &self,
    external_id: &str,
    fields: &[String],
  ) -> Result<Vec<SourceRecord>, Error> {
    let records = self.read_table(external_id).await?;

    Ok(
      records
        .into_iter()
        .map(|record| SourceRecord {
          fields: record
            .fields
            .into_iter()
            .filter(|(name, _)| fields.contains(name))
            .collect(),
          ..record
        })
        .collect(),
    )
  }

  async fn fetch_record(
    &self,
    external_id: &str,
    record_id: &str,
  ) -> Result<Option<SourceRecord>, Error> {
    let records = self.read_table(external_id).await?;
    Ok(records.into_iter().find(|r| r.id == record_id))
  }
}
