//! Read-only adapters for mailcue's external collaborators.
//!
//! The configuration database and the business source tables are not
//! part of the engine; they are reached through the [`ConfigStore`] and
//! [`SourceRecords`] traits. This crate ships a filesystem (JSON
//! directory) implementation of each, plus in-memory implementations
//! used by tests and dry runs.

mod fs;
mod memory;
mod snapshot;

pub use fs::{FsConfigStore, FsSourceRecords};
pub use memory::{MemoryConfigStore, MemorySource};
pub use snapshot::ConfigSnapshot;

use async_trait::async_trait;
use mailcue_model::SourceRecord;

/// Error type for adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested source table does not exist.
  #[error("source table not found: {0}")]
  TableNotFound(String),

  /// Reading from the backing store failed.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  /// The backing data could not be parsed.
  #[error("parse error: {0}")]
  Parse(#[from] serde_json::Error),
}

/// Read-only access to the configuration database.
#[async_trait]
pub trait ConfigStore: Send + Sync {
  /// Load all templates, source tables, and configurations as one
  /// consistent snapshot.
  async fn load(&self) -> Result<ConfigSnapshot, Error>;
}

/// Read-only access to the rows of external source tables.
#[async_trait]
pub trait SourceRecords: Send + Sync {
  /// Fetch every record of a table with only the named fields populated.
  ///
  /// This is the cheap poll used for change detection; fields a record
  /// does not have are simply absent from its mapping.
  async fn fetch_fields(
    &self,
    external_id: &str,
    fields: &[String],
  ) -> Result<Vec<SourceRecord>, Error>;

  /// Fetch one record with its full field mapping, for rendering.
  async fn fetch_record(
    &self,
    external_id: &str,
    record_id: &str,
  ) -> Result<Option<SourceRecord>, Error>;
}
