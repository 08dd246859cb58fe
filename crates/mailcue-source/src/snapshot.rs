use mailcue_model::{Configuration, SourceTable, Template};
use serde::{Deserialize, Serialize};

/// The configuration database as of one load.
///
/// All lookups during a cycle go through the same snapshot so a
/// configuration edit mid-cycle cannot tear the view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigSnapshot {
  #[serde(default)]
  pub templates: Vec<Template>,
  #[serde(default)]
  pub tables: Vec<SourceTable>,
  #[serde(default)]
  pub configurations: Vec<Configuration>,
}

impl ConfigSnapshot {
  /// Look up a template by id.
  pub fn template(&self, id: &str) -> Option<&Template> {
    self.templates.iter().find(|t| t.id == id)
  }

  /// Look up a source table by id.
  pub fn table(&self, id: &str) -> Option<&SourceTable> {
    self.tables.iter().find(|t| t.id == id)
  }

  /// Active configurations in stable (id) order.
  pub fn active_configurations(&self) -> Vec<&Configuration> {
    let mut active: Vec<&Configuration> =
      self.configurations.iter().filter(|c| c.active).collect();
    active.sort_by(|a, b| a.id.cmp(&b.id));
    active
  }
}
