use serde::{Deserialize, Serialize};

use crate::{ConfigurationId, TableId, TemplateId};

/// A source table the engine watches.
///
/// Read-only reference data: the external table identifier used by the
/// source record adapter, plus the custom field names templates are
/// allowed to merge in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTable {
  pub id: TableId,
  /// Identifier of the table in the external database.
  pub external_id: String,
  /// Field names available for merge substitution.
  #[serde(default)]
  pub merge_fields: Vec<String>,
}

/// A trigger configuration: one source table, one template, one trigger.
///
/// When `trigger_on_blank` is false the configuration fires on a rising
/// edge (trigger field goes from blank to non-blank); when true it fires
/// while the trigger field is blank, suppressed after the first send
/// until the field value changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Configuration {
  pub id: ConfigurationId,
  pub name: String,
  pub active: bool,
  pub source_table_id: TableId,
  pub template_id: TemplateId,
  /// Field whose transitions activate this configuration.
  pub trigger_field: String,
  /// Field holding the recipient address list.
  pub recipient_field: String,
  #[serde(default)]
  pub trigger_on_blank: bool,
}
