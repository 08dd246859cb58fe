use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::RecordId;

/// A row from an external source table.
///
/// Records are read-only; the engine never writes back to the source.
/// Depending on the fetch, `fields` may hold only the trigger and
/// recipient fields (cheap poll) or the full field mapping (rendering).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
  pub id: RecordId,
  #[serde(default)]
  pub fields: HashMap<String, String>,
}

impl SourceRecord {
  /// Look up a field value by name.
  pub fn field(&self, name: &str) -> Option<&str> {
    self.fields.get(name).map(String::as_str)
  }
}

/// Whether a field value counts as blank.
///
/// Absent fields and whitespace-only values are blank.
pub fn field_is_blank(value: Option<&str>) -> bool {
  value.is_none_or(|v| v.trim().is_empty())
}

/// Split a comma-delimited address list, trimming each entry.
///
/// Blank entries are dropped; a blank input yields an empty list.
pub fn split_addresses(input: &str) -> Vec<String> {
  input
    .split(',')
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_string)
    .collect()
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_field_is_blank() {
    assert!(field_is_blank(None));
    assert!(field_is_blank(Some("")));
    assert!(field_is_blank(Some("   ")));
    assert!(!field_is_blank(Some("2024-01-01")));
  }

  #[test]
  fn test_split_addresses() {
    assert_eq!(
      split_addresses("a@example.com, b@example.com"),
      vec!["a@example.com".to_string(), "b@example.com".to_string()]
    );
    assert_eq!(split_addresses(""), Vec::<String>::new());
    assert_eq!(split_addresses(" , ,c@example.com"), vec![
      "c@example.com".to_string()
    ]);
  }

  #[test]
  fn test_record_field_lookup() {
    let mut fields = HashMap::new();
    fields.insert("PaidDate".to_string(), "2024-01-01".to_string());
    let record = SourceRecord {
      id: "42".to_string(),
      fields,
    };

    assert_eq!(record.field("PaidDate"), Some("2024-01-01"));
    assert_eq!(record.field("Missing"), None);
  }
}
