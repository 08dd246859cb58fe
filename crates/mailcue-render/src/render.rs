use std::path::{Path, PathBuf};

use mailcue_model::{Configuration, SourceRecord, Template, field_is_blank, split_addresses};
use minijinja::{Environment, Value};
use tokio::fs;

use crate::message::{Attachment, RenderedMessage};
use crate::RenderError;

/// Renders templates against source record fields.
///
/// Body part and attachment references on a [`Template`] are resolved
/// relative to `template_root`. Merge keys are the record's field names
/// with spaces replaced by underscores, so `{{ Customer_Name }}` reads
/// the "Customer Name" field.
pub struct Renderer {
  template_root: PathBuf,
}

impl Renderer {
  /// Create a renderer resolving template files under the given root.
  pub fn new(template_root: impl Into<PathBuf>) -> Self {
    Self {
      template_root: template_root.into(),
    }
  }

  /// Render a message for a qualifying (configuration, record) pair.
  pub async fn render(
    &self,
    configuration: &Configuration,
    template: &Template,
    record: &SourceRecord,
  ) -> Result<RenderedMessage, RenderError> {
    let env = Environment::new();
    let context = merge_context(record);

    let recipient_value = record.field(&configuration.recipient_field);
    if field_is_blank(recipient_value) {
      return Err(RenderError::MissingRecipient {
        field: configuration.recipient_field.clone(),
        record_id: record.id.clone(),
      });
    }
    let to = split_addresses(recipient_value.unwrap_or_default());

    let subject = render_value(&env, "subject", &template.subject, &context)?;

    let mut cc = Vec::new();
    for entry in &template.cc {
      let rendered = render_value(&env, "cc", entry, &context)?;
      cc.extend(split_addresses(&rendered));
    }

    let mut parts = Vec::with_capacity(template.body_parts.len());
    for part in &template.body_parts {
      let path = self.template_root.join(part);
      let content = read_text(&path).await?;
      parts.push(render_value(
        &env,
        &path.display().to_string(),
        &content,
        &context,
      )?);
    }
    let body = parts.join("\n");

    let mut attachments = Vec::with_capacity(template.attachments.len());
    for attachment in &template.attachments {
      let path = self.template_root.join(attachment);
      attachments.push(load_attachment(&path).await?);
    }

    Ok(RenderedMessage {
      from: template.from.clone(),
      to,
      cc,
      subject,
      body,
      attachments,
    })
  }
}

/// Build the merge context from a record's fields.
///
/// Field names with spaces become underscore keys (the only form a merge
/// expression can reference); the record id is exposed as `record_id`.
fn merge_context(record: &SourceRecord) -> Value {
  let mut context: std::collections::BTreeMap<String, String> = record
    .fields
    .iter()
    .map(|(name, value)| (name.replace(' ', "_"), value.clone()))
    .collect();
  context.insert("record_id".to_string(), record.id.clone());
  Value::from_serialize(&context)
}

/// Render a single template string, passing literals through untouched.
fn render_value(
  env: &Environment,
  what: &str,
  template: &str,
  context: &Value,
) -> Result<String, RenderError> {
  if !template.contains("{{") && !template.contains("{%") {
    return Ok(template.to_string());
  }

  env
    .render_str(template, context.clone())
    .map_err(|e| RenderError::Template {
      what: what.to_string(),
      message: e.to_string(),
    })
}

async fn read_text(path: &Path) -> Result<String, RenderError> {
  fs::read_to_string(path)
    .await
    .map_err(|source| RenderError::FileUnreadable {
      path: path.display().to_string(),
      source,
    })
}

async fn load_attachment(path: &Path) -> Result<Attachment, RenderError> {
  let content = fs::read(path)
    .await
    .map_err(|source| RenderError::FileUnreadable {
      path: path.display().to_string(),
      source,
    })?;

  let filename = path
    .file_name()
    .map(|n| n.to_string_lossy().to_string())
    .unwrap_or_else(|| "attachment".to_string());

  Ok(Attachment { filename, content })
}

#[cfg(test)]
mod tests {
  use std::collections::HashMap;

  use super::*;

  fn configuration() -> Configuration {
    Configuration {
      id: "cfg-1".to_string(),
      name: "Invoice Overdue".to_string(),
      active: true,
      source_table_id: "tbl-1".to_string(),
      template_id: "tpl-1".to_string(),
      trigger_field: "PaidDate".to_string(),
      recipient_field: "CustomerEmail".to_string(),
      trigger_on_blank: false,
    }
  }

  fn record() -> SourceRecord {
    let mut fields = HashMap::new();
    fields.insert("Customer Name".to_string(), "Ada Lovelace".to_string());
    fields.insert("Amount".to_string(), "120.00".to_string());
    fields.insert(
      "CustomerEmail".to_string(),
      "ada@example.com, billing@example.com".to_string(),
    );
    SourceRecord {
      id: "42".to_string(),
      fields,
    }
  }

  fn template(body_parts: Vec<PathBuf>) -> Template {
    Template {
      id: "tpl-1".to_string(),
      name: "Overdue".to_string(),
      subject: "Invoice for {{ Customer_Name }}".to_string(),
      from: "ar@example.com".to_string(),
      cc: vec!["{{ Customer_Name }} <cc@example.com>".to_string()],
      body_parts,
      attachments: vec![],
    }
  }

  #[tokio::test]
  async fn test_render_merges_fields_and_orders_parts() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("greeting.txt"), "Dear {{ Customer_Name }},").unwrap();
    std::fs::write(dir.path().join("amount.txt"), "You owe {{ Amount }}.").unwrap();

    let renderer = Renderer::new(dir.path());
    let message = renderer
      .render(
        &configuration(),
        &template(vec!["greeting.txt".into(), "amount.txt".into()]),
        &record(),
      )
      .await
      .unwrap();

    assert_eq!(message.subject, "Invoice for Ada Lovelace");
    assert_eq!(message.body, "Dear Ada Lovelace,\nYou owe 120.00.");
    assert_eq!(message.to, vec![
      "ada@example.com".to_string(),
      "billing@example.com".to_string()
    ]);
    assert_eq!(message.cc, vec![
      "Ada Lovelace <cc@example.com>".to_string()
    ]);
    assert_eq!(message.from, "ar@example.com");
  }

  #[tokio::test]
  async fn test_blank_recipient_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Renderer::new(dir.path());

    let mut record = record();
    record.fields.insert("CustomerEmail".to_string(), "  ".to_string());

    let err = renderer
      .render(&configuration(), &template(vec![]), &record)
      .await
      .unwrap_err();

    assert!(matches!(err, RenderError::MissingRecipient { .. }));
  }

  #[tokio::test]
  async fn test_missing_part_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Renderer::new(dir.path());

    let err = renderer
      .render(
        &configuration(),
        &template(vec!["missing.txt".into()]),
        &record(),
      )
      .await
      .unwrap_err();

    assert!(matches!(err, RenderError::FileUnreadable { .. }));
  }

  #[tokio::test]
  async fn test_invalid_template_syntax_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("bad.txt"), "{% if %}").unwrap();

    let renderer = Renderer::new(dir.path());
    let err = renderer
      .render(&configuration(), &template(vec!["bad.txt".into()]), &record())
      .await
      .unwrap_err();

    assert!(matches!(err, RenderError::Template { .. }));
  }

  #[tokio::test]
  async fn test_attachments_load_bytes() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("terms.pdf"), b"%PDF-fake").unwrap();

    let mut template = template(vec![]);
    template.attachments = vec!["terms.pdf".into()];

    let renderer = Renderer::new(dir.path());
    let message = renderer
      .render(&configuration(), &template, &record())
      .await
      .unwrap();

    assert_eq!(message.attachments.len(), 1);
    assert_eq!(message.attachments[0].filename, "terms.pdf");
    assert_eq!(message.attachments[0].content, b"%PDF-fake");
  }
}
