use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TemplateId;

/// An email template, immutable per version.
///
/// Subject and CC entries are literal strings that may embed merge
/// expressions (`{{ Field_Name }}`). Body parts are file references
/// resolved against the renderer's template root and concatenated in
/// declared order; attachments are carried as named byte blobs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
  pub id: TemplateId,
  pub name: String,
  pub subject: String,
  /// Sender address (a shared mailbox in the usual deployment).
  pub from: String,
  #[serde(default)]
  pub cc: Vec<String>,
  /// Ordered message-body file references.
  #[serde(default)]
  pub body_parts: Vec<PathBuf>,
  #[serde(default)]
  pub attachments: Vec<PathBuf>,
}
