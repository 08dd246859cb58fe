use serde::{Deserialize, Serialize};

/// A file attached to an outgoing message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
  pub filename: String,
  pub content: Vec<u8>,
}

/// A fully rendered message, ready for the mail transport.
///
/// Ephemeral: produced per dispatch attempt and not persisted beyond the
/// attempt's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenderedMessage {
  pub from: String,
  pub to: Vec<String>,
  pub cc: Vec<String>,
  pub subject: String,
  pub body: String,
  pub attachments: Vec<Attachment>,
}
