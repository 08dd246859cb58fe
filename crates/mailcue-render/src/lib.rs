//! Mailcue template rendering.
//!
//! Turns a qualifying (configuration, record) pair and its template into
//! a [`RenderedMessage`]: subject and CC resolve as literals with
//! optional merge expressions, body parts load from disk and concatenate
//! in declared order, attachments load as bytes. Rendering is
//! deterministic given the template files and the record snapshot.

mod message;
mod render;

pub use message::{Attachment, RenderedMessage};
pub use render::Renderer;

use thiserror::Error;

/// Errors that can occur while rendering a message.
///
/// All of these are data errors for the pair being rendered: the
/// dispatcher records them as permanent failures.
#[derive(Debug, Error)]
pub enum RenderError {
  /// The recipient field is blank or absent on the record.
  #[error("recipient field '{field}' is blank for record '{record_id}'")]
  MissingRecipient { field: String, record_id: String },

  /// A body part or attachment file could not be read.
  #[error("failed to read template file '{path}': {source}")]
  FileUnreadable {
    path: String,
    #[source]
    source: std::io::Error,
  },

  /// A template failed to parse or render.
  #[error("failed to render '{what}': {message}")]
  Template { what: String, message: String },
}
