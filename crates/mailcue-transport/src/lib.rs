//! Mail transport for mailcue.
//!
//! The engine treats the transport as a single opaque `send` operation
//! whose failures are either transient (worth retrying) or permanent.
//! [`GraphMailer`] sends through the Microsoft Graph sendMail endpoint;
//! [`NoopMailer`] logs instead of sending, for dry runs and tests.

mod graph;
mod noop;

pub use graph::GraphMailer;
pub use noop::NoopMailer;

use async_trait::async_trait;
use mailcue_render::RenderedMessage;

/// Error type for send operations.
///
/// The distinction drives the dispatcher's retry policy: transient
/// failures are retried with backoff, permanent ones fail the pair
/// immediately.
#[derive(Debug, thiserror::Error)]
pub enum SendError {
  /// A failure that may clear on retry (timeout, connection refused,
  /// rate limiting, server error).
  #[error("transient send failure: {message}")]
  Transient { message: String },

  /// A failure that will not clear on retry (rejected address,
  /// malformed message).
  #[error("permanent send failure: {message}")]
  Permanent { message: String },
}

impl SendError {
  /// Whether the dispatcher should retry after this error.
  pub fn is_transient(&self) -> bool {
    matches!(self, SendError::Transient { .. })
  }
}

/// Mail transport trait.
#[async_trait]
pub trait Mailer: Send + Sync {
  /// Send a rendered message.
  async fn send(&self, message: &RenderedMessage) -> Result<(), SendError>;
}
