use async_trait::async_trait;
use mailcue_render::RenderedMessage;
use tracing::info;

use crate::{Mailer, SendError};

/// Mailer that logs instead of sending.
///
/// Used for dry runs and in tests where the trigger machinery matters
/// but delivery does not.
#[derive(Debug, Clone, Default)]
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
  async fn send(&self, message: &RenderedMessage) -> Result<(), SendError> {
    info!(
      from = %message.from,
      to = ?message.to,
      subject = %message.subject,
      "dry run: send skipped"
    );
    Ok(())
  }
}
