use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use mailcue_render::RenderedMessage;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};

use crate::{Mailer, SendError};

const GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Mail transport backed by the Microsoft Graph sendMail API.
///
/// Sends from the message's `from` mailbox via
/// `POST /users/{from}/sendMail` with a bearer token. Token acquisition
/// is the caller's concern; the mailer only carries the token.
pub struct GraphMailer {
  client: Client,
  access_token: String,
  base_url: String,
}

impl GraphMailer {
  /// Create a mailer with the given access token.
  pub fn new(access_token: impl Into<String>) -> Self {
    Self {
      client: Client::new(),
      access_token: access_token.into(),
      base_url: GRAPH_BASE_URL.to_string(),
    }
  }

  /// Override the Graph base URL (tests point this at a local server).
  pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
    self.base_url = base_url.into();
    self
  }
}

#[async_trait]
impl Mailer for GraphMailer {
  async fn send(&self, message: &RenderedMessage) -> Result<(), SendError> {
    let endpoint = format!("{}/users/{}/sendMail", self.base_url, message.from);
    let payload = build_payload(message);

    debug!(to = ?message.to, subject = %message.subject, "sending via graph");

    let response = self
      .client
      .post(&endpoint)
      .bearer_auth(&self.access_token)
      .json(&payload)
      .send()
      .await
      .map_err(|e| SendError::Transient {
        message: e.to_string(),
      })?;

    let status = response.status();
    if status == StatusCode::ACCEPTED {
      info!(to = ?message.to, "message accepted");
      return Ok(());
    }

    let body = response.text().await.unwrap_or_default();
    Err(classify_status(status, &body))
  }
}

/// Build the Graph sendMail JSON payload.
fn build_payload(message: &RenderedMessage) -> serde_json::Value {
  let address = |email: &String| {
    serde_json::json!({ "emailAddress": { "address": email } })
  };

  let mut graph_message = serde_json::json!({
    "subject": message.subject,
    "body": { "contentType": "Text", "content": message.body },
    "toRecipients": message.to.iter().map(address).collect::<Vec<_>>(),
    "from": { "emailAddress": { "address": message.from } },
  });

  if !message.cc.is_empty() {
    graph_message["ccRecipients"] =
      serde_json::Value::Array(message.cc.iter().map(address).collect());
  }

  if !message.attachments.is_empty() {
    graph_message["attachments"] = serde_json::Value::Array(
      message
        .attachments
        .iter()
        .map(|a| {
          serde_json::json!({
            "@odata.type": "#microsoft.graph.fileAttachment",
            "name": a.filename,
            "contentBytes": BASE64.encode(&a.content),
          })
        })
        .collect(),
    );
  }

  serde_json::json!({
    "message": graph_message,
    "saveToSentItems": "true",
  })
}

/// Map a non-202 response to a send error.
///
/// Rate limiting and server errors clear on retry; everything else
/// (rejected address, bad request, auth) is permanent for this message.
fn classify_status(status: StatusCode, body: &str) -> SendError {
  if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
    SendError::Transient {
      message: format!("graph returned {status}: {body}"),
    }
  } else {
    SendError::Permanent {
      message: format!("graph returned {status}: {body}"),
    }
  }
}
