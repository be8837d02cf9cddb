//! Telegram Bot API adapter — the concrete [`Transport`] implementation.
//!
//! Long polling over `getUpdates`, JSON calls for messages and media groups,
//! a multipart upload for documents, and a file download endpoint for
//! attachment bytes. Error responses are classified into the
//! [`TransportError`] taxonomy so the assembler can pick its fallback.

use bytes::Bytes;
use entbridge_core::{
  draft::{AttachmentKind, AttachmentRef},
  profile::UserId,
};
use reqwest::{
  multipart::{Form, Part},
  Client, StatusCode,
};
use serde::{de::DeserializeOwned, Deserialize};
use serde_json::json;
use std::time::Duration;

use crate::{
  dispatch::{EventPayload, UserEvent},
  transport::{
    ChatId, FileInfo, Keyboard, LinkButton, OutgoingDocument, OutgoingMedia,
    SendOptions, Transport, TransportError,
  },
  ui::labels,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

// ─── Client ──────────────────────────────────────────────────────────────────

/// Cheap to clone — the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct TelegramTransport {
  client:    Client,
  base:      String,
  file_base: String,
}

impl TelegramTransport {
  pub fn new(token: &str) -> Result<Self, TransportError> {
    let client = Client::builder()
      .connect_timeout(CONNECT_TIMEOUT)
      .timeout(REQUEST_TIMEOUT)
      .build()
      .map_err(|e| TransportError::Network(e.to_string()))?;

    Ok(Self {
      client,
      base: format!("https://api.telegram.org/bot{token}"),
      file_base: format!("https://api.telegram.org/file/bot{token}"),
    })
  }

  async fn invoke<R: DeserializeOwned>(
    &self,
    method: &str,
    payload: serde_json::Value,
  ) -> Result<R, TransportError> {
    let resp = self
      .client
      .post(format!("{}/{method}", self.base))
      .json(&payload)
      .send()
      .await
      .map_err(map_reqwest)?;

    let status = resp.status();
    let envelope: ApiResponse<R> = resp.json().await.map_err(map_reqwest)?;
    unwrap_envelope(status, envelope)
  }

  // ── Polling ───────────────────────────────────────────────────────────────

  /// One long-poll round. `offset` acknowledges everything below it.
  pub async fn get_updates(
    &self,
    offset: i64,
    timeout_secs: u64,
  ) -> Result<Vec<Update>, TransportError> {
    self
      .invoke("getUpdates", json!({
        "offset": offset,
        "timeout": timeout_secs,
        "allowed_updates": ["message"],
      }))
      .await
  }

  // ── Best-effort setup ─────────────────────────────────────────────────────

  /// Announce commands and bot descriptions. These calls are cosmetic: a
  /// rejection or rate limit is logged and skipped, only infrastructure
  /// failures propagate.
  pub async fn best_effort_setup(&self) -> Result<(), TransportError> {
    self
      .best_effort("setMyCommands", json!({
        "commands": [
          { "command": "start",  "description": "Main menu" },
          { "command": "fill",   "description": "Fill in your profile" },
          { "command": "new",    "description": "New consultation" },
          { "command": "me",     "description": "My details" },
          { "command": "list",   "description": "My submitted requests" },
          { "command": "view",   "description": "Open a request by number" },
          { "command": "cancel", "description": "Stop the current dialog" },
        ],
      }))
      .await?;

    self
      .best_effort("setMyShortDescription", json!({
        "short_description": "Quick hand-off between a dental surgeon and an \
ENT consultant for joint treatment planning.",
      }))
      .await?;

    self
      .best_effort("setMyDescription", json!({
        "description": "Helps a dentist assemble and send a patient referral \
form for an ENT consultation.",
      }))
      .await
  }

  async fn best_effort(
    &self,
    method: &str,
    payload: serde_json::Value,
  ) -> Result<(), TransportError> {
    match self.invoke::<serde_json::Value>(method, payload).await {
      Ok(_) => Ok(()),
      Err(
        e @ (TransportError::RateLimited { .. }
        | TransportError::Rejected(_)
        | TransportError::PayloadRejected(_)),
      ) => {
        tracing::warn!(method, error = %e, "optional setup call skipped");
        Ok(())
      }
      Err(e) => Err(e),
    }
  }
}

// ─── Transport impl ──────────────────────────────────────────────────────────

impl Transport for TelegramTransport {
  async fn file_info(&self, file_ref: &str) -> Result<FileInfo, TransportError> {
    let file: TgFile = self
      .invoke("getFile", json!({ "file_id": file_ref }))
      .await?;
    Ok(FileInfo {
      file_ref: file_ref.to_owned(),
      size:     file.file_size,
      path:     file.file_path,
    })
  }

  async fn download(&self, info: &FileInfo) -> Result<Bytes, TransportError> {
    let path = info.path.as_deref().ok_or_else(|| {
      TransportError::Rejected(format!("no download path for {}", info.file_ref))
    })?;

    let resp = self
      .client
      .get(format!("{}/{path}", self.file_base))
      .send()
      .await
      .map_err(map_reqwest)?;

    if !resp.status().is_success() {
      return Err(TransportError::Rejected(format!(
        "file download failed: {}",
        resp.status()
      )));
    }
    resp.bytes().await.map_err(map_reqwest)
  }

  async fn send_document(
    &self,
    chat: ChatId,
    document: OutgoingDocument<'_>,
  ) -> Result<(), TransportError> {
    let mut form = Form::new()
      .text("chat_id", chat.0.to_string())
      .text("caption", document.caption.to_owned())
      .text("parse_mode", "HTML")
      .text("disable_content_type_detection", "true")
      .part(
        "document",
        Part::bytes(document.bytes.to_vec()).file_name(document.filename.to_owned()),
      );

    if let Some(button) = document.link_button {
      form = form.text("reply_markup", link_markup(&button).to_string());
    }

    let resp = self
      .client
      .post(format!("{}/sendDocument", self.base))
      .multipart(form)
      .send()
      .await
      .map_err(map_reqwest)?;

    let status = resp.status();
    let envelope: ApiResponse<serde_json::Value> =
      resp.json().await.map_err(map_reqwest)?;
    unwrap_envelope(status, envelope).map(|_| ())
  }

  async fn send_media_group(
    &self,
    chat: ChatId,
    items: &[OutgoingMedia<'_>],
  ) -> Result<(), TransportError> {
    let media: Vec<serde_json::Value> = items
      .iter()
      .map(|item| {
        let kind = match item.kind {
          AttachmentKind::Photo => "photo",
          AttachmentKind::Document => "document",
        };
        let mut slot = json!({ "type": kind, "media": item.file_ref });
        if let Some(caption) = item.caption {
          slot["caption"] = caption.into();
          slot["parse_mode"] = "HTML".into();
        }
        slot
      })
      .collect();

    self
      .invoke::<serde_json::Value>("sendMediaGroup", json!({
        "chat_id": chat.0,
        "media": media,
      }))
      .await
      .map(|_| ())
  }

  async fn send_message(
    &self,
    chat: ChatId,
    text: &str,
    options: SendOptions<'_>,
  ) -> Result<(), TransportError> {
    let mut payload = json!({
      "chat_id": chat.0,
      "text": text,
      "disable_web_page_preview": true,
    });
    if options.rich {
      payload["parse_mode"] = "HTML".into();
    }
    if let Some(button) = options.link_button {
      payload["reply_markup"] = link_markup(&button);
    } else if let Some(keyboard) = options.keyboard {
      payload["reply_markup"] = keyboard_markup(keyboard);
    }

    self
      .invoke::<serde_json::Value>("sendMessage", payload)
      .await
      .map(|_| ())
  }
}

// ─── Markup ──────────────────────────────────────────────────────────────────

fn link_markup(button: &LinkButton<'_>) -> serde_json::Value {
  json!({ "inline_keyboard": [[{ "text": button.label, "url": button.url }]] })
}

fn keyboard_markup(keyboard: Keyboard) -> serde_json::Value {
  match keyboard {
    Keyboard::Main => json!({
      "keyboard": [
        [{ "text": labels::NEW_CONSULTATION }],
        [{ "text": labels::EDIT_PROFILE }],
        [{ "text": labels::MY_DETAILS }],
      ],
      "resize_keyboard": true,
      "is_persistent": true,
      "input_field_placeholder": "Choose an action",
    }),
    Keyboard::Done => json!({
      "keyboard": [[{ "text": labels::DONE }]],
      "resize_keyboard": true,
    }),
    Keyboard::Confirm => json!({
      "keyboard": [
        [{ "text": labels::SUBMIT }, { "text": labels::CANCEL }],
        [{ "text": labels::RESTART }],
      ],
      "resize_keyboard": true,
    }),
    Keyboard::Resume => json!({
      "keyboard": [[{ "text": labels::RESUME }, { "text": labels::RESTART }]],
      "resize_keyboard": true,
    }),
    Keyboard::Remove => json!({ "remove_keyboard": true }),
  }
}

// ─── Wire types ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct ApiResponse<R> {
  ok:          bool,
  result:      Option<R>,
  description: Option<String>,
  parameters:  Option<ResponseParameters>,
}

#[derive(Deserialize)]
struct ResponseParameters {
  retry_after: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
  pub update_id: i64,
  pub message:   Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
  pub from:     Option<TgUser>,
  pub chat:     TgChat,
  pub text:     Option<String>,
  #[serde(default)]
  pub photo:    Vec<PhotoSize>,
  pub document: Option<TgDocument>,
}

#[derive(Debug, Deserialize)]
pub struct TgUser {
  pub id:       i64,
  pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TgChat {
  pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct PhotoSize {
  pub file_id: String,
}

#[derive(Debug, Deserialize)]
pub struct TgDocument {
  pub file_id: String,
}

#[derive(Debug, Deserialize)]
struct TgFile {
  pub file_size: Option<u64>,
  pub file_path: Option<String>,
}

/// Flatten one raw update into the transport-agnostic event the dispatcher
/// consumes. Updates with no usable payload are dropped.
pub fn user_event(update: Update) -> Option<UserEvent> {
  let message = update.message?;
  let from = message.from?;

  let payload = if let Some(document) = message.document {
    EventPayload::Attachment(AttachmentRef {
      file_ref: document.file_id,
      kind:     AttachmentKind::Document,
    })
  } else if let Some(photo) = message.photo.last() {
    // Telegram lists size variants smallest first; take the largest.
    EventPayload::Attachment(AttachmentRef {
      file_ref: photo.file_id.clone(),
      kind:     AttachmentKind::Photo,
    })
  } else if let Some(text) = message.text {
    EventPayload::Text(text)
  } else {
    return None;
  };

  Some(UserEvent {
    user: UserId(from.id),
    chat: ChatId(message.chat.id),
    handle: from.username,
    payload,
  })
}

// ─── Error mapping ───────────────────────────────────────────────────────────

fn map_reqwest(e: reqwest::Error) -> TransportError {
  if e.is_timeout() {
    TransportError::Timeout
  } else {
    TransportError::Network(e.to_string())
  }
}

fn unwrap_envelope<R>(
  status: StatusCode,
  envelope: ApiResponse<R>,
) -> Result<R, TransportError> {
  if envelope.ok {
    return envelope
      .result
      .ok_or_else(|| TransportError::Rejected("response missing result".into()));
  }

  if let Some(retry_after_secs) =
    envelope.parameters.and_then(|p| p.retry_after)
  {
    return Err(TransportError::RateLimited { retry_after_secs });
  }

  let description = envelope
    .description
    .unwrap_or_else(|| status.to_string());
  // Bad Request covers every malformed-payload refusal (unparsable caption
  // markup, broken media, oversized upload); delivery switches strategy on
  // those instead of failing. Forbidden, Not Found and friends stay
  // permanent.
  if status == StatusCode::BAD_REQUEST
    || status == StatusCode::PAYLOAD_TOO_LARGE
    || description.to_lowercase().contains("too large")
  {
    Err(TransportError::PayloadRejected(description))
  } else {
    Err(TransportError::Rejected(description))
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  fn refusal(description: &str) -> ApiResponse<serde_json::Value> {
    ApiResponse {
      ok:          false,
      result:      None,
      description: Some(description.to_owned()),
      parameters:  None,
    }
  }

  #[test]
  fn bad_request_is_a_recoverable_payload_rejection() {
    let err = unwrap_envelope(
      StatusCode::BAD_REQUEST,
      refusal("Bad Request: can't parse entities: unclosed tag"),
    )
    .unwrap_err();
    assert!(matches!(err, TransportError::PayloadRejected(_)));
    assert!(err.is_recoverable());
  }

  #[test]
  fn oversized_payload_is_a_recoverable_payload_rejection() {
    let err = unwrap_envelope(
      StatusCode::PAYLOAD_TOO_LARGE,
      refusal("Request Entity Too Large"),
    )
    .unwrap_err();
    assert!(matches!(err, TransportError::PayloadRejected(_)));
  }

  #[test]
  fn forbidden_stays_a_permanent_rejection() {
    let err = unwrap_envelope(
      StatusCode::FORBIDDEN,
      refusal("Forbidden: bot was blocked by the user"),
    )
    .unwrap_err();
    assert!(matches!(err, TransportError::Rejected(_)));
    assert!(!err.is_recoverable());
  }

  #[test]
  fn retry_after_wins_over_status_classification() {
    let envelope = ApiResponse::<serde_json::Value> {
      ok:          false,
      result:      None,
      description: Some("Too Many Requests: retry after 7".to_owned()),
      parameters:  Some(ResponseParameters { retry_after: Some(7) }),
    };
    let err = unwrap_envelope(StatusCode::TOO_MANY_REQUESTS, envelope).unwrap_err();
    assert!(matches!(err, TransportError::RateLimited { retry_after_secs: 7 }));
  }

  #[test]
  fn ok_envelope_unwraps_the_result() {
    let envelope = ApiResponse {
      ok:          true,
      result:      Some(serde_json::json!({ "message_id": 5 })),
      description: None,
      parameters:  None,
    };
    let value = unwrap_envelope(StatusCode::OK, envelope).unwrap();
    assert_eq!(value["message_id"], 5);
  }
}
