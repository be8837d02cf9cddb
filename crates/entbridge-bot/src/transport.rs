//! The transport boundary the core logic calls into.
//!
//! The concrete chat transport (see [`crate::telegram`]) is a black box
//! behind the [`Transport`] trait: file metadata lookup, file download, and
//! the three send operations. Errors are classified so the assembler can
//! decide between propagating and falling back to an alternate delivery
//! strategy.

use std::future::Future;

use bytes::Bytes;
use entbridge_core::draft::AttachmentKind;
use thiserror::Error;

// ─── Identifiers ─────────────────────────────────────────────────────────────

/// A chat the transport can deliver messages to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

impl std::fmt::Display for ChatId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

// ─── Payload types ───────────────────────────────────────────────────────────

/// Metadata for a file held by the transport layer.
#[derive(Debug, Clone)]
pub struct FileInfo {
  pub file_ref: String,
  /// `None` when the transport does not report a size; callers treat that
  /// as zero when summing against the archive threshold.
  pub size:     Option<u64>,
  /// Transport-internal download locator, when one exists.
  pub path:     Option<String>,
}

/// A document uploaded as bytes.
#[derive(Debug)]
pub struct OutgoingDocument<'a> {
  pub bytes:       Bytes,
  pub filename:    &'a str,
  pub caption:     &'a str,
  pub link_button: Option<LinkButton<'a>>,
}

/// One slot of a grouped-media send, referencing media the transport
/// already holds.
#[derive(Debug)]
pub struct OutgoingMedia<'a> {
  pub file_ref: &'a str,
  pub kind:     AttachmentKind,
  pub caption:  Option<&'a str>,
}

/// A clickable URL affordance attached to a message.
#[derive(Debug, Clone, Copy)]
pub struct LinkButton<'a> {
  pub label: &'a str,
  pub url:   &'a str,
}

/// Which reply keyboard a prompt carries. The labels behind each variant are
/// presentation detail owned by [`crate::ui`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyboard {
  /// The persistent main menu.
  Main,
  /// A single "Done" button for the attachment step.
  Done,
  /// Submit / cancel / start-over choices at the confirm step.
  Confirm,
  /// Continue / start-over choices when an unfinished draft is found.
  Resume,
  /// Remove any reply keyboard.
  Remove,
}

/// Per-message send options.
#[derive(Debug, Default, Clone, Copy)]
pub struct SendOptions<'a> {
  /// Render the text with markup (HTML) instead of plain.
  pub rich:        bool,
  pub keyboard:    Option<Keyboard>,
  pub link_button: Option<LinkButton<'a>>,
}

impl<'a> SendOptions<'a> {
  pub fn plain() -> Self {
    Self::default()
  }

  pub fn rich() -> Self {
    Self { rich: true, ..Self::default() }
  }

  pub fn with_keyboard(keyboard: Keyboard) -> Self {
    Self { keyboard: Some(keyboard), ..Self::default() }
  }

  pub fn rich_with_keyboard(keyboard: Keyboard) -> Self {
    Self { rich: true, keyboard: Some(keyboard), ..Self::default() }
  }
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TransportError {
  #[error("request timed out")]
  Timeout,

  #[error("rate limited, retry after {retry_after_secs}s")]
  RateLimited { retry_after_secs: u64 },

  /// The transport refused the payload (too large, malformed media or
  /// markup). Another delivery strategy may still get through.
  #[error("payload rejected: {0}")]
  PayloadRejected(String),

  /// Any other permanent rejection (forbidden chat, revoked token).
  #[error("request rejected: {0}")]
  Rejected(String),

  #[error("network error: {0}")]
  Network(String),
}

impl TransportError {
  /// Errors a delivery attempt may recover from by switching strategy:
  /// transient failures and payload rejections. Other permanent rejections
  /// and raw network failures propagate.
  pub fn is_recoverable(&self) -> bool {
    matches!(
      self,
      Self::Timeout | Self::RateLimited { .. } | Self::PayloadRejected(_)
    )
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over the chat transport.
///
/// All methods return `Send` futures so implementations can be driven from
/// multi-threaded async runtimes.
pub trait Transport: Send + Sync {
  /// Resolve a file reference to its metadata without downloading content.
  fn file_info<'a>(
    &'a self,
    file_ref: &'a str,
  ) -> impl Future<Output = Result<FileInfo, TransportError>> + Send + 'a;

  /// Download the bytes behind previously-resolved metadata.
  fn download<'a>(
    &'a self,
    info: &'a FileInfo,
  ) -> impl Future<Output = Result<Bytes, TransportError>> + Send + 'a;

  /// Deliver one document with a caption.
  fn send_document<'a>(
    &'a self,
    chat: ChatId,
    document: OutgoingDocument<'a>,
  ) -> impl Future<Output = Result<(), TransportError>> + Send + 'a;

  /// Deliver one batch of grouped media (at most the transport's batch
  /// ceiling; the assembler enforces it).
  fn send_media_group<'a>(
    &'a self,
    chat: ChatId,
    items: &'a [OutgoingMedia<'a>],
  ) -> impl Future<Output = Result<(), TransportError>> + Send + 'a;

  /// Deliver a text message.
  fn send_message<'a>(
    &'a self,
    chat: ChatId,
    text: &'a str,
    options: SendOptions<'a>,
  ) -> impl Future<Output = Result<(), TransportError>> + Send + 'a;
}
