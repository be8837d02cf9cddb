//! Draft — the in-progress, not-yet-submitted consultation form.
//!
//! At most one draft exists per identity. Presence of a draft does not imply
//! completeness; any subset of fields may still be empty. The store writes
//! through after every answered step, so an interruption loses at most the
//! in-flight field.

use serde::{Deserialize, Serialize};

/// What kind of media an attachment reference points at. Determines the
/// container subtype when attachments are grouped, and the file extension
/// used inside an archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
  Photo,
  Document,
}

/// An opaque handle to binary media held by the transport layer.
/// No byte content is ever persisted by the store — only the handle and a
/// kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachmentRef {
  pub file_ref: String,
  pub kind:     AttachmentKind,
}

/// An in-progress consultation form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
  pub complaints:  Option<String>,
  pub history:     Option<String>,
  pub plan:        Option<String>,
  /// Insertion order is significant: the first attachment's slot carries the
  /// caption when the bundle is delivered as grouped media.
  pub attachments: Vec<AttachmentRef>,
}

impl Draft {
  /// True once the dentist has answered anything worth resuming — the first
  /// question, or at least one attachment.
  pub fn is_started(&self) -> bool {
    self.complaints.is_some() || !self.attachments.is_empty()
  }
}
