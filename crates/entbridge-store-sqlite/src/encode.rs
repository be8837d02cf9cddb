//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, attachment lists as compact
//! JSON arrays, statuses as lowercase keywords.

use chrono::{DateTime, Utc};
use entbridge_core::{
  draft::{AttachmentRef, Draft},
  profile::{DentistProfile, UserId},
  submission::{SubmissionEntry, SubmissionStatus},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Attachments ─────────────────────────────────────────────────────────────

pub fn encode_attachments(atts: &[AttachmentRef]) -> Result<String> {
  Ok(serde_json::to_string(atts)?)
}

pub fn decode_attachments(s: &str) -> Result<Vec<AttachmentRef>> {
  Ok(serde_json::from_str(s)?)
}

// ─── SubmissionStatus ────────────────────────────────────────────────────────

pub fn encode_status(status: SubmissionStatus) -> &'static str {
  match status {
    SubmissionStatus::Sent => "sent",
  }
}

pub fn decode_status(s: &str) -> Result<SubmissionStatus> {
  match s {
    "sent" => Ok(SubmissionStatus::Sent),
    other => Err(Error::UnknownStatus(other.to_owned())),
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `dentists` row.
pub struct RawProfile {
  pub user_id:   i64,
  pub full_name: Option<String>,
  pub phone:     Option<String>,
  pub workplace: Option<String>,
  pub handle:    Option<String>,
}

impl RawProfile {
  pub fn into_profile(self) -> DentistProfile {
    DentistProfile {
      user_id:   UserId(self.user_id),
      full_name: self.full_name,
      phone:     self.phone,
      workplace: self.workplace,
      handle:    self.handle,
    }
  }
}

/// Raw values read directly from a `drafts` row.
pub struct RawDraft {
  pub complaints:  Option<String>,
  pub history:     Option<String>,
  pub plan:        Option<String>,
  /// `None` when the column was added after the row was written.
  pub attachments: Option<String>,
}

impl RawDraft {
  pub fn into_draft(self) -> Result<Draft> {
    let attachments = match self.attachments.as_deref() {
      Some(json) => decode_attachments(json)?,
      None => vec![],
    };
    Ok(Draft {
      complaints: self.complaints,
      history: self.history,
      plan: self.plan,
      attachments,
    })
  }
}

/// Raw values read directly from a `submissions` row.
pub struct RawSubmission {
  pub submission_id: i64,
  pub user_id:       i64,
  pub status:        String,
  pub created_at:    String,
}

impl RawSubmission {
  pub fn into_entry(self) -> Result<SubmissionEntry> {
    Ok(SubmissionEntry {
      submission_id: self.submission_id,
      user_id:       UserId(self.user_id),
      status:        decode_status(&self.status)?,
      created_at:    decode_dt(&self.created_at)?,
    })
  }
}
