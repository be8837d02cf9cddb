//! Submission log entries — immutable records of completed referrals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::profile::UserId;

/// Outcome recorded for a submitted consultation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubmissionStatus {
  Sent,
}

/// One row in the append-only submission log. Created exactly once per
/// successful submission; never mutated or deleted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionEntry {
  /// Monotonic, store-assigned identifier.
  pub submission_id: i64,
  pub user_id:       UserId,
  pub status:        SubmissionStatus,
  pub created_at:    DateTime<Utc>,
}
