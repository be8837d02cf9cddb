//! The `ReferralStore` trait.
//!
//! The trait is implemented by storage backends (e.g.
//! `entbridge-store-sqlite`). The bot crate depends on this abstraction, not
//! on any concrete backend. Every operation is a single-row read-modify-write
//! or a single insert/delete; no multi-step transaction spans a user-visible
//! step.

use std::future::Future;

use crate::{
  draft::Draft,
  profile::{DentistProfile, ProfilePatch, UserId},
  submission::{SubmissionEntry, SubmissionStatus},
};

/// Abstraction over the referral persistence backend.
///
/// All methods return `Send` futures so the trait can be used from
/// multi-threaded async runtimes.
pub trait ReferralStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  /// Merge `patch` over the stored profile row (creating it if absent) and
  /// return the resulting profile. `None` fields in the patch preserve
  /// whatever is already stored.
  fn upsert_profile(
    &self,
    user_id: UserId,
    patch: ProfilePatch,
  ) -> impl Future<Output = Result<DentistProfile, Self::Error>> + Send + '_;

  /// Fetch the profile for `user_id`. Identities with no stored row get an
  /// empty profile rather than an error.
  fn get_profile(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<DentistProfile, Self::Error>> + Send + '_;

  // ── Drafts ────────────────────────────────────────────────────────────

  /// Idempotent upsert of the one draft row for `user_id`. Called after
  /// every answered step (write-through).
  fn save_draft(
    &self,
    user_id: UserId,
    draft: Draft,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Load the draft for `user_id`; an empty draft when no row exists.
  fn load_draft(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Draft, Self::Error>> + Send + '_;

  /// Delete the draft row for `user_id`. Deleting a missing row is not an
  /// error.
  fn clear_draft(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Submission log — append-only ──────────────────────────────────────

  /// Append one log entry and return it with its store-assigned id and
  /// timestamp.
  fn append_submission(
    &self,
    user_id: UserId,
    status: SubmissionStatus,
  ) -> impl Future<Output = Result<SubmissionEntry, Self::Error>> + Send + '_;

  /// All log entries for `user_id`, newest first.
  fn list_submissions(
    &self,
    user_id: UserId,
  ) -> impl Future<Output = Result<Vec<SubmissionEntry>, Self::Error>> + Send + '_;

  /// Look up a single log entry by its identifier. `None` if not found.
  fn get_submission(
    &self,
    submission_id: i64,
  ) -> impl Future<Output = Result<Option<SubmissionEntry>, Self::Error>> + Send + '_;
}
