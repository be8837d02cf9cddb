//! Dentist profile — who is sending the referral.
//!
//! One profile per transport identity; fields stay absent until the dentist
//! fills them in. Profiles are created on first contact and never deleted.

use serde::{Deserialize, Serialize};

/// Stable identity assigned by the chat transport.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl std::fmt::Display for UserId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

/// The stored profile row for one dentist.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DentistProfile {
  pub user_id:   UserId,
  pub full_name: Option<String>,
  pub phone:     Option<String>,
  pub workplace: Option<String>,
  /// Public handle on the chat transport, without the leading `@`.
  pub handle:    Option<String>,
}

impl DentistProfile {
  /// A profile with no fields filled in, as returned for unknown identities.
  pub fn empty(user_id: UserId) -> Self {
    Self {
      user_id,
      full_name: None,
      phone: None,
      workplace: None,
      handle: None,
    }
  }

  /// True when the dentist has not filled in anything yet.
  pub fn is_blank(&self) -> bool {
    self.full_name.is_none() && self.phone.is_none() && self.workplace.is_none()
  }
}

/// Partial profile update. `None` fields leave the stored value untouched.
#[derive(Debug, Clone, Default)]
pub struct ProfilePatch {
  pub full_name: Option<String>,
  pub phone:     Option<String>,
  pub workplace: Option<String>,
  pub handle:    Option<String>,
}

impl ProfilePatch {
  /// A patch that only refreshes the transport handle.
  pub fn handle_only(handle: Option<String>) -> Self {
    Self { handle, ..Self::default() }
  }
}
