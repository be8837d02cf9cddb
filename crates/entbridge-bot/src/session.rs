//! Per-user conversation sessions.
//!
//! Each identity gets one [`Session`] behind its own async lock. Arrival
//! order is enforced upstream by the per-user worker in the dispatcher; the
//! cell lock additionally serialises any direct callers. Two devices on one
//! identity are last-write-wins (known race, accepted).

use std::{collections::HashMap, sync::Arc};

use entbridge_core::{
  draft::Draft,
  flow::{FormStep, ProfileStep},
  profile::UserId,
};
use tokio::sync::Mutex;

/// Where one user currently is in the conversation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatState {
  #[default]
  Idle,
  /// Inside the consultation form.
  Form(FormStep),
  /// Inside the profile-editing path; earlier answers accumulate here until
  /// the final step writes them out in one patch.
  Profile {
    step:      ProfileStep,
    full_name: Option<String>,
    phone:     Option<String>,
  },
}

/// In-memory state for one user's conversation. The draft mirrors what the
/// store holds; the store is written through after every answered step.
#[derive(Debug, Clone, Default)]
pub struct Session {
  pub state: ChatState,
  pub draft: Draft,
}

/// Shared map of per-user sessions.
#[derive(Default)]
pub struct Sessions {
  inner: Mutex<HashMap<UserId, Arc<Mutex<Session>>>>,
}

impl Sessions {
  pub fn new() -> Self {
    Self::default()
  }

  /// The session cell for `user_id`, created on first contact. The caller
  /// locks the returned cell for the duration of one event.
  pub async fn entry(&self, user_id: UserId) -> Arc<Mutex<Session>> {
    let mut map = self.inner.lock().await;
    Arc::clone(map.entry(user_id).or_default())
  }

  /// Drop the session for `user_id`. The next event recreates it in the
  /// default (idle) state; anything persisted is untouched.
  pub async fn remove(&self, user_id: UserId) {
    self.inner.lock().await.remove(&user_id);
  }
}
