//! entbridge service crate.
//!
//! Drives the referral-intake conversation over a chat transport, persists
//! drafts through [`entbridge_core::store::ReferralStore`], and hands
//! completed drafts to the bundle assembler for delivery to the configured
//! ENT consultant chat.

pub mod assembler;
pub mod dispatch;
pub mod error;
pub mod session;
pub mod telegram;
pub mod transport;
pub mod ui;

pub use error::{Error, Result};

use std::path::PathBuf;

use serde::Deserialize;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `config.toml` and `ENTBRIDGE_*`
/// environment variables.
#[derive(Deserialize, Clone)]
pub struct BotConfig {
  pub bot_token:      String,
  /// Chat the assembled bundle is delivered to.
  pub target_chat_id: i64,
  #[serde(default = "default_store_path")]
  pub store_path:     PathBuf,
  /// Above this total attachment size the archive path is skipped in favour
  /// of grouped media.
  #[serde(default = "default_max_archive_mib")]
  pub max_archive_mib: u64,
  #[serde(default = "default_poll_timeout_secs")]
  pub poll_timeout_secs: u64,
}

impl BotConfig {
  pub fn max_archive_bytes(&self) -> u64 {
    self.max_archive_mib * 1024 * 1024
  }
}

fn default_store_path() -> PathBuf { PathBuf::from("entbridge.db") }
fn default_max_archive_mib() -> u64 { 47 }
fn default_poll_timeout_secs() -> u64 { 50 }

#[cfg(test)]
mod tests;
