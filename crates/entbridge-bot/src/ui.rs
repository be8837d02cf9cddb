//! Presentation strings and input classification.
//!
//! All button labels and prompts live here, and raw user text is mapped to
//! typed signals before any transition logic runs — the state machine in
//! `entbridge-core` never sees a menu label.

use entbridge_core::flow::{ConfirmSignal, FormStep, ProfileStep};

// ─── Labels ──────────────────────────────────────────────────────────────────

pub mod labels {
  pub const NEW_CONSULTATION: &str = "🆕 New consultation";
  pub const EDIT_PROFILE: &str = "✍️ Edit profile";
  pub const MY_DETAILS: &str = "ℹ️ My details";
  pub const SUBMIT: &str = "✅ Send";
  pub const CANCEL: &str = "❌ Cancel";
  pub const RESTART: &str = "🔄 Start over";
  pub const RESUME: &str = "▶️ Continue";
  pub const DONE: &str = "Done";
  pub const CONTACT_DENTIST: &str = "💬 Message the dentist";
}

// ─── Classification ──────────────────────────────────────────────────────────

/// Strip any emoji prefix and fold case, so "✅ Send", "Send" and "send" all
/// classify the same way.
fn normalize(text: &str) -> String {
  text
    .trim()
    .chars()
    .skip_while(|c| !c.is_alphanumeric())
    .collect::<String>()
    .to_lowercase()
}

fn matches_label(text: &str, label: &str) -> bool {
  normalize(text) == normalize(label)
}

/// Top-level menu choices available from the idle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuAction {
  NewConsultation,
  EditProfile,
  MyDetails,
}

pub fn menu_action(text: &str) -> Option<MenuAction> {
  if matches_label(text, labels::NEW_CONSULTATION) {
    Some(MenuAction::NewConsultation)
  } else if matches_label(text, labels::EDIT_PROFILE) {
    Some(MenuAction::EditProfile)
  } else if matches_label(text, labels::MY_DETAILS) {
    Some(MenuAction::MyDetails)
  } else {
    None
  }
}

pub fn confirm_signal(text: &str) -> Option<ConfirmSignal> {
  if matches_label(text, labels::SUBMIT) {
    Some(ConfirmSignal::Submit)
  } else if matches_label(text, labels::CANCEL) {
    Some(ConfirmSignal::Cancel)
  } else if matches_label(text, labels::RESTART) {
    Some(ConfirmSignal::Restart)
  } else if matches_label(text, labels::RESUME) {
    Some(ConfirmSignal::Resume)
  } else {
    None
  }
}

pub fn is_done(text: &str) -> bool {
  matches_label(text, labels::DONE)
}

// ─── Commands ────────────────────────────────────────────────────────────────

/// Slash commands accepted as conversation entry points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
  Start,
  Fill,
  New,
  Me,
  List,
  View(String),
  Cancel,
}

/// Parse a `/command` message, tolerating a `@botname` suffix and one
/// trailing argument.
pub fn parse_command(text: &str) -> Option<Command> {
  let text = text.trim();
  if !text.starts_with('/') {
    return None;
  }

  let mut parts = text.splitn(2, char::is_whitespace);
  let head = parts.next()?;
  let arg = parts.next().map(str::trim).unwrap_or("");
  let name = head[1..].split('@').next()?;

  match name {
    "start" => Some(Command::Start),
    "fill" => Some(Command::Fill),
    "new" => Some(Command::New),
    "me" => Some(Command::Me),
    "list" => Some(Command::List),
    "view" => Some(Command::View(arg.to_owned())),
    "cancel" => Some(Command::Cancel),
    _ => None,
  }
}

// ─── Prompts ─────────────────────────────────────────────────────────────────

pub fn prompt_for_step(step: FormStep) -> &'static str {
  match step {
    FormStep::Complaints => "1/4. Patient complaints:",
    FormStep::History => "2/4. History / relevant background (brief):",
    FormStep::Plan => "3/4. Planned dental work:",
    FormStep::Files => {
      "4/4. Attach scans/files (several allowed). Press “Done” when finished."
    }
    FormStep::Confirm => "Please confirm the request.",
  }
}

pub fn prompt_for_profile_step(step: ProfileStep) -> &'static str {
  match step {
    ProfileStep::Name => "🦷 Let's fill in your profile.\nEnter your full name:",
    ProfileStep::Phone => "Enter your phone number (any convenient format):",
    ProfileStep::Workplace => "Enter your workplace (clinic, city):",
  }
}

pub const GREETING: &str = "Hello! Please describe the complaints, history and \
your planned work, and attach CT scans in coronal and sagittal projection 📑";

pub const GREETING_BLANK_PROFILE: &str = "Your profile looks empty ✍🏼\n\
Please fill in your details, then start a new consultation ⬇️";

pub const GREETING_KNOWN_PROFILE: &str =
  "Check your details and start a new consultation ⬇️";

pub const RESUME_QUESTION: &str =
  "You have an unfinished consultation. Continue?";

pub const EMPTY_ANSWER: &str = "Please enter a non-empty answer.";

pub const FILE_ADDED: &str = "File added. Attach another or press “Done”.";

pub const FILES_ONLY_HINT: &str =
  "Attachments are accepted at step 4/4 of a consultation.";

pub const SUBMITTED: &str = "✅ Request sent to the ENT consultant.";

pub const CANCELLED: &str = "❌ Cancelled.";

pub const ABORTED: &str =
  "Stopped. Your draft is kept — start a new consultation to resume it.";

pub const RESTARTING: &str = "Starting over.";

pub const CONTINUING: &str = "Continuing where you left off.";

pub const PROFILE_SAVED: &str = "✅ Profile saved.";

pub const NO_SUBMISSIONS: &str = "You have no submitted requests yet.";

pub const SUBMISSION_NOT_FOUND: &str = "Request not found.";

pub const CHOOSE_ACTION: &str = "Choose an action from the menu ⬇️";

pub const APOLOGY: &str = "Something went wrong. Please try again.";

pub const CONTACT_PROMPT: &str = "Contact the dentist:";

// ─── Tests ───────────────────────────────────────────────────────────────────
