//! Rendering of the referral summary.
//!
//! Three views are produced from a draft + profile pair: the rich
//! (HTML-markup) form sent inline, a plain-text form written into the
//! archive, and a length-capped caption form that fits the transport's
//! caption limit.

use crate::{draft::Draft, profile::DentistProfile};

/// Hard cap on caption length, in characters.
pub const CAPTION_LIMIT: usize = 1024;

/// Name of the summary file placed first inside the archive.
pub const SUMMARY_FILENAME: &str = "00_summary.txt";

const CAPTION_SUFFIX: &str = " … (full text in 00_summary.txt)";

fn or_dash(field: Option<&str>) -> &str {
  field.unwrap_or("—")
}

// ─── Contact link ────────────────────────────────────────────────────────────

/// A clickable URL reaching the dentist directly: the public-handle deep link
/// when a handle is known, otherwise the id-based one.
pub fn contact_url(profile: &DentistProfile) -> Option<String> {
  match profile.handle.as_deref() {
    Some(handle) => Some(format!("https://t.me/{handle}")),
    None => Some(format!("tg://user?id={}", profile.user_id)),
  }
}

fn dentist_html(profile: &DentistProfile) -> String {
  let name = or_dash(profile.full_name.as_deref());
  match profile.handle.as_deref() {
    Some(handle) => {
      format!("{name} (<a href=\"https://t.me/{handle}\">@{handle}</a>)")
    }
    None => {
      format!("{name} (<a href=\"tg://user?id={}\">message</a>)", profile.user_id)
    }
  }
}

// ─── Views ───────────────────────────────────────────────────────────────────

/// The rich (markup) summary form.
pub fn render_rich(draft: &Draft, profile: &DentistProfile) -> String {
  format!(
    "<b>ENT consultation request</b>\n\
     <b>Complaints</b>: {complaints}\n\
     <b>History</b>: {history}\n\
     <b>Planned work</b>: {plan}\n\n\
     <b>Dentist</b>: {dentist}\n\
     Phone: {phone}; Workplace: {workplace}",
    complaints = or_dash(draft.complaints.as_deref()),
    history = or_dash(draft.history.as_deref()),
    plan = or_dash(draft.plan.as_deref()),
    dentist = dentist_html(profile),
    phone = or_dash(profile.phone.as_deref()),
    workplace = or_dash(profile.workplace.as_deref()),
  )
}

/// The plain-text form: markup stripped, anchors flattened to `url text`.
pub fn strip_markup(rich: &str) -> String {
  rich
    .replace("<b>", "")
    .replace("</b>", "")
    .replace("<a href=\"", "")
    .replace("\">", " ")
    .replace("</a>", "")
}

/// The caption form: at most [`CAPTION_LIMIT`] characters including the
/// "see the summary file" suffix.
///
/// Input at or under the cap passes through unchanged. Longer input is cut
/// to the remaining budget, backed off to the nearest preceding space so no
/// word is split, and suffixed.
pub fn capped_caption(rich: &str) -> String {
  if rich.chars().count() <= CAPTION_LIMIT {
    return rich.to_owned();
  }

  let budget = CAPTION_LIMIT - CAPTION_SUFFIX.chars().count();
  let cut_at = rich
    .char_indices()
    .nth(budget)
    .map(|(i, _)| i)
    .unwrap_or(rich.len());
  let mut cut = &rich[..cut_at];
  if let Some(space) = cut.rfind(' ') {
    cut = &cut[..space];
  }

  let mut caption = cut.trim_end().to_owned();
  caption.push_str(CAPTION_SUFFIX);
  caption
}

// ─── Tests ───────────────────────────────────────────────────────────────────
