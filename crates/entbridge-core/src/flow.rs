//! The consultation form state machine.
//!
//! States are explicit tagged enums and all transition logic is pure — the
//! caller classifies raw transport input into typed signals first, then
//! dispatches through the functions here and performs the side effects
//! (persistence, delivery) that the returned values call for.

use crate::{
  draft::Draft,
  error::{Error, Result},
};

// ─── Steps ───────────────────────────────────────────────────────────────────

/// The five steps of the consultation form, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormStep {
  Complaints,
  History,
  Plan,
  Files,
  Confirm,
}

impl FormStep {
  /// True for the steps that take a free-text answer.
  pub fn takes_text(self) -> bool {
    matches!(self, Self::Complaints | Self::History | Self::Plan)
  }
}

/// The three steps of the independent profile-editing path, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileStep {
  Name,
  Phone,
  Workplace,
}

impl ProfileStep {
  /// The step after this one; `None` when the path is finished.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::Name => Some(Self::Phone),
      Self::Phone => Some(Self::Workplace),
      Self::Workplace => None,
    }
  }
}

// ─── Signals ─────────────────────────────────────────────────────────────────

/// The four signals accepted at [`FormStep::Confirm`]. Each produces a
/// disjoint side effect; see [`confirm_transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmSignal {
  Submit,
  Cancel,
  Restart,
  Resume,
}

/// What the dispatcher must do after a confirm signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
  /// Assemble and deliver the bundle, append a log entry, clear the draft.
  /// The conversation ends.
  Deliver,
  /// Clear the draft. The conversation ends.
  Discard,
  /// Clear the draft, reset the in-memory draft, and re-enter at
  /// [`FormStep::Complaints`].
  StartOver,
  /// No mutation; continue at the contained step.
  Continue(FormStep),
}

// ─── Transitions ─────────────────────────────────────────────────────────────

/// Where a "start new consultation" lands: a started draft is offered for
/// resumption at the confirm step; otherwise the form begins at the top.
pub fn entry_step(draft: &Draft) -> FormStep {
  if draft.is_started() { FormStep::Confirm } else { FormStep::Complaints }
}

/// The first step whose field is still unanswered, skipping steps already
/// answered. Re-entry is idempotent: resuming never re-asks a filled field.
/// Falls through to [`FormStep::Files`] when all text fields are set.
pub fn first_unfilled_step(draft: &Draft) -> FormStep {
  if draft.complaints.is_none() {
    FormStep::Complaints
  } else if draft.history.is_none() {
    FormStep::History
  } else if draft.plan.is_none() {
    FormStep::Plan
  } else {
    FormStep::Files
  }
}

/// Store a trimmed text answer into the draft field for `step` and return the
/// step to advance to. The caller persists the draft before prompting for the
/// next step, and must not advance if persistence fails.
///
/// Empty-after-trim input is rejected: the draft is untouched and the step
/// re-prompts.
pub fn apply_text(draft: &mut Draft, step: FormStep, text: &str) -> Result<FormStep> {
  let answer = text.trim();
  if answer.is_empty() {
    return Err(Error::EmptyAnswer(step));
  }

  match step {
    FormStep::Complaints => {
      draft.complaints = Some(answer.to_owned());
      Ok(FormStep::History)
    }
    FormStep::History => {
      draft.history = Some(answer.to_owned());
      Ok(FormStep::Plan)
    }
    FormStep::Plan => {
      draft.plan = Some(answer.to_owned());
      Ok(FormStep::Files)
    }
    FormStep::Files | FormStep::Confirm => Err(Error::NotATextStep(step)),
  }
}

/// Resolve a confirm-step signal into the side effects the dispatcher must
/// perform.
pub fn confirm_transition(draft: &Draft, signal: ConfirmSignal) -> ConfirmOutcome {
  match signal {
    ConfirmSignal::Submit => ConfirmOutcome::Deliver,
    ConfirmSignal::Cancel => ConfirmOutcome::Discard,
    ConfirmSignal::Restart => ConfirmOutcome::StartOver,
    ConfirmSignal::Resume => ConfirmOutcome::Continue(first_unfilled_step(draft)),
  }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
