//! Error types for `entbridge-core`.

use thiserror::Error;

use crate::flow::FormStep;

#[derive(Debug, Error)]
pub enum Error {
  /// A text answer was empty after trimming. The step must not advance.
  #[error("empty answer at step {0:?}")]
  EmptyAnswer(FormStep),

  /// A free-text answer arrived at a step that does not take text.
  #[error("step {0:?} does not accept a text answer")]
  NotATextStep(FormStep),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
