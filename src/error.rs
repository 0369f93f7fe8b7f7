//! Error kinds surfaced by the play loop and its collaborators.

use thiserror::Error;

use crate::domain::Theme;

#[derive(Debug, Error)]
pub enum GameError {
  /// Local fixture/config state is inconsistent (e.g. answer index out of range).
  /// Raised before any network call.
  #[error("Invalid query configuration: {0}")]
  InvalidLocalConfiguration(String),

  /// Non-2xx or malformed JSON from the validation backend. Carries the
  /// backend's own message when it sent one.
  #[error("{0}")]
  ValidationBackend(String),

  /// Generation service answered without a completion.
  #[error("Text generation returned an unexpected result: {0}")]
  UpstreamFormat(String),

  /// Generation service answered with a non-2xx status.
  #[error("Text generation HTTP {status}: {message}")]
  Upstream { status: u16, message: String },

  /// The request never produced a response (DNS, connect, body read...).
  #[error("Request failed: {0}")]
  Transport(String),

  #[error("No query fixture for theme '{theme}' and concept '{concept}'")]
  FixtureMissing { theme: Theme, concept: String },

  #[error("Text generation is not configured")]
  GeneratorDisabled,

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Unknown session: {0}")]
  UnknownSession(String),

  #[error("Please select at least one concept to continue.")]
  EmptyConcepts,
}

impl From<reqwest::Error> for GameError {
  fn from(e: reqwest::Error) -> Self {
    GameError::Transport(e.to_string())
  }
}
