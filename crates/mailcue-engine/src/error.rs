//! Error types for the trigger engine.

use thiserror::Error;

/// Errors that abort an entire poll cycle.
///
/// Per-pair and per-configuration failures are not here: they are
/// isolated and reported through the cycle report's audit entries.
#[derive(Debug, Error)]
pub enum CycleError {
  /// The configuration snapshot could not be loaded.
  #[error("failed to load configuration snapshot: {source}")]
  ConfigLoad {
    #[source]
    source: mailcue_source::Error,
  },

  /// The trigger state store failed. Without it at-most-once cannot be
  /// guaranteed, so the cycle stops and the next scheduled cycle retries.
  #[error("state store unavailable: {0}")]
  Store(#[from] mailcue_store::Error),

  /// The cycle was cancelled.
  #[error("cycle cancelled")]
  Cancelled,
}

/// Errors that abort a single dispatch mid-protocol.
///
/// Everything else a dispatch can hit (render failure, exhausted
/// retries, permanent transport rejection) commits a terminal state
/// transition and comes back as a [`DispatchOutcome`] instead.
///
/// [`DispatchOutcome`]: crate::DispatchOutcome
#[derive(Debug, Error)]
pub enum DispatchAbort {
  /// The trigger state store failed mid-dispatch.
  #[error("state store unavailable: {0}")]
  Store(#[from] mailcue_store::Error),

  /// The dispatch was cancelled before reaching a terminal transition;
  /// the row stays pending and resumes on a later cycle.
  #[error("dispatch cancelled")]
  Cancelled,
}
