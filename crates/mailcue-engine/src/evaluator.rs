//! Trigger qualification.
//!
//! The qualification rule is a pure function of (previous value, current
//! value, prior trigger state) so it can be tested in isolation. The
//! orchestrator assembles the candidate pairs and calls [`decide`] for
//! each; the store's atomic claim re-checks the terminal-state cases
//! under concurrency.

use mailcue_model::{Configuration, field_is_blank};
use mailcue_store::{TriggerState, TriggerStatus};

/// The trigger shape bound to a configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerPolicy {
  /// Fire when the field transitions from blank to non-blank.
  RisingEdge,
  /// Fire while the field is blank (suppressed after the first send
  /// until the observed value changes).
  OnBlank,
}

impl TriggerPolicy {
  pub fn for_configuration(configuration: &Configuration) -> Self {
    if configuration.trigger_on_blank {
      TriggerPolicy::OnBlank
    } else {
      TriggerPolicy::RisingEdge
    }
  }
}

/// Outcome of evaluating one (configuration, record) candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  /// Not a qualifying event this cycle.
  Skip,
  /// A new qualifying event: claim and dispatch.
  Fire,
  /// A dispatch interrupted in a previous cycle: continue it without
  /// counting a new event.
  Resume,
}

/// Decide whether a candidate qualifies for delivery.
///
/// Terminal prior states suppress the pair unless the current value
/// differs from the snapshot the state was recorded with. A later
/// transition is a new event, for sent and failed rows alike.
pub fn decide(
  policy: TriggerPolicy,
  previous: Option<&str>,
  current: &str,
  prior: Option<&TriggerState>,
) -> Decision {
  if let Some(state) = prior {
    match state.status {
      TriggerStatus::Pending => return Decision::Resume,
      TriggerStatus::Sent | TriggerStatus::Failed => {
        if state.snapshot == current {
          return Decision::Skip;
        }
      }
    }
  }

  let qualifies = match policy {
    TriggerPolicy::RisingEdge => field_is_blank(previous) && !field_is_blank(Some(current)),
    TriggerPolicy::OnBlank => field_is_blank(Some(current)),
  };

  if qualifies { Decision::Fire } else { Decision::Skip }
}
