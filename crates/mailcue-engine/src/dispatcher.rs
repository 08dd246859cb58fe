//! Dispatch of a single qualifying (configuration, record) pair.
//!
//! The protocol is claim, fetch, render, send. The claim runs first so
//! that a crash at any later point leaves a pending row behind for the
//! next cycle to resume, and so that the store (not this code) is the
//! arbiter of whether the pair was already handled.

use std::future::Future;
use std::time::Duration;

use mailcue_model::{Configuration, Template};
use mailcue_render::Renderer;
use mailcue_source::SourceRecords;
use mailcue_store::{ClaimOutcome, StateStore};
use mailcue_transport::{Mailer, SendError};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{instrument, warn};

use crate::error::DispatchAbort;

/// Bounded-retry policy for transient send failures.
///
/// `max_attempts` bounds the total send calls for one qualifying event,
/// counted across process restarts through the attempt counter on the
/// pending row.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
  pub max_attempts: i32,
  pub base_delay: Duration,
  pub max_delay: Duration,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_attempts: 5,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(60),
    }
  }
}

impl RetryPolicy {
  /// Backoff before the attempt after `attempt` failures, doubling from
  /// the base and capped at the maximum.
  pub fn delay(&self, attempt: i32) -> Duration {
    let exponent = attempt.clamp(0, 16) as u32;
    self
      .base_delay
      .saturating_mul(1u32 << exponent)
      .min(self.max_delay)
  }
}

/// A (configuration, record) pair the evaluator qualified for delivery.
#[derive(Debug, Clone)]
pub struct QualifyingPair {
  pub configuration: Configuration,
  pub template: Template,
  pub external_id: String,
  pub record_id: String,
  pub trigger_value: String,
}

/// Terminal result of dispatching one qualifying pair.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
  /// The message was sent and the row marked sent.
  Sent { attempts: i32 },
  /// The store reported the pair already handled for this trigger value.
  Suppressed,
  /// The row was marked failed; no further sends until an operator
  /// reset or a changed trigger value.
  Failed { error: String },
  /// The source could not be read; the row stays pending and the
  /// dispatch resumes on a later cycle.
  Deferred { error: String },
}

/// Executes the claim, fetch, render, send protocol for one pair.
pub struct Dispatcher<'a, R, S, M>
where
  R: SourceRecords,
  S: StateStore,
  M: Mailer,
{
  records: &'a R,
  store: &'a S,
  mailer: &'a M,
  renderer: &'a Renderer,
  retry: RetryPolicy,
  send_timeout: Duration,
  fetch_timeout: Duration,
}

impl<'a, R, S, M> Dispatcher<'a, R, S, M>
where
  R: SourceRecords,
  S: StateStore,
  M: Mailer,
{
  pub fn new(
    records: &'a R,
    store: &'a S,
    mailer: &'a M,
    renderer: &'a Renderer,
    retry: RetryPolicy,
    send_timeout: Duration,
    fetch_timeout: Duration,
  ) -> Self {
    Self {
      records,
      store,
      mailer,
      renderer,
      retry,
      send_timeout,
      fetch_timeout,
    }
  }

  /// Dispatch one qualifying pair to a terminal outcome.
  ///
  /// Returns `Err` only when the store fails mid-protocol or the
  /// dispatch is cancelled; every other failure mode commits a state
  /// transition and comes back as a [`DispatchOutcome`].
  #[instrument(skip_all, fields(
    configuration = %pair.configuration.id,
    record = %pair.record_id,
  ))]
  pub async fn dispatch(
    &self,
    pair: &QualifyingPair,
    cancel: &CancellationToken,
  ) -> Result<DispatchOutcome, DispatchAbort> {
    let configuration_id = pair.configuration.id.as_str();
    let record_id = pair.record_id.as_str();

    let mut attempts = match self
      .store
      .claim(configuration_id, record_id, &pair.trigger_value)
      .await?
    {
      ClaimOutcome::Claimed { attempts } => attempts,
      ClaimOutcome::Suppressed => return Ok(DispatchOutcome::Suppressed),
    };

    // Render from the full record, not the thin change-detection rows.
    let record = match bounded_read(
      self.fetch_timeout,
      self.records.fetch_record(&pair.external_id, record_id),
    )
    .await
    {
      Ok(Some(record)) => record,
      Ok(None) => {
        let error = "record no longer present in source table".to_string();
        self.store.mark_failed(configuration_id, record_id, &error).await?;
        return Ok(DispatchOutcome::Failed { error });
      }
      Err(e) => {
        warn!(error = %e, "dispatch_deferred");
        return Ok(DispatchOutcome::Deferred { error: e.to_string() });
      }
    };

    let message = match self
      .renderer
      .render(&pair.configuration, &pair.template, &record)
      .await
    {
      Ok(message) => message,
      Err(e) => {
        let error = e.to_string();
        self.store.mark_failed(configuration_id, record_id, &error).await?;
        return Ok(DispatchOutcome::Failed { error });
      }
    };

    loop {
      if cancel.is_cancelled() {
        return Err(DispatchAbort::Cancelled);
      }
      // A resumed row may arrive with its retry budget already spent.
      if attempts >= self.retry.max_attempts {
        let error = "retry budget exhausted".to_string();
        self.store.mark_failed(configuration_id, record_id, &error).await?;
        return Ok(DispatchOutcome::Failed { error });
      }

      attempts += 1;
      let result = match timeout(self.send_timeout, self.mailer.send(&message)).await {
        Ok(result) => result,
        Err(_) => Err(SendError::Transient {
          message: format!("send timed out after {:?}", self.send_timeout),
        }),
      };

      match result {
        Ok(()) => {
          self.store.mark_sent(configuration_id, record_id).await?;
          return Ok(DispatchOutcome::Sent { attempts });
        }
        Err(e) if e.is_transient() => {
          let error = e.to_string();
          warn!(attempt = attempts, error = %error, "send_attempt_failed");
          // Recorded before the terminal transition so the stored
          // attempt count matches the send calls actually made.
          self.store.record_attempt(configuration_id, record_id, &error).await?;
          if attempts >= self.retry.max_attempts {
            self.store.mark_failed(configuration_id, record_id, &error).await?;
            return Ok(DispatchOutcome::Failed { error });
          }
          tokio::select! {
            _ = cancel.cancelled() => return Err(DispatchAbort::Cancelled),
            _ = sleep(self.retry.delay(attempts - 1)) => {}
          }
        }
        Err(e) => {
          let error = e.to_string();
          self.store.record_attempt(configuration_id, record_id, &error).await?;
          self.store.mark_failed(configuration_id, record_id, &error).await?;
          return Ok(DispatchOutcome::Failed { error });
        }
      }
    }
  }
}

/// Bound a configuration or source read.
///
/// A stalled adapter surfaces as a timed-out read error on the unit
/// that issued it instead of stalling the whole cycle.
pub(crate) async fn bounded_read<T, F>(
  limit: Duration,
  read: F,
) -> Result<T, mailcue_source::Error>
where
  F: Future<Output = Result<T, mailcue_source::Error>>,
{
  match timeout(limit, read).await {
    Ok(result) => result,
    Err(_) => Err(mailcue_source::Error::Io(std::io::Error::new(
      std::io::ErrorKind::TimedOut,
      format!("read timed out after {limit:?}"),
    ))),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_delay_doubles_from_base() {
    let policy = RetryPolicy {
      max_attempts: 5,
      base_delay: Duration::from_secs(1),
      max_delay: Duration::from_secs(60),
    };

    assert_eq!(policy.delay(0), Duration::from_secs(1));
    assert_eq!(policy.delay(1), Duration::from_secs(2));
    assert_eq!(policy.delay(3), Duration::from_secs(8));
  }

  #[test]
  fn test_delay_is_capped() {
    let policy = RetryPolicy::default();

    assert_eq!(policy.delay(10), Duration::from_secs(60));
    assert_eq!(policy.delay(16), Duration::from_secs(60));
  }

  #[test]
  fn test_default_policy_bounds_attempts() {
    assert_eq!(RetryPolicy::default().max_attempts, 5);
  }
}
