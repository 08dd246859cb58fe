//! Poll-cycle orchestration.
//!
//! One `run_cycle` call polls every active configuration exactly once:
//! load the configuration snapshot, fetch and diff each watched table,
//! evaluate candidates, dispatch qualifying pairs concurrently, then
//! replace the stored snapshots. Faults in one configuration (broken
//! links, unreachable tables, render or send failures) are recorded in
//! the cycle report and never stop the others; only state store
//! failures and cancellation abort a cycle.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

use futures::future::join_all;
use mailcue_model::{Configuration, SourceRecord, SourceTable, Template};
use mailcue_render::Renderer;
use mailcue_source::{ConfigSnapshot, ConfigStore, SourceRecords};
use mailcue_store::{FieldSnapshot, StateStore};
use mailcue_transport::Mailer;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::detector::{detect, to_snapshots};
use crate::dispatcher::{
  DispatchOutcome, Dispatcher, QualifyingPair, RetryPolicy, bounded_read,
};
use crate::error::{CycleError, DispatchAbort};
use crate::evaluator::{Decision, TriggerPolicy, decide};
use crate::report::{AuditEntry, CycleReport};

/// Tuning knobs for a cycle's external calls.
#[derive(Debug, Clone, Copy)]
pub struct CycleOptions {
  pub retry: RetryPolicy,
  /// Bound on each mail transport call.
  pub send_timeout: Duration,
  /// Bound on each configuration or source table read.
  pub fetch_timeout: Duration,
}

impl Default for CycleOptions {
  fn default() -> Self {
    Self {
      retry: RetryPolicy::default(),
      send_timeout: Duration::from_secs(30),
      fetch_timeout: Duration::from_secs(30),
    }
  }
}

/// A candidate pair awaiting a trigger decision.
struct Candidate {
  record_id: String,
  previous: Option<String>,
  current: String,
}

/// Runs poll cycles over a fixed set of collaborators.
pub struct Orchestrator<C, R, S, M>
where
  C: ConfigStore,
  R: SourceRecords,
  S: StateStore,
  M: Mailer,
{
  configs: C,
  records: R,
  store: S,
  mailer: M,
  renderer: Renderer,
  options: CycleOptions,
}

impl<C, R, S, M> Orchestrator<C, R, S, M>
where
  C: ConfigStore,
  R: SourceRecords,
  S: StateStore,
  M: Mailer,
{
  pub fn new(
    configs: C,
    records: R,
    store: S,
    mailer: M,
    renderer: Renderer,
    options: CycleOptions,
  ) -> Self {
    Self {
      configs,
      records,
      store,
      mailer,
      renderer,
      options,
    }
  }

  /// Run one poll cycle to completion.
  #[instrument(skip_all)]
  pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<CycleReport, CycleError> {
    let mut report = CycleReport::new(Uuid::new_v4().to_string());
    info!(cycle = %report.cycle_id, "cycle_started");

    let snapshot = bounded_read(self.options.fetch_timeout, self.configs.load())
      .await
      .map_err(|source| CycleError::ConfigLoad { source })?;

    let active = snapshot.active_configurations();
    report.configurations = active.len();

    // Split off configurations with broken links or unknown fields; they
    // produce an audit entry instead of poisoning the cycle.
    let mut by_table: BTreeMap<&str, Vec<(&Configuration, &Template)>> = BTreeMap::new();
    for configuration in active {
      match validate(configuration, &snapshot) {
        Ok(template) => {
          by_table
            .entry(configuration.source_table_id.as_str())
            .or_default()
            .push((configuration, template));
        }
        Err(error) => {
          warn!(configuration = %configuration.id, %error, "configuration_invalid");
          report.audit.push(AuditEntry {
            configuration_id: configuration.id.clone(),
            configuration_name: configuration.name.clone(),
            record_id: None,
            error,
          });
        }
      }
    }

    let mut pairs: Vec<QualifyingPair> = Vec::new();
    let mut replacements: Vec<(String, Vec<String>, Vec<FieldSnapshot>)> = Vec::new();

    for (table_id, group) in &by_table {
      if cancel.is_cancelled() {
        return Err(CycleError::Cancelled);
      }

      // Unwrap is safe: validate checked the link.
      let table = snapshot.table(table_id).unwrap();

      let mut watched: Vec<String> = group
        .iter()
        .map(|(c, _)| c.trigger_field.clone())
        .collect();
      watched.sort();
      watched.dedup();

      let records = match bounded_read(
        self.options.fetch_timeout,
        self.records.fetch_fields(&table.external_id, &watched),
      )
      .await
      {
        Ok(records) => records,
        Err(e) => {
          warn!(table = %table.id, error = %e, "table_fetch_failed");
          for (configuration, _) in group {
            report.audit.push(AuditEntry {
              configuration_id: configuration.id.clone(),
              configuration_name: configuration.name.clone(),
              record_id: None,
              error: format!("source table unreachable: {e}"),
            });
          }
          continue;
        }
      };

      let previous = self.store.load_snapshots(&table.id).await?;
      let changes = detect(&previous, &records, &watched);

      let prior_values: HashMap<(&str, &str), &str> = previous
        .iter()
        .map(|s| ((s.field.as_str(), s.record_id.as_str()), s.value.as_str()))
        .collect();
      let records_by_id: HashMap<&str, &SourceRecord> =
        records.iter().map(|r| (r.id.as_str(), r)).collect();

      for (configuration, template) in group {
        let policy = TriggerPolicy::for_configuration(configuration);
        let mut candidates: Vec<Candidate> = Vec::new();

        match policy {
          // Level-triggered: every record is a candidate while blank.
          TriggerPolicy::OnBlank => {
            for record in &records {
              let field = configuration.trigger_field.as_str();
              candidates.push(Candidate {
                record_id: record.id.clone(),
                previous: prior_values
                  .get(&(field, record.id.as_str()))
                  .map(|v| v.to_string()),
                current: record.field(field).unwrap_or("").to_string(),
              });
            }
          }
          // Edge-triggered: only records whose trigger field changed,
          // plus pending rows left by an interrupted cycle.
          TriggerPolicy::RisingEdge => {
            for change in changes
              .iter()
              .filter(|c| c.field == configuration.trigger_field)
            {
              candidates.push(Candidate {
                record_id: change.record_id.clone(),
                previous: change.previous.clone(),
                current: change.current.clone(),
              });
            }

            for state in self.store.list_pending(&configuration.id).await? {
              if candidates.iter().any(|c| c.record_id == state.record_id) {
                continue;
              }
              if let Some(record) = records_by_id.get(state.record_id.as_str()) {
                let field = configuration.trigger_field.as_str();
                candidates.push(Candidate {
                  record_id: state.record_id.clone(),
                  previous: prior_values
                    .get(&(field, state.record_id.as_str()))
                    .map(|v| v.to_string()),
                  current: record.field(field).unwrap_or("").to_string(),
                });
              }
            }
          }
        }

        for candidate in candidates {
          report.evaluated += 1;
          let prior = self.store.get(&configuration.id, &candidate.record_id).await?;
          let decision = decide(
            policy,
            candidate.previous.as_deref(),
            &candidate.current,
            prior.as_ref(),
          );
          if matches!(decision, Decision::Fire | Decision::Resume) {
            pairs.push(QualifyingPair {
              configuration: (*configuration).clone(),
              template: (*template).clone(),
              external_id: table.external_id.clone(),
              record_id: candidate.record_id,
              trigger_value: candidate.current,
            });
          }
        }
      }

      replacements.push((
        table.id.clone(),
        watched.clone(),
        to_snapshots(&table.id, &records, &watched),
      ));
    }

    pairs.sort_by(|a, b| {
      (a.configuration.id.as_str(), a.record_id.as_str())
        .cmp(&(b.configuration.id.as_str(), b.record_id.as_str()))
    });
    pairs.dedup_by(|a, b| a.configuration.id == b.configuration.id && a.record_id == b.record_id);

    let dispatcher = Dispatcher::new(
      &self.records,
      &self.store,
      &self.mailer,
      &self.renderer,
      self.options.retry,
      self.options.send_timeout,
      self.options.fetch_timeout,
    );

    // Each dispatch honors the token itself, at its safe points; racing
    // the joined future against the token here would abandon an
    // in-flight send between transport accept and its sent transition.
    let dispatches = pairs.iter().map(|pair| dispatcher.dispatch(pair, cancel));
    let results = join_all(dispatches).await;

    for (pair, result) in pairs.iter().zip(results) {
      match result {
        Ok(DispatchOutcome::Sent { .. }) => report.sent += 1,
        Ok(DispatchOutcome::Suppressed) => report.suppressed += 1,
        Ok(DispatchOutcome::Failed { error }) | Ok(DispatchOutcome::Deferred { error }) => {
          report.audit.push(AuditEntry {
            configuration_id: pair.configuration.id.clone(),
            configuration_name: pair.configuration.name.clone(),
            record_id: Some(pair.record_id.clone()),
            error,
          });
        }
        Err(DispatchAbort::Store(e)) => return Err(e.into()),
        Err(DispatchAbort::Cancelled) => return Err(CycleError::Cancelled),
      }
    }

    // Snapshots advance whether or not dispatch succeeded; pending rows
    // carry interrupted work across cycles, not the snapshot.
    for (table_id, fields, snapshots) in replacements {
      self.store.replace_snapshots(&table_id, &fields, &snapshots).await?;
    }

    info!(
      cycle = %report.cycle_id,
      configurations = report.configurations,
      evaluated = report.evaluated,
      sent = report.sent,
      suppressed = report.suppressed,
      faults = report.audit.len(),
      "cycle_completed"
    );
    Ok(report)
  }

  /// The trigger state store, for operator commands.
  pub fn store(&self) -> &S {
    &self.store
  }
}

/// Check a configuration's links and field references against the
/// snapshot. Returns the resolved template on success.
fn validate<'a>(
  configuration: &Configuration,
  snapshot: &'a ConfigSnapshot,
) -> Result<&'a Template, String> {
  let table = snapshot
    .table(&configuration.source_table_id)
    .ok_or_else(|| format!("unknown source table {}", configuration.source_table_id))?;

  let template = snapshot
    .template(&configuration.template_id)
    .ok_or_else(|| format!("unknown template {}", configuration.template_id))?;

  if !table.merge_fields.is_empty() {
    check_field(table, &configuration.trigger_field, "trigger field")?;
    check_field(table, &configuration.recipient_field, "recipient field")?;
  }

  Ok(template)
}

fn check_field(table: &SourceTable, field: &str, what: &str) -> Result<(), String> {
  if table.merge_fields.iter().any(|f| f == field) {
    Ok(())
  } else {
    Err(format!("{what} {field} is not a field of table {}", table.id))
  }
}
