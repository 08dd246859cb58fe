//! Per-cycle summary and audit trail.

use serde::Serialize;

/// A fault isolated during a cycle, attributed to the configuration it
/// belongs to.
///
/// `record_id` is `None` for configuration-level faults (broken links,
/// unreachable source table) and set for per-pair dispatch failures.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
  pub configuration_id: String,
  pub configuration_name: String,
  pub record_id: Option<String>,
  pub error: String,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
  pub cycle_id: String,
  /// Active configurations considered this cycle.
  pub configurations: usize,
  /// Candidate (configuration, record) pairs evaluated.
  pub evaluated: usize,
  pub sent: usize,
  pub suppressed: usize,
  pub audit: Vec<AuditEntry>,
}

impl CycleReport {
  pub fn new(cycle_id: String) -> Self {
    Self {
      cycle_id,
      configurations: 0,
      evaluated: 0,
      sent: 0,
      suppressed: 0,
      audit: Vec::new(),
    }
  }
}
