//! Mailcue trigger engine.
//!
//! Drives the poll → detect → evaluate → render → dispatch cycle:
//! - [`detector`] diffs trigger-field observations against stored
//!   snapshots;
//! - [`evaluator`] decides, per (configuration, record) pair, whether a
//!   transition qualifies for delivery;
//! - [`dispatcher`] performs the claim → render → send protocol with
//!   bounded retries;
//! - [`Orchestrator`] runs one full cycle across all active
//!   configurations with per-configuration fault isolation.
//!
//! The only shared mutable state is the trigger state store; its atomic
//! claim makes a full cycle idempotent on unchanged source data.

mod detector;
mod dispatcher;
mod error;
mod evaluator;
mod orchestrator;
mod report;

pub use detector::{FieldChange, detect, to_snapshots};
pub use dispatcher::{DispatchOutcome, Dispatcher, QualifyingPair, RetryPolicy};
pub use error::{CycleError, DispatchAbort};
pub use evaluator::{Decision, TriggerPolicy, decide};
pub use orchestrator::{CycleOptions, Orchestrator};
pub use report::{AuditEntry, CycleReport};
