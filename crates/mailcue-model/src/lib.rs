//! Mailcue data model.
//!
//! Core types shared across the engine: email templates, watched source
//! tables, trigger configurations, and source records. Trigger state rows
//! live in `mailcue-store`; rendered messages live in `mailcue-render`.

mod configuration;
mod record;
mod template;

pub use configuration::{Configuration, SourceTable};
pub use record::{SourceRecord, field_is_blank, split_addresses};
pub use template::Template;

/// Identifier of a trigger configuration.
pub type ConfigurationId = String;

/// Identifier of a watched source table.
pub type TableId = String;

/// Identifier of an email template.
pub type TemplateId = String;

/// Identifier of a record within a source table.
pub type RecordId = String;
