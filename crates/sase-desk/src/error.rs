//! Error types for the help-desk engine

use thiserror::Error;

use crate::domain::Field;
use crate::ports::outbound::{DirectoryError, NotifyError, StoreError};

/// Engine error type
#[derive(Error, Debug)]
pub enum DeskError {
    /// Rule catalog or engine configuration rejected
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// Ticket store failure
    #[error("ticket store: {0}")]
    Store(#[from] StoreError),

    /// Agent directory failure
    #[error("agent directory: {0}")]
    Directory(#[from] DirectoryError),

    /// Notification channel failure
    #[error("notification sink: {0}")]
    Notify(#[from] NotifyError),

    /// Ticket referenced by an event does not exist
    #[error("ticket not found: {0}")]
    TicketNotFound(String),

    /// An escalation tick was requested while another one was in flight
    #[error("escalation tick already in flight, overlapping tick dropped")]
    TickOverlap,

    /// Business calendar never opens within the search horizon
    #[error("business calendar has no open hours within {days} days")]
    CalendarExhausted { days: u32 },

    /// Deadline lies outside the representable time range
    #[error("deadline from {start} is outside the supported time range")]
    DeadlineOutOfRange { start: chrono::DateTime<chrono::Utc> },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the engine
pub type DeskResult<T> = Result<T, DeskError>;

/// Catalog-load failures. A catalog version carrying any of these is never
/// activated; the previous valid version stays in place.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigurationError {
    /// Source document could not be parsed (unknown field, operator, shape)
    #[error("cannot parse rule catalog: {0}")]
    Parse(String),

    /// Source document could not be read
    #[error("cannot read {path}: {reason}")]
    Unreadable { path: String, reason: String },

    /// Two rules of the same kind share an id
    #[error("duplicate {kind} rule id '{id}'")]
    DuplicateRuleId { kind: &'static str, id: String },

    /// Rule has an empty id or name, or is otherwise malformed
    #[error("{kind} rule '{id}': {reason}")]
    InvalidRule {
        kind: &'static str,
        id: String,
        reason: String,
    },

    /// Operator cannot be applied to the field
    #[error("rule '{rule}': operator {operator} is not supported on field {field}")]
    UnsupportedOperator {
        rule: String,
        field: Field,
        operator: &'static str,
    },

    /// `equals`/`not_equals` used with a list on either side
    #[error("rule '{rule}': field {field} compared to a list with equality, use in/not_in")]
    ListEquality { rule: String, field: Field },

    /// Value has the wrong shape or names an unknown enum member
    #[error("rule '{rule}': invalid value for {field}: {reason}")]
    InvalidValue {
        rule: String,
        field: Field,
        reason: String,
    },

    /// No assignment rule is flagged `is_default`
    #[error("catalog has no default assignment rule")]
    MissingDefaultAssignment,

    /// More than one assignment rule is flagged `is_default`
    #[error("catalog has several default assignment rules: {0:?}")]
    MultipleDefaultAssignment(Vec<String>),

    /// Default rule or policy must be enabled and unconditional
    #[error("default {kind} '{id}' must be enabled and have no conditions")]
    InvalidDefault { kind: &'static str, id: String },

    /// SLA policy shape is invalid
    #[error("SLA policy '{id}': {reason}")]
    InvalidSlaPolicy { id: String, reason: String },

    /// SLA policies exist but none is flagged `is_default`
    #[error("catalog has SLA policies but no default policy")]
    MissingDefaultSla,

    /// More than one SLA policy is flagged `is_default`
    #[error("catalog has several default SLA policies: {0:?}")]
    MultipleDefaultSla(Vec<String>),

    /// Escalation trigger is out of range
    #[error("escalation rule '{id}': {reason}")]
    InvalidTrigger { id: String, reason: String },

    /// Action payload is invalid
    #[error("rule '{rule}': invalid {action} action: {reason}")]
    InvalidAction {
        rule: String,
        action: &'static str,
        reason: String,
    },

    /// Business calendar configuration is invalid
    #[error("invalid business calendar: {0}")]
    InvalidCalendar(String),

    /// Engine configuration file is invalid
    #[error("invalid engine config: {0}")]
    InvalidConfig(String),
}

/// A single condition could not be evaluated because the snapshot lacks the
/// data it references. The owning rule is treated as non-matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationSkip {
    pub field: Field,
    pub reason: &'static str,
}

impl EvaluationSkip {
    pub fn new(field: Field, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

impl std::fmt::Display for EvaluationSkip {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.reason)
    }
}
