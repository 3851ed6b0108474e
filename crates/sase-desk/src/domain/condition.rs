//! Condition evaluation
//!
//! A condition is `{field, operator, value}`. All conditions of a rule are
//! AND-combined; an empty list matches every ticket. Shape errors are caught
//! by [`Condition::validate`] when the catalog loads, so evaluation only ever
//! fails for data missing from the snapshot.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::domain::snapshot::TicketSnapshot;
use crate::domain::value_objects::{DurationSpec, Priority, TicketStatus};
use crate::error::{ConfigurationError, EvaluationSkip};
use crate::metrics::EngineMetrics;

/// Snapshot field a condition reads
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Priority,
    Status,
    Category,
    CustomerType,
    AssignedAgent,
    #[serde(alias = "tag")]
    Tags,
    Subject,
    Description,
    SubjectOrDescription,
    LastActivityAge,
    TicketAge,
}

impl Field {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Priority => "priority",
            Self::Status => "status",
            Self::Category => "category",
            Self::CustomerType => "customer_type",
            Self::AssignedAgent => "assigned_agent",
            Self::Tags => "tags",
            Self::Subject => "subject",
            Self::Description => "description",
            Self::SubjectOrDescription => "subject_or_description",
            Self::LastActivityAge => "last_activity_age",
            Self::TicketAge => "ticket_age",
        }
    }

    fn kind(&self) -> FieldKind {
        match self {
            Self::Priority | Self::Status => FieldKind::Enum,
            Self::Category | Self::CustomerType | Self::AssignedAgent => FieldKind::Scalar,
            Self::Tags => FieldKind::Set,
            Self::Subject | Self::Description | Self::SubjectOrDescription => FieldKind::Text,
            Self::LastActivityAge | Self::TicketAge => FieldKind::Time,
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FieldKind {
    Enum,
    Scalar,
    Set,
    Text,
    Time,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Equals,
    NotEquals,
    Contains,
    In,
    NotIn,
    OlderThan,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Contains => "contains",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::OlderThan => "older_than",
        }
    }
}

/// Right-hand side of a condition
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    Text(String),
    Set(Vec<String>),
    Duration(DurationSpec),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub field: Field,
    pub operator: Operator,
    pub value: ConditionValue,
}

/// Resolved left-hand side
enum FieldValue<'a> {
    One(&'a str),
    Texts(Vec<&'a str>),
    Set(&'a BTreeSet<String>),
    Time(DateTime<Utc>),
}

impl Condition {
    pub fn new(field: Field, operator: Operator, value: ConditionValue) -> Self {
        Self { field, operator, value }
    }

    pub fn equals(field: Field, value: &str) -> Self {
        Self::new(field, Operator::Equals, ConditionValue::Text(value.into()))
    }

    pub fn not_equals(field: Field, value: &str) -> Self {
        Self::new(field, Operator::NotEquals, ConditionValue::Text(value.into()))
    }

    pub fn contains(field: Field, value: &str) -> Self {
        Self::new(field, Operator::Contains, ConditionValue::Text(value.into()))
    }

    pub fn is_in(field: Field, values: &[&str]) -> Self {
        Self::new(field, Operator::In, Self::set(values))
    }

    pub fn not_in(field: Field, values: &[&str]) -> Self {
        Self::new(field, Operator::NotIn, Self::set(values))
    }

    pub fn older_than(field: Field, duration: DurationSpec) -> Self {
        Self::new(field, Operator::OlderThan, ConditionValue::Duration(duration))
    }

    fn set(values: &[&str]) -> ConditionValue {
        ConditionValue::Set(values.iter().map(|v| v.to_string()).collect())
    }

    /// Check operator, field and value agree. Called once per rule at catalog
    /// load; a failure rejects the whole catalog version.
    pub fn validate(&self, rule: &str) -> Result<(), ConfigurationError> {
        let kind = self.field.kind();
        let unsupported = || ConfigurationError::UnsupportedOperator {
            rule: rule.to_string(),
            field: self.field,
            operator: self.operator.as_str(),
        };
        let invalid = |reason: String| ConfigurationError::InvalidValue {
            rule: rule.to_string(),
            field: self.field,
            reason,
        };

        match self.operator {
            Operator::Equals | Operator::NotEquals => {
                if kind == FieldKind::Set || matches!(self.value, ConditionValue::Set(_)) {
                    return Err(ConfigurationError::ListEquality {
                        rule: rule.to_string(),
                        field: self.field,
                    });
                }
                if kind == FieldKind::Time {
                    return Err(unsupported());
                }
                match &self.value {
                    ConditionValue::Text(v) => self.validate_member(v).map_err(invalid),
                    _ => Err(invalid("expected a single value".into())),
                }
            }
            Operator::Contains => {
                if matches!(kind, FieldKind::Enum | FieldKind::Time) {
                    return Err(unsupported());
                }
                match &self.value {
                    ConditionValue::Text(v) if !v.is_empty() => Ok(()),
                    ConditionValue::Text(_) => Err(invalid("empty search text".into())),
                    _ => Err(invalid("expected a single value".into())),
                }
            }
            Operator::In | Operator::NotIn => {
                if matches!(kind, FieldKind::Text | FieldKind::Time) {
                    return Err(unsupported());
                }
                match &self.value {
                    ConditionValue::Set(values) if values.is_empty() => {
                        Err(invalid("empty list".into()))
                    }
                    ConditionValue::Set(values) => values
                        .iter()
                        .try_for_each(|v| self.validate_member(v))
                        .map_err(invalid),
                    _ => Err(invalid("expected a list of values".into())),
                }
            }
            Operator::OlderThan => {
                if kind != FieldKind::Time {
                    return Err(unsupported());
                }
                match &self.value {
                    ConditionValue::Duration(d) if d.value > 0 => Ok(()),
                    ConditionValue::Duration(_) => Err(invalid("duration must be positive".into())),
                    _ => Err(invalid("expected {value, unit}".into())),
                }
            }
        }
    }

    fn validate_member(&self, value: &str) -> Result<(), String> {
        match self.field {
            Field::Priority => value.parse::<Priority>().map(|_| ()),
            Field::Status => value.parse::<TicketStatus>().map(|_| ()),
            _ => Ok(()),
        }
    }

    /// Evaluate against one snapshot. Pure: same inputs, same answer.
    pub fn evaluate(
        &self,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> Result<bool, EvaluationSkip> {
        match (self.operator, &self.value) {
            (Operator::Equals, ConditionValue::Text(v)) => self.eq_value(ticket, v),
            (Operator::NotEquals, ConditionValue::Text(v)) => self.eq_value(ticket, v).map(|b| !b),
            (Operator::Contains, ConditionValue::Text(v)) => self.contains_text(ticket, v),
            (Operator::In, ConditionValue::Set(vs)) => self.member_of(ticket, vs),
            (Operator::NotIn, ConditionValue::Set(vs)) => self.member_of(ticket, vs).map(|b| !b),
            (Operator::OlderThan, ConditionValue::Duration(d)) => match self.resolve(ticket)? {
                FieldValue::Time(at) => Ok(now - at > d.to_duration()),
                _ => Err(self.skip("not a time field")),
            },
            _ => Err(self.skip("operator and value do not agree")),
        }
    }

    fn eq_value(&self, ticket: &TicketSnapshot, expected: &str) -> Result<bool, EvaluationSkip> {
        match self.resolve(ticket)? {
            FieldValue::One(actual) => Ok(actual == expected),
            FieldValue::Texts(texts) => Ok(texts.iter().any(|t| *t == expected)),
            _ => Err(self.skip("equality on a non-scalar field")),
        }
    }

    fn contains_text(&self, ticket: &TicketSnapshot, needle: &str) -> Result<bool, EvaluationSkip> {
        let needle = needle.to_lowercase();
        match self.resolve(ticket)? {
            FieldValue::Set(tags) => Ok(tags.iter().any(|t| t.to_lowercase() == needle)),
            FieldValue::One(text) => Ok(text.to_lowercase().contains(&needle)),
            FieldValue::Texts(texts) => {
                Ok(texts.iter().any(|t| t.to_lowercase().contains(&needle)))
            }
            FieldValue::Time(_) => Err(self.skip("contains on a time field")),
        }
    }

    fn member_of(
        &self,
        ticket: &TicketSnapshot,
        values: &[String],
    ) -> Result<bool, EvaluationSkip> {
        match self.resolve(ticket)? {
            FieldValue::One(actual) => Ok(values.iter().any(|v| v == actual)),
            FieldValue::Set(tags) => Ok(values.iter().any(|v| tags.contains(v))),
            _ => Err(self.skip("membership on a free-text field")),
        }
    }

    fn resolve<'a>(&self, ticket: &'a TicketSnapshot) -> Result<FieldValue<'a>, EvaluationSkip> {
        let missing = || self.skip("absent from snapshot");
        Ok(match self.field {
            Field::Priority => FieldValue::One(ticket.priority.as_str()),
            Field::Status => FieldValue::One(ticket.status.as_str()),
            Field::Category => FieldValue::One(ticket.category.as_deref().ok_or_else(missing)?),
            Field::CustomerType => {
                FieldValue::One(ticket.customer_type.as_deref().ok_or_else(missing)?)
            }
            Field::AssignedAgent => FieldValue::One(
                ticket
                    .assigned_agent_id
                    .as_ref()
                    .map(|a| a.as_str())
                    .ok_or_else(missing)?,
            ),
            Field::Tags => FieldValue::Set(&ticket.tags),
            Field::Subject => FieldValue::One(ticket.subject.as_deref().ok_or_else(missing)?),
            Field::Description => {
                FieldValue::One(ticket.description.as_deref().ok_or_else(missing)?)
            }
            Field::SubjectOrDescription => {
                let texts: Vec<&str> = [ticket.subject.as_deref(), ticket.description.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect();
                if texts.is_empty() {
                    return Err(missing());
                }
                FieldValue::Texts(texts)
            }
            Field::LastActivityAge => FieldValue::Time(ticket.last_activity_at),
            Field::TicketAge => FieldValue::Time(ticket.created_at),
        })
    }

    fn skip(&self, reason: &'static str) -> EvaluationSkip {
        EvaluationSkip::new(self.field, reason)
    }
}

/// AND-combine `conditions`, surfacing the first skip.
pub fn try_matches(
    conditions: &[Condition],
    ticket: &TicketSnapshot,
    now: DateTime<Utc>,
) -> Result<bool, EvaluationSkip> {
    for condition in conditions {
        if !condition.evaluate(ticket, now)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// AND-combine `conditions`; a skipped condition makes the rule non-matching.
pub fn matches(conditions: &[Condition], ticket: &TicketSnapshot, now: DateTime<Utc>) -> bool {
    try_matches(conditions, ticket, now).unwrap_or_else(|skip| {
        log_skip("-", ticket, &skip);
        false
    })
}

/// Same as [`matches`] but names the rule in the skip log and counts the
/// skip in `evaluation_errors`.
pub fn rule_matches(
    rule_id: &str,
    conditions: &[Condition],
    ticket: &TicketSnapshot,
    now: DateTime<Utc>,
    metrics: &EngineMetrics,
) -> bool {
    try_matches(conditions, ticket, now).unwrap_or_else(|skip| {
        metrics.evaluation_errors.inc();
        log_skip(rule_id, ticket, &skip);
        false
    })
}

fn log_skip(rule_id: &str, ticket: &TicketSnapshot, skip: &EvaluationSkip) {
    tracing::debug!(
        rule_id,
        ticket_id = %ticket.id,
        field = %skip.field,
        reason = skip.reason,
        "Condition skipped, rule treated as non-matching"
    );
}
