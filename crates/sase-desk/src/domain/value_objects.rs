//! Help-desk value objects

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TicketId(String);

impl TicketId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TicketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Agent identifier. Ordering is used as the deterministic tie-break in
/// skill-based selection.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(String);

impl AgentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    #[default]
    New,
    Open,
    Pending,
    OnHold,
    Resolved,
    Closed,
}

impl TicketStatus {
    pub const ALL: [TicketStatus; 6] = [
        Self::New,
        Self::Open,
        Self::Pending,
        Self::OnHold,
        Self::Resolved,
        Self::Closed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Open => "open",
            Self::Pending => "pending",
            Self::OnHold => "on_hold",
            Self::Resolved => "resolved",
            Self::Closed => "closed",
        }
    }

    /// Resolved and closed tickets are outside the escalation scan.
    pub fn is_open(&self) -> bool {
        !matches!(self, Self::Resolved | Self::Closed)
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown status '{}'", s))
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    pub const ALL: [Priority; 4] = [Self::Low, Self::Normal, Self::High, Self::Urgent];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| format!("unknown priority '{}'", s))
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeUnit {
    Minutes,
    Hours,
    Days,
}

/// Numeric duration with a unit, as written in rule documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurationSpec {
    pub value: u32,
    pub unit: TimeUnit,
}

impl DurationSpec {
    pub fn minutes(value: u32) -> Self {
        Self { value, unit: TimeUnit::Minutes }
    }
    pub fn hours(value: u32) -> Self {
        Self { value, unit: TimeUnit::Hours }
    }
    pub fn days(value: u32) -> Self {
        Self { value, unit: TimeUnit::Days }
    }

    pub fn to_duration(&self) -> chrono::Duration {
        let value = i64::from(self.value);
        match self.unit {
            TimeUnit::Minutes => chrono::Duration::minutes(value),
            TimeUnit::Hours => chrono::Duration::hours(value),
            TimeUnit::Days => chrono::Duration::days(value),
        }
    }

    /// Whether the span is longer than `days`.
    pub fn exceeds_days(&self, days: u32) -> bool {
        self.to_duration() > chrono::Duration::days(i64::from(days))
    }
}

impl fmt::Display for DurationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let unit = match self.unit {
            TimeUnit::Minutes => "m",
            TimeUnit::Hours => "h",
            TimeUnit::Days => "d",
        };
        write!(f, "{}{}", self.value, unit)
    }
}

/// Role an `escalate` action is addressed to; resolved through the agent
/// directory at execution time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationRole {
    TeamLead,
    Manager,
}

impl EscalationRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TeamLead => "team_lead",
            Self::Manager => "manager",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotifyMethod {
    #[default]
    Email,
    InApp,
    Sms,
    Webhook,
}

impl NotifyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Email => "email",
            Self::InApp => "in_app",
            Self::Sms => "sms",
            Self::Webhook => "webhook",
        }
    }
}

/// Named agent group, or every agent.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AgentPool {
    All,
    Named(String),
}

impl AgentPool {
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Key for per-pool state such as the round-robin cursor.
    pub fn key(&self) -> &str {
        match self {
            Self::All => "all",
            Self::Named(name) => name,
        }
    }
}

impl From<String> for AgentPool {
    fn from(value: String) -> Self {
        if value == "all" {
            Self::All
        } else {
            Self::Named(value)
        }
    }
}

impl From<AgentPool> for String {
    fn from(value: AgentPool) -> Self {
        match value {
            AgentPool::All => "all".to_string(),
            AgentPool::Named(name) => name,
        }
    }
}

impl fmt::Display for AgentPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}
