//! Declarative actions and the ticket mutations they resolve to

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_objects::{AgentId, EscalationRole, NotifyMethod, Priority, TicketStatus};
use crate::error::ConfigurationError;

/// Instruction emitted by a matched rule. The engine never performs these
/// itself; the action executor hands them to the collaborators.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    Notify {
        target: Recipient,
        #[serde(default)]
        method: Option<NotifyMethod>,
        #[serde(default)]
        value: Option<String>,
    },
    Escalate {
        target: EscalationRole,
        #[serde(default)]
        method: Option<NotifyMethod>,
    },
    UpdatePriority {
        value: Priority,
    },
    AddTag {
        value: String,
    },
    SetStatus {
        value: TicketStatus,
    },
    SetCategory {
        value: String,
    },
    /// Without a target the assignment selector picks the agent.
    Reassign {
        #[serde(default)]
        target: Option<AgentId>,
    },
    SendEmail {
        target: Recipient,
        /// Template name
        #[serde(default)]
        value: Option<String>,
    },
    AddNote {
        value: String,
    },
}

impl Action {
    pub fn action_type(&self) -> &'static str {
        match self {
            Self::Notify { .. } => "notify",
            Self::Escalate { .. } => "escalate",
            Self::UpdatePriority { .. } => "update_priority",
            Self::AddTag { .. } => "add_tag",
            Self::SetStatus { .. } => "set_status",
            Self::SetCategory { .. } => "set_category",
            Self::Reassign { .. } => "reassign",
            Self::SendEmail { .. } => "send_email",
            Self::AddNote { .. } => "add_note",
        }
    }

    pub fn add_tag(tag: &str) -> Self {
        Self::AddTag { value: tag.into() }
    }

    pub fn set_status(status: TicketStatus) -> Self {
        Self::SetStatus { value: status }
    }

    pub fn notify(target: Recipient) -> Self {
        Self::Notify { target, method: None, value: None }
    }

    pub fn escalate(role: EscalationRole) -> Self {
        Self::Escalate { target: role, method: None }
    }

    pub fn assign_to(agent: AgentId) -> Self {
        Self::Reassign { target: Some(agent) }
    }

    pub fn validate(&self, rule: &str) -> Result<(), ConfigurationError> {
        let blank = match self {
            Self::AddTag { value } | Self::SetCategory { value } | Self::AddNote { value } => {
                value.trim().is_empty()
            }
            Self::Reassign { target: Some(agent) } => agent.as_str().is_empty(),
            _ => false,
        };
        if blank {
            return Err(ConfigurationError::InvalidAction {
                rule: rule.to_string(),
                action: self.action_type(),
                reason: "value must not be empty".into(),
            });
        }
        Ok(())
    }
}

/// Notification target as written in rules
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Recipient {
    /// Currently assigned agent
    Assignee,
    /// Ticket requester
    Customer,
    /// Resolved through the agent directory
    Role(EscalationRole),
    Agent(AgentId),
    Address(String),
}

impl TryFrom<String> for Recipient {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.as_str() {
            "assignee" => Ok(Self::Assignee),
            "customer" | "requester" => Ok(Self::Customer),
            "team_lead" => Ok(Self::Role(EscalationRole::TeamLead)),
            "manager" => Ok(Self::Role(EscalationRole::Manager)),
            other => {
                if let Some(agent) = other.strip_prefix("agent:") {
                    if agent.is_empty() {
                        return Err("agent recipient needs an id".into());
                    }
                    Ok(Self::Agent(AgentId::new(agent)))
                } else if other.contains('@') {
                    Ok(Self::Address(other.to_string()))
                } else {
                    Err(format!("unknown recipient '{}'", other))
                }
            }
        }
    }
}

impl From<Recipient> for String {
    fn from(value: Recipient) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assignee => f.write_str("assignee"),
            Self::Customer => f.write_str("customer"),
            Self::Role(role) => f.write_str(role.as_str()),
            Self::Agent(agent) => write!(f, "agent:{}", agent),
            Self::Address(address) => f.write_str(address),
        }
    }
}

/// Idempotent mutation requested from the ticket store
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "value", rename_all = "snake_case")]
pub enum TicketPatch {
    SetStatus(TicketStatus),
    SetPriority(Priority),
    AddTag(String),
    SetCategory(String),
    Assign(AgentId),
    AddNote(String),
}
