//! Ticket lifecycle events fed to the engine

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::value_objects::TicketId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Created,
    CustomerReply,
    AgentReply,
    StatusChanged,
    PriorityChanged,
    Assigned,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::CustomerReply => "customer_reply",
            Self::AgentReply => "agent_reply",
            Self::StatusChanged => "status_changed",
            Self::PriorityChanged => "priority_changed",
            Self::Assigned => "assigned",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event as emitted by the event source; transport is the caller's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketEvent {
    pub kind: EventKind,
    pub ticket_id: TicketId,
}

impl TicketEvent {
    pub fn new(kind: EventKind, ticket_id: impl Into<String>) -> Self {
        Self {
            kind,
            ticket_id: TicketId::new(ticket_id),
        }
    }
}
