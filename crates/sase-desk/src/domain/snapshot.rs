//! Immutable ticket snapshot
//!
//! Produced by the ticket store for one evaluation instant. The engine never
//! mutates a snapshot; changes are requested through [`crate::TicketPatch`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::value_objects::{AgentId, Priority, TicketId, TicketStatus};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TicketSnapshot {
    pub id: TicketId,
    #[serde(default)]
    pub status: TicketStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    #[serde(default)]
    pub customer_type: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    /// Requester contact, used for `customer` recipients
    #[serde(default)]
    pub requester: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
    #[serde(default)]
    pub first_responded_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_customer_reply_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_agent_reply_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub assigned_agent_id: Option<AgentId>,
    /// Deadline of the active SLA clock. When the store leaves it empty the
    /// engine fills it from the governing policy before evaluating.
    #[serde(default)]
    pub sla_deadline: Option<DateTime<Utc>>,
    /// Escalation level ids already fired for this ticket
    #[serde(default)]
    pub fired_escalation_levels: BTreeSet<String>,
}

impl TicketSnapshot {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: TicketId::new(id),
            status: TicketStatus::New,
            priority: Priority::Normal,
            category: None,
            tags: BTreeSet::new(),
            customer_type: None,
            subject: None,
            description: None,
            requester: None,
            created_at,
            last_activity_at: created_at,
            first_responded_at: None,
            last_customer_reply_at: None,
            last_agent_reply_at: None,
            assigned_agent_id: None,
            sla_deadline: None,
            fired_escalation_levels: BTreeSet::new(),
        }
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tag(mut self, tag: &str) -> Self {
        self.tags.insert(tag.into());
        self
    }

    pub fn with_customer_type(mut self, customer_type: &str) -> Self {
        self.customer_type = Some(customer_type.into());
        self
    }

    pub fn with_subject(mut self, subject: &str) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_requester(mut self, requester: &str) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn assigned_to(mut self, agent: &str) -> Self {
        self.assigned_agent_id = Some(AgentId::new(agent));
        self
    }

    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity_at = at;
        self
    }

    pub fn with_customer_reply(mut self, at: DateTime<Utc>) -> Self {
        self.last_customer_reply_at = Some(at);
        self.last_activity_at = self.last_activity_at.max(at);
        self
    }

    /// Record an agent reply; the first one also stops the response clock.
    pub fn with_sla_deadline(mut self, deadline: DateTime<Utc>) -> Self {
        self.sla_deadline = Some(deadline);
        self
    }

    pub fn with_agent_reply(mut self, at: DateTime<Utc>) -> Self {
        self.first_responded_at.get_or_insert(at);
        self.last_agent_reply_at = Some(at);
        self.last_activity_at = self.last_activity_at.max(at);
        self
    }

    pub fn with_fired_level(mut self, level_id: &str) -> Self {
        self.fired_escalation_levels.insert(level_id.into());
        self
    }

    pub fn is_open(&self) -> bool {
        self.status.is_open()
    }

    pub fn has_fired(&self, level_id: &str) -> bool {
        self.fired_escalation_levels.contains(level_id)
    }

    /// Instant since which the customer has been waiting for an agent, or
    /// `None` when the latest customer message already has an agent reply.
    pub fn awaiting_response_since(&self) -> Option<DateTime<Utc>> {
        let waiting_from = self
            .last_customer_reply_at
            .map_or(self.created_at, |at| at.max(self.created_at));
        match self.last_agent_reply_at {
            Some(replied) if replied >= waiting_from => None,
            _ => Some(waiting_from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_awaiting_response() {
        let created = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let ticket = TicketSnapshot::new("T-1", created);
        assert_eq!(ticket.awaiting_response_since(), Some(created));

        let replied = ticket.clone().with_agent_reply(created + chrono::Duration::hours(1));
        assert_eq!(replied.awaiting_response_since(), None);
        assert!(replied.first_responded_at.is_some());

        let follow_up = created + chrono::Duration::hours(3);
        let waiting = replied.with_customer_reply(follow_up);
        assert_eq!(waiting.awaiting_response_since(), Some(follow_up));
        assert_eq!(waiting.last_activity_at, follow_up);
    }

    #[test]
    fn test_fired_levels() {
        let created = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
        let ticket = TicketSnapshot::new("T-2", created).with_fired_level("esc-1");
        assert!(ticket.has_fired("esc-1"));
        assert!(!ticket.has_fired("esc-2"));
    }
}
