//! Outbound ports
//!
//! Hexagonal architecture: these are the interfaces the surrounding
//! application implements. The engine reads everything a decision needs
//! through them before it evaluates any rule.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeSet;
use thiserror::Error;

use crate::domain::{
    AgentId, AgentPool, EscalationRole, NotifyMethod, Priority, RuleSet, TicketId, TicketPatch,
    TicketSnapshot, TicketStatus,
};
use crate::error::ConfigurationError;

/// Ticket store port
#[async_trait]
pub trait TicketStore: Send + Sync {
    /// Every ticket whose status is neither resolved nor closed
    async fn get_open_tickets(&self) -> Result<Vec<TicketSnapshot>, StoreError>;

    async fn find_ticket(&self, id: &TicketId) -> Result<Option<TicketSnapshot>, StoreError>;

    /// Apply one idempotent mutation
    async fn apply_mutation(&self, id: &TicketId, patch: &TicketPatch) -> Result<(), StoreError>;

    /// Persist `level_id` in the ticket's fired set. Returns `true` only for
    /// the call that newly recorded it.
    async fn mark_escalation_fired(
        &self,
        id: &TicketId,
        level_id: &str,
    ) -> Result<bool, StoreError>;
}

/// Agent directory port
#[async_trait]
pub trait AgentDirectory: Send + Sync {
    /// Members of a pool, in the directory's stable order
    async fn get_pool(&self, pool: &AgentPool) -> Result<Vec<AgentId>, DirectoryError>;

    async fn get_skills(&self, agent: &AgentId) -> Result<BTreeSet<String>, DirectoryError>;

    /// Open plus pending tickets currently held by the agent
    async fn get_open_load(&self, agent: &AgentId) -> Result<u32, DirectoryError>;

    /// Concrete recipient standing in `role` for this ticket
    async fn resolve_role(
        &self,
        role: EscalationRole,
        ticket: &TicketSnapshot,
    ) -> Result<Option<String>, DirectoryError>;
}

/// Notification sink port
///
/// Fire-and-forget: implementations must return without waiting on delivery.
pub trait NotificationSink: Send + Sync {
    fn send(
        &self,
        target: &str,
        method: NotifyMethod,
        payload: &NotificationPayload,
    ) -> Result<(), NotifyError>;
}

/// Rule catalog storage port
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn load(&self) -> Result<RuleSet, ConfigurationError>;

    /// Human-readable origin for logs
    fn describe(&self) -> String {
        "catalog source".to_string()
    }
}

/// What a notification is about
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationPayload {
    pub ticket_id: TicketId,
    /// Action type that produced the notification
    pub kind: &'static str,
    pub status: TicketStatus,
    pub priority: Priority,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sla_deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub template: Option<String>,
}

impl NotificationPayload {
    pub fn for_ticket(kind: &'static str, ticket: &TicketSnapshot) -> Self {
        Self {
            ticket_id: ticket.id.clone(),
            kind,
            status: ticket.status,
            priority: ticket.priority,
            subject: ticket.subject.clone(),
            sla_deadline: ticket.sla_deadline,
            message: None,
            template: None,
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_template(mut self, template: Option<String>) -> Self {
        self.template = template;
        self
    }
}

/// Ticket store error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("ticket {0} not found")]
    NotFound(String),

    #[error("mutation rejected for ticket {ticket_id}: {reason}")]
    Rejected { ticket_id: String, reason: String },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Agent directory error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("unknown agent pool '{0}'")]
    UnknownPool(String),

    #[error("unknown agent '{0}'")]
    UnknownAgent(String),

    #[error("directory unavailable: {0}")]
    Unavailable(String),
}

/// Notification sink error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    #[error("notification channel is full")]
    ChannelFull,

    #[error("notification channel is closed")]
    Closed,

    #[error("notification rejected: {0}")]
    Rejected(String),
}
