//! Action executor
//!
//! Applies an ordered batch of actions for one ticket. Each action succeeds
//! or fails on its own; a failure is recorded and logged, and the batch
//! carries on with the next action.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::application::assignment::{AssignmentOutcome, AssignmentSelector};
use crate::catalog::RuleCatalog;
use crate::domain::{Action, NotifyMethod, Recipient, TicketPatch, TicketSnapshot};
use crate::metrics::EngineMetrics;
use crate::ports::outbound::{AgentDirectory, NotificationPayload, NotificationSink, TicketStore};

/// One action that could not be applied
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ActionFailure {
    /// Position in the batch
    pub index: usize,
    pub action_type: &'static str,
    pub reason: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionReport {
    pub applied: usize,
    pub failures: Vec<ActionFailure>,
}

impl ExecutionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn merge(&mut self, other: ExecutionReport) {
        self.applied += other.applied;
        self.failures.extend(other.failures);
    }
}

pub struct ActionExecutor {
    store: Arc<dyn TicketStore>,
    directory: Arc<dyn AgentDirectory>,
    sink: Arc<dyn NotificationSink>,
    selector: Arc<AssignmentSelector>,
    metrics: Arc<EngineMetrics>,
    triage_tag: String,
    default_method: NotifyMethod,
}

impl ActionExecutor {
    pub fn new(
        store: Arc<dyn TicketStore>,
        directory: Arc<dyn AgentDirectory>,
        sink: Arc<dyn NotificationSink>,
        selector: Arc<AssignmentSelector>,
        metrics: Arc<EngineMetrics>,
    ) -> Self {
        Self {
            store,
            directory,
            sink,
            selector,
            metrics,
            triage_tag: "needs-triage".to_string(),
            default_method: NotifyMethod::default(),
        }
    }

    pub fn with_triage_tag(mut self, tag: impl Into<String>) -> Self {
        self.triage_tag = tag.into();
        self
    }

    pub fn with_default_method(mut self, method: NotifyMethod) -> Self {
        self.default_method = method;
        self
    }

    pub fn triage_tag(&self) -> &str {
        &self.triage_tag
    }

    /// Apply `actions` in order against `ticket`.
    pub async fn apply(
        &self,
        actions: &[Action],
        ticket: &TicketSnapshot,
        catalog: &RuleCatalog,
        now: DateTime<Utc>,
    ) -> ExecutionReport {
        let mut report = ExecutionReport::default();
        for (index, action) in actions.iter().enumerate() {
            match self.apply_one(action, ticket, catalog, now).await {
                Ok(()) => {
                    report.applied += 1;
                    self.metrics.actions_applied.inc();
                    tracing::debug!(
                        ticket_id = %ticket.id,
                        action = action.action_type(),
                        "Action applied"
                    );
                }
                Err(reason) => {
                    self.metrics.actions_failed.inc();
                    tracing::warn!(
                        ticket_id = %ticket.id,
                        action = action.action_type(),
                        index,
                        reason = %reason,
                        "Action failed, continuing with batch"
                    );
                    report.failures.push(ActionFailure {
                        index,
                        action_type: action.action_type(),
                        reason,
                    });
                }
            }
        }
        report
    }

    async fn apply_one(
        &self,
        action: &Action,
        ticket: &TicketSnapshot,
        catalog: &RuleCatalog,
        now: DateTime<Utc>,
    ) -> Result<(), String> {
        match action {
            Action::UpdatePriority { value } => {
                self.mutate(ticket, TicketPatch::SetPriority(*value)).await
            }
            Action::AddTag { value } => {
                self.mutate(ticket, TicketPatch::AddTag(value.clone())).await
            }
            Action::SetStatus { value } => {
                self.mutate(ticket, TicketPatch::SetStatus(*value)).await
            }
            Action::SetCategory { value } => {
                self.mutate(ticket, TicketPatch::SetCategory(value.clone())).await
            }
            Action::AddNote { value } => {
                self.mutate(ticket, TicketPatch::AddNote(value.clone())).await
            }
            Action::Reassign { target: Some(agent) } => {
                self.mutate(ticket, TicketPatch::Assign(agent.clone())).await
            }
            Action::Reassign { target: None } => {
                let patch = match self.selector.select_agent(ticket, catalog, now).await {
                    AssignmentOutcome::Assigned { agent, .. } => TicketPatch::Assign(agent),
                    AssignmentOutcome::Unassigned { .. } => {
                        TicketPatch::AddTag(self.triage_tag.clone())
                    }
                };
                self.mutate(ticket, patch).await
            }
            Action::Notify { target, method, value } => {
                let recipient = self.resolve(target, ticket).await?;
                let payload =
                    NotificationPayload::for_ticket("notify", ticket).with_message(value.clone());
                self.dispatch(&recipient, method.unwrap_or(self.default_method), &payload)
            }
            Action::SendEmail { target, value } => {
                let recipient = self.resolve(target, ticket).await?;
                let payload = NotificationPayload::for_ticket("send_email", ticket)
                    .with_template(value.clone());
                self.dispatch(&recipient, NotifyMethod::Email, &payload)
            }
            Action::Escalate { target, method } => {
                let recipient = self.resolve(&Recipient::Role(*target), ticket).await?;
                let payload = NotificationPayload::for_ticket("escalate", ticket);
                self.dispatch(&recipient, method.unwrap_or(self.default_method), &payload)
            }
        }
    }

    async fn mutate(&self, ticket: &TicketSnapshot, patch: TicketPatch) -> Result<(), String> {
        self.store
            .apply_mutation(&ticket.id, &patch)
            .await
            .map_err(|e| e.to_string())
    }

    fn dispatch(
        &self,
        recipient: &str,
        method: NotifyMethod,
        payload: &NotificationPayload,
    ) -> Result<(), String> {
        self.sink.send(recipient, method, payload).map_err(|e| e.to_string())
    }

    /// Concrete address for a rule-level recipient
    async fn resolve(
        &self,
        recipient: &Recipient,
        ticket: &TicketSnapshot,
    ) -> Result<String, String> {
        match recipient {
            Recipient::Assignee => ticket
                .assigned_agent_id
                .as_ref()
                .map(|a| a.to_string())
                .ok_or_else(|| "ticket has no assignee".to_string()),
            Recipient::Customer => ticket
                .requester
                .clone()
                .ok_or_else(|| "ticket has no requester".to_string()),
            Recipient::Role(role) => match self.directory.resolve_role(*role, ticket).await {
                Ok(Some(address)) => Ok(address),
                Ok(None) => Err(format!("no {} found for ticket", role.as_str())),
                Err(e) => Err(e.to_string()),
            },
            Recipient::Agent(agent) => Ok(agent.to_string()),
            Recipient::Address(address) => Ok(address.clone()),
        }
    }
}
