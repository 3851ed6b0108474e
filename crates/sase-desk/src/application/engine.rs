//! Engine facade
//!
//! Wires the selector, dispatcher, executor and scheduler to one set of
//! collaborators and implements the inbound use cases.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::application::assignment::{AssignmentOutcome, AssignmentSelector};
use crate::application::dispatcher::{flatten, AutomationDispatcher};
use crate::application::executor::{ActionExecutor, ExecutionReport};
use crate::application::scheduler::{EscalationScheduler, TickReport};
use crate::catalog::{CatalogStore, RuleCatalog};
use crate::config::EngineConfig;
use crate::domain::{
    Action, AgentId, EventKind, SlaCalculator, SlaStatus, TicketEvent, TicketId, TicketSnapshot,
};
use crate::error::{ConfigurationError, DeskError, DeskResult};
use crate::metrics::{EngineMetrics, EngineStats};
use crate::ports::inbound::EngineUseCases;
use crate::ports::outbound::{AgentDirectory, CatalogSource, NotificationSink, TicketStore};

/// Result of handling one ticket event
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EventOutcome {
    pub ticket_id: TicketId,
    pub event: EventKind,
    pub catalog_version: u64,
    /// Set for `created` events on unassigned tickets
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment: Option<AssignmentOutcome>,
    /// Automation rule ids that fired, in order
    pub fired_rules: Vec<String>,
    pub report: ExecutionReport,
}

/// Result of a reassignment request
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ReassignOutcome {
    pub ticket_id: TicketId,
    pub catalog_version: u64,
    pub assignment: AssignmentOutcome,
    /// Applying the assignment, or the triage tag when no agent was picked
    pub report: ExecutionReport,
}

impl ReassignOutcome {
    /// Agent now holding the ticket. `None` when nobody was picked or the
    /// store rejected the assignment.
    pub fn agent(&self) -> Option<&AgentId> {
        self.assignment.agent().filter(|_| self.report.is_clean())
    }
}

pub struct DeskEngine {
    catalog: Arc<CatalogStore>,
    store: Arc<dyn TicketStore>,
    selector: Arc<AssignmentSelector>,
    dispatcher: AutomationDispatcher,
    executor: Arc<ActionExecutor>,
    scheduler: Arc<EscalationScheduler>,
    metrics: Arc<EngineMetrics>,
}

impl DeskEngine {
    pub fn new(
        config: &EngineConfig,
        catalog: Arc<CatalogStore>,
        store: Arc<dyn TicketStore>,
        directory: Arc<dyn AgentDirectory>,
        sink: Arc<dyn NotificationSink>,
    ) -> Result<Self, ConfigurationError> {
        config.validate()?;
        let metrics = Arc::new(EngineMetrics::new());
        let calculator = SlaCalculator::new(config.business_calendar()?);

        let selector = Arc::new(AssignmentSelector::new(directory.clone(), metrics.clone()));
        let executor = Arc::new(
            ActionExecutor::new(store.clone(), directory, sink, selector.clone(), metrics.clone())
                .with_triage_tag(config.assignment.triage_tag.clone())
                .with_default_method(config.notifications.default_method),
        );
        let scheduler = Arc::new(EscalationScheduler::new(
            catalog.clone(),
            store.clone(),
            executor.clone(),
            calculator,
            metrics.clone(),
            &config.scheduler,
        ));

        Ok(Self {
            catalog,
            store,
            selector,
            dispatcher: AutomationDispatcher::new(metrics.clone()),
            executor,
            scheduler,
            metrics,
        })
    }

    pub fn catalog(&self) -> &Arc<CatalogStore> {
        &self.catalog
    }

    pub fn scheduler(&self) -> &Arc<EscalationScheduler> {
        &self.scheduler
    }

    pub fn calculator(&self) -> &SlaCalculator {
        self.scheduler.calculator()
    }

    async fn load_ticket(&self, id: &TicketId) -> DeskResult<TicketSnapshot> {
        self.store
            .find_ticket(id)
            .await?
            .ok_or_else(|| DeskError::TicketNotFound(id.as_str().to_string()))
    }

    /// Load `id` with its SLA deadline filled in.
    async fn load_for_evaluation(
        &self,
        catalog: &RuleCatalog,
        id: &TicketId,
        now: DateTime<Utc>,
    ) -> DeskResult<TicketSnapshot> {
        let ticket = self.load_ticket(id).await?;
        let policy = catalog.sla_policy_for(&ticket, now, &self.metrics);
        Ok(self.calculator().with_deadline(policy, ticket))
    }

    /// Handle one event evaluated at `now`.
    pub async fn handle_event_at(
        &self,
        event: TicketEvent,
        now: DateTime<Utc>,
    ) -> DeskResult<EventOutcome> {
        self.metrics.events_handled.inc();
        let catalog = self.catalog.current();
        let mut ticket = self.load_for_evaluation(&catalog, &event.ticket_id, now).await?;
        let mut report = ExecutionReport::default();

        let assignment = if event.kind == EventKind::Created && ticket.assigned_agent_id.is_none() {
            let outcome = self.selector.select_agent(&ticket, &catalog, now).await;
            let action = match outcome.agent() {
                Some(agent) => Action::assign_to(agent.clone()),
                None => Action::add_tag(self.executor.triage_tag()),
            };
            report.merge(self.executor.apply(&[action], &ticket, &catalog, now).await);
            // automations see the assignment
            ticket = self.load_for_evaluation(&catalog, &event.ticket_id, now).await?;
            Some(outcome)
        } else {
            None
        };

        let rules = self.dispatcher.matching_rules(event.kind, &ticket, &catalog, now);
        let fired_rules: Vec<String> = rules.iter().map(|r| r.header.id.clone()).collect();
        if !rules.is_empty() {
            self.metrics.automations_fired.add(rules.len() as u64);
            tracing::debug!(
                ticket_id = %ticket.id,
                event = %event.kind,
                rules = ?fired_rules,
                "Automations matched"
            );
            report.merge(self.executor.apply(&flatten(&rules), &ticket, &catalog, now).await);
        }

        Ok(EventOutcome {
            ticket_id: event.ticket_id,
            event: event.kind,
            catalog_version: catalog.version(),
            assignment,
            fired_rules,
            report,
        })
    }

    pub async fn reassign_at(
        &self,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> DeskResult<ReassignOutcome> {
        let catalog = self.catalog.current();
        let ticket = self.load_for_evaluation(&catalog, ticket_id, now).await?;
        let assignment = self.selector.select_agent(&ticket, &catalog, now).await;
        let action = match assignment.agent() {
            Some(agent) => Action::assign_to(agent.clone()),
            None => Action::add_tag(self.executor.triage_tag()),
        };
        let report = self.executor.apply(&[action], &ticket, &catalog, now).await;
        if !report.is_clean() {
            tracing::warn!(
                ticket_id = %ticket_id,
                outcome = ?assignment,
                "Reassignment was not recorded"
            );
        }
        Ok(ReassignOutcome {
            ticket_id: ticket_id.clone(),
            catalog_version: catalog.version(),
            assignment,
            report,
        })
    }

    /// SLA state of one ticket under the policy that governs it
    pub async fn sla_status(
        &self,
        ticket_id: &TicketId,
        now: DateTime<Utc>,
    ) -> DeskResult<Option<SlaStatus>> {
        let catalog = self.catalog.current();
        let ticket = self.load_ticket(ticket_id).await?;
        match catalog.sla_policy_for(&ticket, now, &self.metrics) {
            Some(policy) => Ok(Some(self.calculator().status(policy, &ticket, now)?)),
            None => Ok(None),
        }
    }

    pub async fn reload_catalog(
        &self,
        source: &dyn CatalogSource,
    ) -> Result<u64, ConfigurationError> {
        self.catalog.reload(source).await
    }

    /// Run the escalation scheduler in the background until `shutdown`
    /// flips to `true`.
    pub fn spawn_scheduler(&self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.scheduler.clone().run(shutdown))
    }

    pub fn stats(&self) -> EngineStats {
        self.metrics.snapshot(self.catalog.version())
    }
}

#[async_trait]
impl EngineUseCases for DeskEngine {
    async fn handle_event(&self, event: TicketEvent) -> DeskResult<EventOutcome> {
        self.handle_event_at(event, Utc::now()).await
    }

    async fn reassign(&self, ticket_id: &TicketId) -> DeskResult<ReassignOutcome> {
        self.reassign_at(ticket_id, Utc::now()).await
    }

    async fn run_escalation_tick(&self) -> DeskResult<TickReport> {
        self.scheduler.tick().await
    }
}
