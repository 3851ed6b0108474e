//! Escalation scheduler
//!
//! One periodic pass over every open ticket. Per ticket it collects the
//! escalation levels that have become due and are not yet in the ticket's
//! fired set, orders them by the instant they became due, and fires each
//! exactly once: the level is recorded in the ticket store first and its
//! actions are emitted only when that call reports it newly recorded.
//!
//! The same pass drives `time_based` automations.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::application::dispatcher::{flatten, AutomationDispatcher};
use crate::application::executor::ActionExecutor;
use crate::catalog::{CatalogStore, RuleCatalog};
use crate::config::SchedulerConfig;
use crate::domain::condition::rule_matches;
use crate::domain::{
    Action, AutomationRule, EscalationRule, EscalationTrigger, SlaCalculator, SlaPolicy, TicketId,
    TicketSnapshot, TriggerEvent,
};
use crate::error::{DeskError, DeskResult};
use crate::metrics::EngineMetrics;
use crate::ports::outbound::TicketStore;

/// A level that is due and not yet fired
#[derive(Clone, Debug, PartialEq)]
pub struct PendingLevel<'c> {
    pub level_id: String,
    pub due_at: DateTime<Utc>,
    /// Percentage for SLA levels; duration triggers sort after them
    pub threshold: u32,
    /// Catalog position
    pub seq: usize,
    pub actions: &'c [Action],
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FiredLevel {
    pub ticket_id: TicketId,
    pub level_id: String,
    pub due_at: DateTime<Utc>,
}

/// Summary of one escalation pass
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub catalog_version: u64,
    pub tickets_scanned: usize,
    pub fired: Vec<FiredLevel>,
    pub automations_fired: usize,
    pub actions_applied: usize,
    pub actions_failed: usize,
    /// Pass exceeded its budget and was cut short
    pub timed_out: bool,
}

/// Due instant of a duration trigger counted from `since`, once passed.
/// A due time beyond the representable range is logged and skipped.
fn duration_due(
    rule: &EscalationRule,
    ticket: &TicketSnapshot,
    since: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<(DateTime<Utc>, u32)> {
    let (since, after) = since.zip(rule.trigger.duration())?;
    let Some(due_at) = since.checked_add_signed(after.to_duration()) else {
        tracing::warn!(
            ticket_id = %ticket.id,
            rule_id = %rule.header.id,
            after = %after,
            "Escalation due time is out of range, skipping rule"
        );
        return None;
    };
    (now > due_at).then_some((due_at, u32::MAX))
}

/// Releases the in-flight flag when the tick ends, however it ends
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct EscalationScheduler {
    catalog: Arc<CatalogStore>,
    store: Arc<dyn TicketStore>,
    executor: Arc<ActionExecutor>,
    calculator: SlaCalculator,
    dispatcher: AutomationDispatcher,
    metrics: Arc<EngineMetrics>,
    interval: Duration,
    budget: Duration,
    in_flight: AtomicBool,
    /// Last run of each time-based automation, by rule id
    automation_runs: DashMap<String, DateTime<Utc>>,
}

impl EscalationScheduler {
    pub fn new(
        catalog: Arc<CatalogStore>,
        store: Arc<dyn TicketStore>,
        executor: Arc<ActionExecutor>,
        calculator: SlaCalculator,
        metrics: Arc<EngineMetrics>,
        config: &SchedulerConfig,
    ) -> Self {
        Self {
            catalog,
            store,
            executor,
            calculator,
            dispatcher: AutomationDispatcher::new(metrics.clone()),
            metrics,
            interval: config.tick_interval(),
            budget: config.tick_budget(),
            in_flight: AtomicBool::new(false),
            automation_runs: DashMap::new(),
        }
    }

    pub fn calculator(&self) -> &SlaCalculator {
        &self.calculator
    }

    pub fn is_running_tick(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Levels due for `ticket` at `now`, in firing order.
    pub fn plan_escalations<'c>(
        &self,
        catalog: &'c RuleCatalog,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<PendingLevel<'c>> {
        let policy = catalog.sla_policy_for(ticket, now, &self.metrics);
        self.plan_under(catalog, policy, ticket, now)
    }

    /// [`Self::plan_escalations`] with the governing policy already chosen
    fn plan_under<'c>(
        &self,
        catalog: &'c RuleCatalog,
        policy: Option<&'c SlaPolicy>,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<PendingLevel<'c>> {
        let mut pending = Vec::new();
        let clock = policy.map(|p| self.calculator.active_target(p, ticket).1);
        let mut seq = 0;

        if let (Some(policy), Some(target)) = (policy, clock) {
            for level in &policy.escalation_levels {
                seq += 1;
                let level_id = policy.level_id(level);
                if ticket.has_fired(&level_id) {
                    continue;
                }
                let due = self
                    .calculator
                    .instant_at_percent(target, ticket.created_at, level.threshold_percent);
                match due {
                    Ok(due_at) if due_at <= now => pending.push(PendingLevel {
                        level_id,
                        due_at,
                        threshold: level.threshold_percent,
                        seq,
                        actions: std::slice::from_ref(&level.action),
                    }),
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(
                            ticket_id = %ticket.id,
                            level_id = %level_id,
                            error = %e,
                            "Cannot place SLA level"
                        )
                    }
                }
            }
        }

        for rule in catalog.escalation_rules() {
            seq += 1;
            if !rule.header.enabled || ticket.has_fired(&rule.header.id) {
                continue;
            }
            let due = match rule.trigger {
                EscalationTrigger::SlaPercentage { value } => clock.and_then(|target| {
                    match self.calculator.instant_at_percent(target, ticket.created_at, value) {
                        Ok(due_at) => (due_at <= now).then_some((due_at, value)),
                        Err(e) => {
                            tracing::warn!(
                                ticket_id = %ticket.id,
                                rule_id = %rule.header.id,
                                error = %e,
                                "Cannot place SLA trigger"
                            );
                            None
                        }
                    }
                }),
                EscalationTrigger::TimeElapsed { .. } => {
                    duration_due(rule, ticket, Some(ticket.created_at), now)
                }
                EscalationTrigger::NoResponse { .. } => {
                    duration_due(rule, ticket, ticket.awaiting_response_since(), now)
                }
            };
            let Some((due_at, threshold)) = due else {
                continue;
            };
            if !rule_matches(&rule.header.id, &rule.header.conditions, ticket, now, &self.metrics) {
                continue;
            }
            pending.push(PendingLevel {
                level_id: rule.header.id.clone(),
                due_at,
                threshold,
                seq,
                actions: &rule.actions,
            });
        }

        pending.sort_by(|a, b| (a.due_at, a.threshold, a.seq).cmp(&(b.due_at, b.threshold, b.seq)));
        pending
    }

    /// Time-based automations due at `now`; records the run.
    fn due_automations<'c>(
        &self,
        catalog: &'c RuleCatalog,
        now: DateTime<Utc>,
    ) -> Vec<&'c AutomationRule> {
        let mut due = Vec::new();
        for rule in catalog.time_based_automations() {
            let TriggerEvent::TimeBased { every } = rule.trigger_event else {
                continue;
            };
            let is_due = match self.automation_runs.get(&rule.header.id) {
                Some(last) => now - *last >= every.to_duration(),
                None => true,
            };
            if is_due {
                self.automation_runs.insert(rule.header.id.clone(), now);
                due.push(rule);
            }
        }
        due
    }

    pub async fn tick(&self) -> DeskResult<TickReport> {
        self.tick_at(Utc::now()).await
    }

    /// One pass evaluated at `now`. An overlapping call is dropped with
    /// [`DeskError::TickOverlap`].
    pub async fn tick_at(&self, now: DateTime<Utc>) -> DeskResult<TickReport> {
        let _guard = match self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => InFlight(&self.in_flight),
            Err(_) => {
                self.metrics.ticks_dropped.inc();
                tracing::warn!("Escalation tick still in flight, dropping overlapping tick");
                return Err(DeskError::TickOverlap);
            }
        };

        let started = Instant::now();
        let catalog = self.catalog.current();
        let mut report = TickReport {
            catalog_version: catalog.version(),
            ..Default::default()
        };

        let result =
            tokio::time::timeout(self.budget, self.run_pass(&catalog, now, &mut report)).await;
        let elapsed = started.elapsed();
        self.metrics.record_tick(elapsed);

        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Escalation tick aborted");
                return Err(e);
            }
            Err(_) => {
                report.timed_out = true;
                self.metrics.ticks_timed_out.inc();
                tracing::warn!(
                    budget_ms = self.budget.as_millis() as u64,
                    tickets_scanned = report.tickets_scanned,
                    "Escalation tick exceeded its budget, yielding until next tick"
                );
            }
        }

        self.metrics.ticks_completed.inc();
        tracing::info!(
            catalog_version = report.catalog_version,
            tickets = report.tickets_scanned,
            escalations = report.fired.len(),
            automations = report.automations_fired,
            elapsed_ms = elapsed.as_millis() as u64,
            "Escalation tick finished"
        );
        Ok(report)
    }

    async fn run_pass(
        &self,
        catalog: &RuleCatalog,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> DeskResult<()> {
        let tickets = self.store.get_open_tickets().await?;
        let due_automations = self.due_automations(catalog, now);

        for ticket in tickets.into_iter().filter(|t| t.is_open()) {
            let policy = catalog.sla_policy_for(&ticket, now, &self.metrics);
            let ticket = self.calculator.with_deadline(policy, ticket);
            for level in self.plan_under(catalog, policy, &ticket, now) {
                match self.store.mark_escalation_fired(&ticket.id, &level.level_id).await {
                    Ok(true) => {
                        self.metrics.escalations_fired.inc();
                        tracing::info!(
                            ticket_id = %ticket.id,
                            level_id = %level.level_id,
                            due_at = %level.due_at,
                            "Escalation level fired"
                        );
                        let executed =
                            self.executor.apply(level.actions, &ticket, catalog, now).await;
                        report.actions_applied += executed.applied;
                        report.actions_failed += executed.failures.len();
                        report.fired.push(FiredLevel {
                            ticket_id: ticket.id.clone(),
                            level_id: level.level_id,
                            due_at: level.due_at,
                        });
                    }
                    Ok(false) => {
                        tracing::debug!(
                            ticket_id = %ticket.id,
                            level_id = %level.level_id,
                            "Level already recorded"
                        );
                    }
                    Err(e) => {
                        tracing::warn!(
                            ticket_id = %ticket.id,
                            level_id = %level.level_id,
                            error = %e,
                            "Could not record escalation level, not firing"
                        );
                    }
                }
            }

            if !due_automations.is_empty() {
                let rules = self.dispatcher.on_schedule(&due_automations, &ticket, now);
                if !rules.is_empty() {
                    self.metrics.automations_fired.add(rules.len() as u64);
                    report.automations_fired += rules.len();
                    let executed =
                        self.executor.apply(&flatten(&rules), &ticket, catalog, now).await;
                    report.actions_applied += executed.applied;
                    report.actions_failed += executed.failures.len();
                }
            }

            report.tickets_scanned += 1;
            tokio::task::yield_now().await;
        }
        Ok(())
    }

    /// Tick every interval until `shutdown` flips to `true`. Missed ticks
    /// are skipped, never queued.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!(interval_secs = self.interval.as_secs(), "Escalation scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // errors are logged inside the tick
                    let _ = self.tick().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("Escalation scheduler stopped");
    }
}
