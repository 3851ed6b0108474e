//! Automation dispatcher

use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::catalog::RuleCatalog;
use crate::domain::condition::rule_matches;
use crate::domain::{Action, AutomationRule, EventKind, TicketSnapshot};
use crate::metrics::EngineMetrics;

/// Matches automations against events. Every enabled matching rule fires,
/// in catalog order; automations are cumulative, not first-match.
#[derive(Clone, Debug)]
pub struct AutomationDispatcher {
    metrics: Arc<EngineMetrics>,
}

impl AutomationDispatcher {
    pub fn new(metrics: Arc<EngineMetrics>) -> Self {
        Self { metrics }
    }

    pub fn matching_rules<'c>(
        &self,
        event: EventKind,
        ticket: &TicketSnapshot,
        catalog: &'c RuleCatalog,
        now: DateTime<Utc>,
    ) -> Vec<&'c AutomationRule> {
        catalog
            .automation_rules()
            .iter()
            .filter(|r| r.header.enabled && r.trigger_event.fires_on(event))
            .filter(|r| {
                rule_matches(&r.header.id, &r.header.conditions, ticket, now, &self.metrics)
            })
            .collect()
    }

    /// Flat, ordered action list for one event
    pub fn on_event(
        &self,
        event: EventKind,
        ticket: &TicketSnapshot,
        catalog: &RuleCatalog,
        now: DateTime<Utc>,
    ) -> Vec<Action> {
        flatten(&self.matching_rules(event, ticket, catalog, now))
    }

    /// Due `time_based` rules whose conditions hold for `ticket`
    pub fn on_schedule<'r>(
        &self,
        due: &[&'r AutomationRule],
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> Vec<&'r AutomationRule> {
        due.iter()
            .copied()
            .filter(|r| {
                rule_matches(&r.header.id, &r.header.conditions, ticket, now, &self.metrics)
            })
            .collect()
    }
}

pub fn flatten(rules: &[&AutomationRule]) -> Vec<Action> {
    rules.iter().flat_map(|r| r.actions.iter().cloned()).collect()
}
