//! Rule catalog
//!
//! A [`RuleCatalog`] is a validated, immutable version of the rule set. It is
//! only ever built through [`RuleCatalog::load`], so every catalog in
//! circulation satisfies the load-time invariants (unique ids, well-formed
//! conditions, exactly one catch-all assignment rule, one default SLA policy).

mod store;

pub use store::CatalogStore;

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::path::Path;

use crate::domain::condition::rule_matches;
use crate::domain::calendar::MAX_CALENDAR_DAYS;
use crate::domain::{
    Action, AssignmentRule, AutomationRule, EscalationRule, EscalationTrigger, RuleHeader, RuleKind,
    RuleSet, SlaPolicy, SlaTarget, TicketSnapshot, TriggerEvent,
};
use crate::error::ConfigurationError;
use crate::metrics::EngineMetrics;

/// Highest SLA percentage a threshold may name
pub const MAX_THRESHOLD_PERCENT: u32 = 200;

/// Serialization of a rule catalog document
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogFormat {
    Yaml,
    Json,
}

impl CatalogFormat {
    /// `.json` is JSON, anything else is read as YAML.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }

    pub fn parse(&self, text: &str) -> Result<RuleSet, ConfigurationError> {
        match self {
            Self::Yaml => {
                serde_yaml::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))
            }
            Self::Json => {
                serde_json::from_str(text).map_err(|e| ConfigurationError::Parse(e.to_string()))
            }
        }
    }
}

/// Validated, immutable rule catalog version
#[derive(Clone, Debug)]
pub struct RuleCatalog {
    version: u64,
    rules: RuleSet,
    /// Assignment rule indices in evaluation order, catch-all last
    assignment_order: Vec<usize>,
    default_assignment: usize,
    default_sla: Option<usize>,
}

impl RuleCatalog {
    /// Validate `rules` and build a catalog from them.
    pub fn load(rules: RuleSet) -> Result<Self, ConfigurationError> {
        validate_headers(RuleKind::Assignment, rules.assignment_rules.iter().map(|r| &r.header))?;
        validate_headers(RuleKind::Sla, rules.sla_policies.iter().map(|r| &r.header))?;
        validate_headers(RuleKind::Escalation, rules.escalation_rules.iter().map(|r| &r.header))?;
        validate_headers(RuleKind::Automation, rules.automation_rules.iter().map(|r| &r.header))?;

        rules.assignment_rules.iter().try_for_each(validate_assignment)?;
        rules.sla_policies.iter().try_for_each(validate_sla_policy)?;
        rules.escalation_rules.iter().try_for_each(validate_escalation)?;
        rules.automation_rules.iter().try_for_each(validate_automation)?;

        let default_assignment = single_default(
            RuleKind::Assignment,
            rules.assignment_rules.iter().map(|r| (&r.header, r.is_default)),
        )?
        .ok_or(ConfigurationError::MissingDefaultAssignment)?;

        let default_sla = single_default(
            RuleKind::Sla,
            rules.sla_policies.iter().map(|p| (&p.header, p.is_default)),
        )?;
        if default_sla.is_none() && !rules.sla_policies.is_empty() {
            return Err(ConfigurationError::MissingDefaultSla);
        }

        let mut assignment_order: Vec<usize> = (0..rules.assignment_rules.len())
            .filter(|&i| i != default_assignment)
            .collect();
        assignment_order.sort_by_key(|&i| {
            (rules.assignment_rules[i].header.priority.unwrap_or(i32::MAX), i)
        });
        assignment_order.push(default_assignment);

        Ok(Self {
            version: 0,
            rules,
            assignment_order,
            default_assignment,
            default_sla,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigurationError> {
        Self::load(CatalogFormat::Yaml.parse(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self, ConfigurationError> {
        Self::load(CatalogFormat::Json.parse(text)?)
    }

    pub(crate) fn with_version(mut self, version: u64) -> Self {
        self.version = version;
        self
    }

    /// Version stamped by the [`CatalogStore`]; 0 for a catalog never stored.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Rules as authored
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    /// Assignment rules in evaluation order: ascending `priority`, then
    /// authoring order, with the catch-all rule always last.
    pub fn assignment_rules(&self) -> impl Iterator<Item = &AssignmentRule> + '_ {
        self.assignment_order.iter().map(|&i| &self.rules.assignment_rules[i])
    }

    pub fn default_assignment_rule(&self) -> &AssignmentRule {
        &self.rules.assignment_rules[self.default_assignment]
    }

    pub fn sla_policies(&self) -> &[SlaPolicy] {
        &self.rules.sla_policies
    }

    pub fn default_sla_policy(&self) -> Option<&SlaPolicy> {
        self.default_sla.map(|i| &self.rules.sla_policies[i])
    }

    pub fn escalation_rules(&self) -> &[EscalationRule] {
        &self.rules.escalation_rules
    }

    pub fn automation_rules(&self) -> &[AutomationRule] {
        &self.rules.automation_rules
    }

    /// Enabled automations driven by the scheduler rather than by events
    pub fn time_based_automations(&self) -> impl Iterator<Item = &AutomationRule> + '_ {
        self.rules
            .automation_rules
            .iter()
            .filter(|r| {
                r.header.enabled && matches!(r.trigger_event, TriggerEvent::TimeBased { .. })
            })
    }

    /// The one SLA policy governing `ticket`: the first enabled non-default
    /// policy whose conditions match, otherwise the default.
    pub fn sla_policy_for(
        &self,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
        metrics: &EngineMetrics,
    ) -> Option<&SlaPolicy> {
        self.rules
            .sla_policies
            .iter()
            .filter(|p| p.header.enabled && !p.is_default)
            .find(|p| rule_matches(&p.header.id, &p.header.conditions, ticket, now, metrics))
            .or_else(|| self.default_sla_policy())
    }

    pub fn rule_count(&self) -> usize {
        self.rules.assignment_rules.len()
            + self.rules.sla_policies.len()
            + self.rules.escalation_rules.len()
            + self.rules.automation_rules.len()
    }
}

fn validate_headers<'a>(
    kind: RuleKind,
    headers: impl Iterator<Item = &'a RuleHeader>,
) -> Result<(), ConfigurationError> {
    let mut seen = HashSet::new();
    for header in headers {
        if header.id.trim().is_empty() {
            return Err(ConfigurationError::InvalidRule {
                kind: kind.as_str(),
                id: header.id.clone(),
                reason: "id must not be empty".into(),
            });
        }
        if header.name.trim().is_empty() {
            return Err(ConfigurationError::InvalidRule {
                kind: kind.as_str(),
                id: header.id.clone(),
                reason: "name must not be empty".into(),
            });
        }
        if !seen.insert(header.id.as_str()) {
            return Err(ConfigurationError::DuplicateRuleId {
                kind: kind.as_str(),
                id: header.id.clone(),
            });
        }
        for condition in &header.conditions {
            condition.validate(&header.id)?;
        }
    }
    Ok(())
}

fn validate_actions(
    kind: RuleKind,
    header: &RuleHeader,
    actions: &[Action],
) -> Result<(), ConfigurationError> {
    if actions.is_empty() {
        return Err(ConfigurationError::InvalidRule {
            kind: kind.as_str(),
            id: header.id.clone(),
            reason: "at least one action is required".into(),
        });
    }
    actions.iter().try_for_each(|a| a.validate(&header.id))
}

fn validate_assignment(rule: &AssignmentRule) -> Result<(), ConfigurationError> {
    if rule.agent_pool.key().trim().is_empty() {
        return Err(ConfigurationError::InvalidRule {
            kind: RuleKind::Assignment.as_str(),
            id: rule.header.id.clone(),
            reason: "agent pool must be named".into(),
        });
    }
    Ok(())
}

fn validate_sla_policy(policy: &SlaPolicy) -> Result<(), ConfigurationError> {
    let invalid = |reason: String| ConfigurationError::InvalidSlaPolicy {
        id: policy.header.id.clone(),
        reason,
    };
    let clocks = [
        ("response_time", &policy.response_time),
        ("resolution_time", &policy.resolution_time),
    ];
    for (clock, target) in clocks {
        if !target.hours.is_finite() || target.hours <= 0.0 {
            return Err(invalid(format!("{} must be a positive number of hours", clock)));
        }
        if target.hours > SlaTarget::MAX_HOURS {
            return Err(invalid(format!(
                "{} of {} hours exceeds the {} hour limit",
                clock,
                target.hours,
                SlaTarget::MAX_HOURS
            )));
        }
    }
    let mut previous = 0;
    for level in &policy.escalation_levels {
        let threshold = level.threshold_percent;
        if threshold == 0 || threshold > MAX_THRESHOLD_PERCENT {
            return Err(invalid(format!(
                "threshold {}% is outside 1..={}",
                threshold, MAX_THRESHOLD_PERCENT
            )));
        }
        if threshold <= previous {
            return Err(invalid("escalation thresholds must be strictly ascending".into()));
        }
        previous = threshold;
        level.action.validate(&policy.header.id)?;
    }
    Ok(())
}

fn validate_escalation(rule: &EscalationRule) -> Result<(), ConfigurationError> {
    let invalid = |reason: &str| ConfigurationError::InvalidTrigger {
        id: rule.header.id.clone(),
        reason: reason.into(),
    };
    match rule.trigger {
        EscalationTrigger::SlaPercentage { value }
            if value == 0 || value > MAX_THRESHOLD_PERCENT =>
        {
            return Err(invalid("sla_percentage must be within 1..=200"));
        }
        EscalationTrigger::TimeElapsed { value: 0, .. }
        | EscalationTrigger::NoResponse { value: 0, .. } => {
            return Err(invalid("duration must be positive"));
        }
        _ => {}
    }
    if rule.trigger.duration().is_some_and(|d| d.exceeds_days(MAX_CALENDAR_DAYS)) {
        return Err(ConfigurationError::InvalidTrigger {
            id: rule.header.id.clone(),
            reason: format!("duration exceeds the {} day limit", MAX_CALENDAR_DAYS),
        });
    }
    validate_actions(RuleKind::Escalation, &rule.header, &rule.actions)
}

fn validate_automation(rule: &AutomationRule) -> Result<(), ConfigurationError> {
    if let TriggerEvent::TimeBased { every } = rule.trigger_event {
        let reason = if every.value == 0 {
            Some("time_based schedule must be positive".to_string())
        } else if every.exceeds_days(MAX_CALENDAR_DAYS) {
            Some(format!("time_based schedule exceeds the {} day limit", MAX_CALENDAR_DAYS))
        } else {
            None
        };
        if let Some(reason) = reason {
            return Err(ConfigurationError::InvalidRule {
                kind: RuleKind::Automation.as_str(),
                id: rule.header.id.clone(),
                reason,
            });
        }
    }
    validate_actions(RuleKind::Automation, &rule.header, &rule.actions)
}

/// Index of the single rule flagged default, checking it is enabled and
/// unconditional.
fn single_default<'a>(
    kind: RuleKind,
    rules: impl Iterator<Item = (&'a RuleHeader, bool)>,
) -> Result<Option<usize>, ConfigurationError> {
    let defaults: Vec<(usize, &RuleHeader)> = rules
        .enumerate()
        .filter(|(_, (_, is_default))| *is_default)
        .map(|(i, (header, _))| (i, header))
        .collect();

    match defaults.as_slice() {
        [] => Ok(None),
        [(index, header)] => {
            if !header.enabled || !header.conditions.is_empty() {
                return Err(ConfigurationError::InvalidDefault {
                    kind: kind.as_str(),
                    id: header.id.clone(),
                });
            }
            Ok(Some(*index))
        }
        many => {
            let ids = many.iter().map(|(_, h)| h.id.clone()).collect();
            Err(match kind {
                RuleKind::Sla => ConfigurationError::MultipleDefaultSla(ids),
                _ => ConfigurationError::MultipleDefaultAssignment(ids),
            })
        }
    }
}
