//! Rule definitions
//!
//! One closed type per rule kind. Every kind shares a [`RuleHeader`].

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::actions::Action;
use crate::domain::calendar::MAX_CALENDAR_DAYS;
use crate::domain::condition::Condition;
use crate::domain::events::EventKind;
use crate::domain::value_objects::{AgentPool, DurationSpec, TimeUnit};

fn default_enabled() -> bool {
    true
}

/// Fields common to every rule kind
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleHeader {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Lower is evaluated first (assignment rules only)
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl RuleHeader {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            enabled: true,
            priority: None,
            conditions: Vec::new(),
        }
    }

    pub fn when(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentMethod {
    RoundRobin,
    SkillBased,
    LoadBalanced,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRule {
    #[serde(flatten)]
    pub header: RuleHeader,
    pub method: AssignmentMethod,
    pub agent_pool: AgentPool,
    #[serde(default)]
    pub required_skills: Vec<String>,
    /// Catch-all fallback; exactly one per catalog
    #[serde(default)]
    pub is_default: bool,
}

impl AssignmentRule {
    pub fn new(header: RuleHeader, method: AssignmentMethod, agent_pool: AgentPool) -> Self {
        Self {
            header,
            method,
            agent_pool,
            required_skills: Vec::new(),
            is_default: false,
        }
    }

    pub fn catch_all(id: &str, method: AssignmentMethod, agent_pool: AgentPool) -> Self {
        Self {
            is_default: true,
            ..Self::new(RuleHeader::new(id, "Default assignment"), method, agent_pool)
        }
    }

    pub fn requiring(mut self, skills: &[&str]) -> Self {
        self.required_skills = skills.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// One SLA clock
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaTarget {
    pub hours: f64,
    #[serde(default)]
    pub business_hours_only: bool,
}

impl SlaTarget {
    /// Longest clock a catalog may configure
    pub const MAX_HOURS: f64 = MAX_CALENDAR_DAYS as f64 * 24.0;

    pub fn business_hours(hours: f64) -> Self {
        Self { hours, business_hours_only: true }
    }

    pub fn wall_clock(hours: f64) -> Self {
        Self { hours, business_hours_only: false }
    }

    pub fn allowed(&self) -> chrono::Duration {
        chrono::Duration::seconds((self.hours * 3600.0).round() as i64)
    }
}

/// Rung of an SLA policy's escalation ladder
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaLevel {
    pub threshold_percent: u32,
    pub action: Action,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SlaPolicy {
    #[serde(flatten)]
    pub header: RuleHeader,
    pub response_time: SlaTarget,
    pub resolution_time: SlaTarget,
    #[serde(default)]
    pub escalation_levels: Vec<SlaLevel>,
    /// Applies when no other enabled policy matches
    #[serde(default)]
    pub is_default: bool,
}

impl SlaPolicy {
    pub fn new(header: RuleHeader, response_time: SlaTarget, resolution_time: SlaTarget) -> Self {
        Self {
            header,
            response_time,
            resolution_time,
            escalation_levels: Vec::new(),
            is_default: false,
        }
    }

    pub fn as_default(mut self) -> Self {
        self.is_default = true;
        self
    }

    pub fn with_level(mut self, threshold_percent: u32, action: Action) -> Self {
        self.escalation_levels.push(SlaLevel { threshold_percent, action });
        self
    }

    /// Id recorded in a ticket's fired levels for one ladder rung.
    pub fn level_id(&self, level: &SlaLevel) -> String {
        format!("{}@{}", self.header.id, level.threshold_percent)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EscalationTrigger {
    /// Active SLA clock has consumed at least `value` percent
    SlaPercentage { value: u32 },
    /// Ticket is older than the duration
    TimeElapsed { value: u32, unit: TimeUnit },
    /// Customer has waited longer than the duration for an agent reply
    NoResponse { value: u32, unit: TimeUnit },
}

impl EscalationTrigger {
    pub fn time_elapsed(after: DurationSpec) -> Self {
        Self::TimeElapsed { value: after.value, unit: after.unit }
    }

    pub fn no_response(after: DurationSpec) -> Self {
        Self::NoResponse { value: after.value, unit: after.unit }
    }

    /// Waiting period for duration triggers
    pub fn duration(&self) -> Option<DurationSpec> {
        match *self {
            Self::SlaPercentage { .. } => None,
            Self::TimeElapsed { value, unit } | Self::NoResponse { value, unit } => {
                Some(DurationSpec { value, unit })
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EscalationRule {
    #[serde(flatten)]
    pub header: RuleHeader,
    pub trigger: EscalationTrigger,
    pub actions: Vec<Action>,
}

impl EscalationRule {
    pub fn new(header: RuleHeader, trigger: EscalationTrigger, actions: Vec<Action>) -> Self {
        Self { header, trigger, actions }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TriggerEvent {
    TicketCreated,
    CustomerReply,
    AgentReply,
    StatusChanged,
    PriorityChanged,
    Assigned,
    /// Driven by the escalation scheduler once per interval
    TimeBased { every: DurationSpec },
}

impl TriggerEvent {
    pub fn fires_on(&self, kind: EventKind) -> bool {
        matches!(
            (self, kind),
            (Self::TicketCreated, EventKind::Created)
                | (Self::CustomerReply, EventKind::CustomerReply)
                | (Self::AgentReply, EventKind::AgentReply)
                | (Self::StatusChanged, EventKind::StatusChanged)
                | (Self::PriorityChanged, EventKind::PriorityChanged)
                | (Self::Assigned, EventKind::Assigned)
        )
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AutomationRule {
    #[serde(flatten)]
    pub header: RuleHeader,
    pub trigger_event: TriggerEvent,
    pub actions: Vec<Action>,
}

impl AutomationRule {
    pub fn new(header: RuleHeader, trigger_event: TriggerEvent, actions: Vec<Action>) -> Self {
        Self { header, trigger_event, actions }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKind {
    Assignment,
    Sla,
    Escalation,
    Automation,
}

impl RuleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Assignment => "assignment",
            Self::Sla => "sla",
            Self::Escalation => "escalation",
            Self::Automation => "automation",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any rule, for catalog edits
#[derive(Clone, Debug, PartialEq)]
pub enum Rule {
    Assignment(AssignmentRule),
    Sla(SlaPolicy),
    Escalation(EscalationRule),
    Automation(AutomationRule),
}

impl Rule {
    pub fn kind(&self) -> RuleKind {
        match self {
            Self::Assignment(_) => RuleKind::Assignment,
            Self::Sla(_) => RuleKind::Sla,
            Self::Escalation(_) => RuleKind::Escalation,
            Self::Automation(_) => RuleKind::Automation,
        }
    }

    pub fn header(&self) -> &RuleHeader {
        match self {
            Self::Assignment(r) => &r.header,
            Self::Sla(r) => &r.header,
            Self::Escalation(r) => &r.header,
            Self::Automation(r) => &r.header,
        }
    }
}

/// Unvalidated rule document, in authoring order
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleSet {
    #[serde(default)]
    pub assignment_rules: Vec<AssignmentRule>,
    #[serde(default)]
    pub sla_policies: Vec<SlaPolicy>,
    #[serde(default)]
    pub escalation_rules: Vec<EscalationRule>,
    #[serde(default)]
    pub automation_rules: Vec<AutomationRule>,
}

impl RuleSet {
    pub fn headers_mut(&mut self, kind: RuleKind) -> Vec<&mut RuleHeader> {
        match kind {
            RuleKind::Assignment => {
                self.assignment_rules.iter_mut().map(|r| &mut r.header).collect()
            }
            RuleKind::Sla => self.sla_policies.iter_mut().map(|r| &mut r.header).collect(),
            RuleKind::Escalation => {
                self.escalation_rules.iter_mut().map(|r| &mut r.header).collect()
            }
            RuleKind::Automation => {
                self.automation_rules.iter_mut().map(|r| &mut r.header).collect()
            }
        }
    }

    /// Insert or replace by id; a new rule goes to the end of its list.
    pub fn upsert(&mut self, rule: Rule) {
        fn put<T>(list: &mut Vec<T>, item: T, id: impl Fn(&T) -> &str) {
            let key = id(&item).to_string();
            match list.iter().position(|existing| id(existing) == key.as_str()) {
                Some(index) => list[index] = item,
                None => list.push(item),
            }
        }
        match rule {
            Rule::Assignment(r) => put(&mut self.assignment_rules, r, |r| r.header.id.as_str()),
            Rule::Sla(r) => put(&mut self.sla_policies, r, |r| r.header.id.as_str()),
            Rule::Escalation(r) => put(&mut self.escalation_rules, r, |r| r.header.id.as_str()),
            Rule::Automation(r) => put(&mut self.automation_rules, r, |r| r.header.id.as_str()),
        }
    }

    /// Remove by id, reporting whether anything was removed.
    pub fn remove(&mut self, kind: RuleKind, id: &str) -> bool {
        fn drop_id<T>(list: &mut Vec<T>, id: &str, key: impl Fn(&T) -> &str) -> bool {
            let before = list.len();
            list.retain(|item| key(item) != id);
            list.len() != before
        }
        match kind {
            RuleKind::Assignment => {
                drop_id(&mut self.assignment_rules, id, |r| r.header.id.as_str())
            }
            RuleKind::Sla => drop_id(&mut self.sla_policies, id, |r| r.header.id.as_str()),
            RuleKind::Escalation => {
                drop_id(&mut self.escalation_rules, id, |r| r.header.id.as_str())
            }
            RuleKind::Automation => {
                drop_id(&mut self.automation_rules, id, |r| r.header.id.as_str())
            }
        }
    }
}
