//! Assignment selector
//!
//! First-match-wins over the catalog's assignment rules, then one of three
//! agent-picking strategies inside the winning rule's pool. Directory data is
//! fetched before the strategy decides; the only shared mutable state is the
//! per-pool round-robin cursor.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::catalog::RuleCatalog;
use crate::domain::condition::rule_matches;
use crate::domain::{AgentId, AssignmentMethod, AssignmentRule, TicketSnapshot};
use crate::metrics::EngineMetrics;
use crate::ports::outbound::{AgentDirectory, DirectoryError};

/// Why no agent was picked
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnassignedReason {
    /// Catalog has no enabled rule matching the ticket
    NoRuleMatched,
    EmptyPool { pool: String },
    /// No pool member has every required skill
    NoQualifiedAgent { pool: String },
    DirectoryUnavailable { error: String },
}

impl fmt::Display for UnassignedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoRuleMatched => f.write_str("no assignment rule matched"),
            Self::EmptyPool { pool } => write!(f, "agent pool '{}' is empty", pool),
            Self::NoQualifiedAgent { pool } => {
                write!(f, "no agent in pool '{}' has the required skills", pool)
            }
            Self::DirectoryUnavailable { error } => {
                write!(f, "agent directory unavailable: {}", error)
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AssignmentOutcome {
    Assigned { agent: AgentId, rule_id: String },
    /// Ticket goes to manual triage
    Unassigned {
        rule_id: Option<String>,
        #[serde(flatten)]
        reason: UnassignedReason,
    },
}

impl AssignmentOutcome {
    pub fn agent(&self) -> Option<&AgentId> {
        match self {
            Self::Assigned { agent, .. } => Some(agent),
            Self::Unassigned { .. } => None,
        }
    }

    fn unassigned(rule: &AssignmentRule, reason: UnassignedReason) -> Self {
        Self::Unassigned {
            rule_id: Some(rule.header.id.clone()),
            reason,
        }
    }
}

/// Directory facts about one pool member, read before deciding
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub agent: AgentId,
    pub skills: BTreeSet<String>,
    pub open_load: u32,
}

pub struct AssignmentSelector {
    directory: Arc<dyn AgentDirectory>,
    /// Round-robin cursor per pool key
    cursors: DashMap<String, AtomicU64>,
    metrics: Arc<EngineMetrics>,
}

impl AssignmentSelector {
    pub fn new(directory: Arc<dyn AgentDirectory>, metrics: Arc<EngineMetrics>) -> Self {
        Self {
            directory,
            cursors: DashMap::new(),
            metrics,
        }
    }

    /// First enabled rule, in catalog evaluation order, whose conditions
    /// match.
    pub fn matching_rule<'c>(
        &self,
        catalog: &'c RuleCatalog,
        ticket: &TicketSnapshot,
        now: DateTime<Utc>,
    ) -> Option<&'c AssignmentRule> {
        catalog
            .assignment_rules()
            .filter(|r| r.header.enabled)
            .find(|r| rule_matches(&r.header.id, &r.header.conditions, ticket, now, &self.metrics))
    }

    pub async fn select_agent(
        &self,
        ticket: &TicketSnapshot,
        catalog: &RuleCatalog,
        now: DateTime<Utc>,
    ) -> AssignmentOutcome {
        let outcome = match self.matching_rule(catalog, ticket, now) {
            Some(rule) => self.select_in_rule(rule).await,
            None => {
                tracing::warn!(
                    ticket_id = %ticket.id,
                    catalog_version = catalog.version(),
                    "No assignment rule matched, catalog is missing a catch-all"
                );
                AssignmentOutcome::Unassigned {
                    rule_id: None,
                    reason: UnassignedReason::NoRuleMatched,
                }
            }
        };

        match &outcome {
            AssignmentOutcome::Assigned { agent, rule_id } => {
                self.metrics.assignments.inc();
                tracing::info!(
                    ticket_id = %ticket.id,
                    agent = %agent,
                    rule_id = %rule_id,
                    "Ticket assigned"
                );
            }
            AssignmentOutcome::Unassigned { rule_id, reason } => {
                self.metrics.unassigned.inc();
                tracing::info!(
                    ticket_id = %ticket.id,
                    rule_id = rule_id.as_deref().unwrap_or("-"),
                    reason = %reason,
                    "Ticket left unassigned for triage"
                );
            }
        }
        outcome
    }

    async fn select_in_rule(&self, rule: &AssignmentRule) -> AssignmentOutcome {
        let pool_key = rule.agent_pool.key().to_string();
        let members = match self.directory.get_pool(&rule.agent_pool).await {
            Ok(members) => members,
            Err(e) => return AssignmentOutcome::unassigned(rule, directory_unavailable(e)),
        };
        if members.is_empty() {
            return AssignmentOutcome::unassigned(
                rule,
                UnassignedReason::EmptyPool { pool: pool_key },
            );
        }

        let chosen = match rule.method {
            AssignmentMethod::RoundRobin => {
                let cursor = self.advance(&pool_key);
                Some(members[(cursor % members.len() as u64) as usize].clone())
            }
            AssignmentMethod::SkillBased => {
                let candidates = match self.candidates(&members, true).await {
                    Ok(candidates) => candidates,
                    Err(e) => return AssignmentOutcome::unassigned(rule, directory_unavailable(e)),
                };
                match pick_skill_based(&candidates, &rule.required_skills) {
                    Some(agent) => Some(agent),
                    None => {
                        return AssignmentOutcome::unassigned(
                            rule,
                            UnassignedReason::NoQualifiedAgent { pool: pool_key },
                        )
                    }
                }
            }
            AssignmentMethod::LoadBalanced => {
                let candidates = match self.candidates(&members, false).await {
                    Ok(candidates) => candidates,
                    Err(e) => return AssignmentOutcome::unassigned(rule, directory_unavailable(e)),
                };
                pick_least_loaded(&candidates, || self.advance(&pool_key))
            }
        };

        match chosen {
            Some(agent) => AssignmentOutcome::Assigned {
                agent,
                rule_id: rule.header.id.clone(),
            },
            None => {
                AssignmentOutcome::unassigned(rule, UnassignedReason::EmptyPool { pool: pool_key })
            }
        }
    }

    async fn candidates(
        &self,
        members: &[AgentId],
        with_skills: bool,
    ) -> Result<Vec<Candidate>, DirectoryError> {
        let mut candidates = Vec::with_capacity(members.len());
        for agent in members {
            let skills = if with_skills {
                self.directory.get_skills(agent).await?
            } else {
                BTreeSet::new()
            };
            let open_load = self.directory.get_open_load(agent).await?;
            candidates.push(Candidate {
                agent: agent.clone(),
                skills,
                open_load,
            });
        }
        Ok(candidates)
    }

    /// Atomic increment-and-read of the pool cursor
    fn advance(&self, pool_key: &str) -> u64 {
        if let Some(cursor) = self.cursors.get(pool_key) {
            return cursor.fetch_add(1, Ordering::Relaxed);
        }
        self.cursors
            .entry(pool_key.to_string())
            .or_default()
            .fetch_add(1, Ordering::Relaxed)
    }

    /// Current cursor for a pool, 0 if it never advanced
    pub fn cursor(&self, pool_key: &str) -> u64 {
        self.cursors.get(pool_key).map_or(0, |c| c.load(Ordering::Relaxed))
    }
}

fn directory_unavailable(error: DirectoryError) -> UnassignedReason {
    tracing::warn!(error = %error, "Agent directory lookup failed during assignment");
    UnassignedReason::DirectoryUnavailable { error: error.to_string() }
}

/// Least-loaded agent holding every required skill, ties by agent id.
pub fn pick_skill_based(candidates: &[Candidate], required: &[String]) -> Option<AgentId> {
    candidates
        .iter()
        .filter(|c| required.iter().all(|s| c.skills.contains(s)))
        .min_by(|a, b| a.open_load.cmp(&b.open_load).then_with(|| a.agent.cmp(&b.agent)))
        .map(|c| c.agent.clone())
}

/// Agent with the fewest open tickets; ties go to `cursor() % ties`.
pub fn pick_least_loaded(
    candidates: &[Candidate],
    cursor: impl FnOnce() -> u64,
) -> Option<AgentId> {
    let lowest = candidates.iter().map(|c| c.open_load).min()?;
    let tied: Vec<&Candidate> = candidates.iter().filter(|c| c.open_load == lowest).collect();
    let pick = match tied.len() {
        1 => 0,
        n => (cursor() % n as u64) as usize,
    };
    tied.get(pick).map(|c| c.agent.clone())
}
