//! OpenSASE Help-Desk Automation Engine
//!
//! Turns a catalog of declarative rules into deterministic ticket actions:
//! who receives a new ticket, when an SLA clock has been breached, and which
//! side effects fire on ticket events or elapsed time.
//!
//! ## Architecture
//!
//! ```text
//!   ticket events ──► AutomationDispatcher ─┐
//!                                           ├──► ActionExecutor ──► ports
//!   timer tick ────► EscalationScheduler ───┘          ▲
//!                         │                             │
//!                    SlaCalculator              AssignmentSelector
//!                         │                             │
//!                         └──────── RuleCatalog ────────┘
//!                                 (copy-on-write)
//! ```
//!
//! - **Domain Layer**: value objects, ticket snapshots, conditions, rules,
//!   actions, business calendar and SLA arithmetic
//! - **Catalog**: validated, immutable rule catalog behind an atomic swap
//! - **Ports Layer**: ticket store, agent directory, notification sink,
//!   catalog source
//! - **Application Layer**: assignment, dispatch, escalation, execution
//! - **Infrastructure Layer**: in-memory and file adapters
//!
//! The engine never performs I/O while deciding: everything a decision needs
//! is read through the ports first, then evaluated against an immutable
//! snapshot.

#![warn(clippy::all)]

pub mod application;
pub mod catalog;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod metrics;
pub mod ports;

pub use application::{
    ActionExecutor, AssignmentOutcome, AssignmentSelector, AutomationDispatcher, DeskEngine,
    EscalationScheduler, EventOutcome, ExecutionReport, ReassignOutcome, TickReport,
};
pub use catalog::{CatalogStore, RuleCatalog};
pub use config::EngineConfig;
pub use domain::{
    Action, AgentId, AssignmentMethod, AssignmentRule, AutomationRule, BusinessCalendar,
    Condition, ConditionValue, EscalationRule, EscalationTrigger, EventKind, Field, Operator,
    Priority, Rule, RuleKind, RuleSet, SlaCalculator, SlaPolicy, TicketEvent, TicketId,
    TicketPatch, TicketSnapshot, TicketStatus,
};
pub use error::{ConfigurationError, DeskError, DeskResult, EvaluationSkip};
pub use metrics::{EngineMetrics, EngineStats};
pub use ports::inbound::EngineUseCases;
pub use ports::outbound::{AgentDirectory, CatalogSource, NotificationSink, TicketStore};
