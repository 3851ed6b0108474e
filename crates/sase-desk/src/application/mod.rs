//! Application layer
//!
//! Use-case orchestration over the domain and the outbound ports.

pub mod assignment;
pub mod dispatcher;
pub mod engine;
pub mod executor;
pub mod scheduler;

pub use assignment::{AssignmentOutcome, AssignmentSelector, UnassignedReason};
pub use dispatcher::AutomationDispatcher;
pub use engine::{DeskEngine, EventOutcome, ReassignOutcome};
pub use executor::{ActionExecutor, ActionFailure, ExecutionReport};
pub use scheduler::{EscalationScheduler, FiredLevel, PendingLevel, TickReport};
