//! Domain module
//!
//! Contains all rule, ticket and SLA logic. Nothing in here performs I/O.

pub mod actions;
pub mod calendar;
pub mod condition;
pub mod events;
pub mod rules;
pub mod services;
pub mod snapshot;
pub mod value_objects;

pub use actions::*;
pub use calendar::BusinessCalendar;
pub use condition::*;
pub use events::*;
pub use rules::*;
pub use services::sla::{SlaCalculator, SlaPhase, SlaStatus};
pub use snapshot::TicketSnapshot;
pub use value_objects::*;
