//! Inbound ports (Use case traits)
//!
//! Hexagonal architecture: what the surrounding application calls.

use async_trait::async_trait;

use crate::application::{EventOutcome, ReassignOutcome, TickReport};
use crate::domain::{TicketEvent, TicketId};
use crate::error::DeskResult;

/// Engine use cases
#[async_trait]
pub trait EngineUseCases: Send + Sync {
    /// Run assignment (on `created`) and event-triggered automations for one
    /// ticket event, inline on the caller's path.
    async fn handle_event(&self, event: TicketEvent) -> DeskResult<EventOutcome>;

    /// Pick a new agent for a ticket through the assignment rules
    async fn reassign(&self, ticket_id: &TicketId) -> DeskResult<ReassignOutcome>;

    /// One escalation pass over every open ticket
    async fn run_escalation_tick(&self) -> DeskResult<TickReport>;
}
