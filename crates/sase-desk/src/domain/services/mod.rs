//! Domain services module

pub mod sla;

pub use sla::{SlaCalculator, SlaDeadlines, SlaPhase, SlaStatus};
