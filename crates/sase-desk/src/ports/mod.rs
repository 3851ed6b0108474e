//! Ports module (Hexagonal Architecture)
//!
//! Defines the engine's use cases and the collaborators it reads from and
//! writes to.

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
