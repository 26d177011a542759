//! Communication router
//!
//! Decides who hears a message and which agents an inbound event is handed
//! to. Both halves are stateless.

pub mod delivery;
pub mod routing;

pub use delivery::{CommunicationPolicy, Edge, PolicyKind};
pub use routing::{route, Assignment, EventRoute};
