//! Message Envelope & Protocol
//!
//! The shared vocabulary of the mesh: message kinds, priorities, addressing,
//! and context attachment, plus the routing logic that resolves a draft's
//! targets and validates the envelope before handoff to the broker.

pub mod envelope;
pub mod routing;

pub use envelope::{
    AgentRole, Message, MessageContext, MessageDraft, MessageId, MessageType, Priority,
};
pub use routing::{resolve_route, Route};
