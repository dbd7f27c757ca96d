//! Agent Base Contract
//!
//! The lifecycle every agent implements: declare capabilities once,
//! subscribe a queue on start, dispatch inbound messages to a handler, and
//! wrap results or failures into response messages. Helper methods for
//! sending, requesting, and broadcasting are thin wrappers over the bus
//! that stamp `source` automatically.

pub mod capability;
pub mod runtime;

pub use capability::{CapabilityDeclaration, CapabilityRegistry};
pub use runtime::{Agent, AgentHandle, AgentRuntime, ResponsePayload};
