//! Error types for the Agrimesh coordination substrate
//!
//! This module provides structured error definitions using thiserror. The
//! variants mirror the failure taxonomy of the mesh: protocol violations,
//! bus availability, request timeouts, handler failures, and validation.

use crate::protocol::AgentRole;
use thiserror::Error;

/// Main error type for Agrimesh operations
#[derive(Error, Debug)]
pub enum MeshError {
    /// Malformed message envelope rejected before reaching the broker
    #[error("Protocol violation: {0}")]
    Protocol(String),

    /// The message bus is not connected or has been closed
    #[error("Message bus unavailable: {0}")]
    BusUnavailable(String),

    /// No matching reply arrived within the request deadline
    #[error("Request to {target} timed out after {timeout_ms} ms")]
    RequestTimeout { target: AgentRole, timeout_ms: u64 },

    /// An agent's business logic failed while handling a message
    #[error("Handler error in {agent}: {reason}")]
    Handler { agent: AgentRole, reason: String },

    /// Input data failed sanity checks
    #[error("Validation failed: {0}")]
    Validation(String),

    /// A context write was lost; downstream state may be inconsistent
    #[error("Context write failed for {entity}: {reason}")]
    ContextWrite { entity: String, reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Agrimesh operations
pub type Result<T> = std::result::Result<T, MeshError>;
