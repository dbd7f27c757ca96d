//! Target resolution and envelope validation
//!
//! Pure routing logic with no side effects. Malformed envelopes are rejected
//! here, before they ever reach the broker; a missing target on an addressed
//! message type must never be silently dropped downstream.

use crate::error::{MeshError, Result};
use crate::protocol::envelope::{AgentRole, MessageDraft, MessageType};

/// Delivery destinations for a validated draft
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// One copy to every agent queue (wildcard topic)
    Broadcast,
    /// One routed copy per target queue
    Direct(Vec<AgentRole>),
}

/// Validate a draft and resolve its delivery route.
///
/// Rules:
/// - Request/Response/ContextUpdate require at least one target.
/// - Broadcast ignores any targets it carries.
/// - Event goes to its targets when addressed, to everyone when not.
/// - A zero-second TTL is a contradiction (expired before publish) and is
///   rejected rather than guessed at.
pub fn resolve_route(draft: &MessageDraft) -> Result<Route> {
    if draft.ttl == Some(0) {
        return Err(MeshError::Protocol(format!(
            "{:?} message from {} has zero ttl",
            draft.msg_type, draft.source
        )));
    }

    match draft.msg_type {
        MessageType::Request | MessageType::Response | MessageType::ContextUpdate => {
            if draft.target.is_empty() {
                return Err(MeshError::Protocol(format!(
                    "{:?} message from {} has no target",
                    draft.msg_type, draft.source
                )));
            }
            Ok(Route::Direct(dedup_targets(&draft.target)))
        }
        MessageType::Broadcast => Ok(Route::Broadcast),
        MessageType::Event => {
            if draft.target.is_empty() {
                Ok(Route::Broadcast)
            } else {
                Ok(Route::Direct(dedup_targets(&draft.target)))
            }
        }
    }
}

/// Preserve first-seen order while dropping duplicate targets, so a fan-out
/// never delivers the same message twice to one queue.
fn dedup_targets(targets: &[AgentRole]) -> Vec<AgentRole> {
    let mut seen = Vec::with_capacity(targets.len());
    for role in targets {
        if !seen.contains(role) {
            seen.push(*role);
        }
    }
    seen
}
