//! Agent runtime: subscription loop and response wrapping
//!
//! The runtime sits between an agent's business logic and the bus. Inbound
//! requests always get a response (success or failure) at High priority,
//! and a handler failure never escapes to take down the subscription loop.
//! Failures on non-request messages propagate so the broker's redelivery
//! ceiling applies.

use crate::agent::capability::{CapabilityDeclaration, CapabilityRegistry};
use crate::bus::{Delivery, MessageBus, MessageHandler, SubscriptionHandle};
use crate::context::{ContextSlice, ContextState, EntityId};
use crate::error::{MeshError, Result};
use crate::protocol::{
    AgentRole, MessageContext, MessageDraft, MessageId, MessageType, Priority,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Wire form of a reply to a Request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponsePayload {
    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Id of the Request this answers
    pub request_id: MessageId,
}

impl ResponsePayload {
    pub fn ok(data: Value, request_id: MessageId) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            request_id,
        }
    }

    pub fn err(error: impl Into<String>, request_id: MessageId) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            request_id,
        }
    }
}

/// Business logic contract every agent implements
#[async_trait]
pub trait Agent: Send + Sync + 'static {
    fn role(&self) -> AgentRole;

    /// Declared once at startup; immutable thereafter
    fn capabilities(&self) -> CapabilityDeclaration;

    /// Handle one inbound message and produce a result payload. Message
    /// handling is logically single-threaded per agent: the runtime keeps
    /// one invocation in flight at a time.
    async fn handle_message(&self, delivery: &Delivery) -> Result<Value>;
}

/// An agent's interface to the mesh: bus and context helpers that stamp
/// `source` automatically. Cheap to clone.
#[derive(Clone)]
pub struct AgentHandle {
    role: AgentRole,
    bus: MessageBus,
}

impl AgentHandle {
    pub fn new(role: AgentRole, bus: MessageBus) -> Self {
        Self { role, bus }
    }

    pub fn role(&self) -> AgentRole {
        self.role
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Publish a message of the given kind to one target
    pub async fn send_message(
        &self,
        msg_type: MessageType,
        target: AgentRole,
        payload: Value,
        context: Option<MessageContext>,
    ) -> Result<MessageId> {
        let mut draft = MessageDraft {
            msg_type,
            source: self.role,
            target: vec![target],
            payload,
            context: None,
            priority: Priority::Normal,
            ttl: None,
            correlation_id: None,
        };
        if let Some(context) = context {
            draft = draft.with_context(context);
        }
        self.bus.publish(draft).await
    }

    /// Request/reply against a peer. Unwraps the response envelope: a
    /// `success: false` reply surfaces as a handler error from that peer.
    pub async fn request_from_agent(
        &self,
        target: AgentRole,
        payload: Value,
        context: Option<MessageContext>,
        timeout: Option<Duration>,
    ) -> Result<Value> {
        let reply = self
            .bus
            .request(self.role, target, payload, context, timeout)
            .await?;
        let response: ResponsePayload = serde_json::from_value(reply)?;
        if response.success {
            Ok(response.data.unwrap_or(Value::Null))
        } else {
            Err(MeshError::Handler {
                agent: target,
                reason: response
                    .error
                    .unwrap_or_else(|| "peer reported failure without detail".into()),
            })
        }
    }

    pub async fn broadcast(
        &self,
        payload: Value,
        context: Option<MessageContext>,
    ) -> Result<MessageId> {
        self.bus.broadcast(self.role, payload, context).await
    }

    pub async fn get_context(&self, entity: &EntityId) -> ContextState {
        self.bus.context_store().get(entity).await
    }

    pub async fn update_context(
        &self,
        entity: &EntityId,
        slice: ContextSlice,
        partial: serde_json::Map<String, Value>,
        message_id: Option<MessageId>,
    ) -> Result<()> {
        self.bus
            .context_store()
            .update(entity, slice, partial, message_id)
            .await
    }
}

/// Owns an agent's subscription lifecycle
pub struct AgentRuntime {
    agent: Arc<dyn Agent>,
    handle: AgentHandle,
    registry: Option<CapabilityRegistry>,
    subscription: Option<SubscriptionHandle>,
}

impl AgentRuntime {
    pub fn new(agent: Arc<dyn Agent>, bus: MessageBus) -> Self {
        let handle = AgentHandle::new(agent.role(), bus);
        Self {
            agent,
            handle,
            registry: None,
            subscription: None,
        }
    }

    /// Publish this agent's capability declaration on start
    pub fn with_registry(mut self, registry: CapabilityRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn handle(&self) -> &AgentHandle {
        &self.handle
    }

    /// Declare capabilities and bind the agent's queue
    pub async fn start(&mut self) -> Result<()> {
        let role = self.agent.role();
        if let Some(registry) = &self.registry {
            registry.register(self.agent.capabilities()).await?;
        }
        let dispatcher = Arc::new(Dispatcher {
            agent: Arc::clone(&self.agent),
            bus: self.handle.bus().clone(),
        });
        self.subscription = Some(self.handle.bus().subscribe(role, dispatcher).await?);
        info!("Agent {} started", role);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.subscription
            .as_ref()
            .map(|s| !s.is_finished())
            .unwrap_or(false)
    }

    pub async fn stop(&mut self) {
        if let Some(subscription) = self.subscription.take() {
            subscription.abort();
            info!("Agent {} stopped", self.agent.role());
        }
    }
}

struct Dispatcher {
    agent: Arc<dyn Agent>,
    bus: MessageBus,
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, delivery: Delivery) -> Result<()> {
        let role = self.agent.role();
        let is_request = delivery.message.msg_type == MessageType::Request;
        let result = self.agent.handle_message(&delivery).await;

        if !is_request {
            // No reply path: let the broker's redelivery ceiling handle it
            return result.map(|_| ());
        }

        let request_id = delivery.message.id;
        let payload = match result {
            Ok(data) => ResponsePayload::ok(data, request_id),
            Err(e) => {
                warn!(
                    "Handler for {} failed on request {}: {}",
                    role, request_id, e
                );
                ResponsePayload::err(e.to_string(), request_id)
            }
        };

        let mut draft = MessageDraft::response(
            role,
            delivery.message.source,
            serde_json::to_value(payload)?,
        )
        .with_priority(Priority::High);
        if let Some(correlation_id) = delivery.message.correlation_id {
            draft = draft.with_correlation(correlation_id);
        }
        if let Some(context) = &delivery.message.context {
            draft = draft.with_context(context.clone());
        }
        self.bus.publish(draft).await?;
        Ok(())
    }
}
