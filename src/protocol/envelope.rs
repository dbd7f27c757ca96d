//! Message envelope shared by all agents
//!
//! A draft/sealed split enforces the bus-assignment invariant in the type
//! system: senders build a [`MessageDraft`] (no id, no timestamp); the bus
//! seals it into a [`Message`] exactly once at publish time. Every field
//! round-trips losslessly through serde.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Globally unique message identifier, assigned by the bus at publish time
pub type MessageId = Uuid;

/// Fixed enumeration of agent roles in the mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentRole {
    /// Market intelligence (prices, demand, volatility)
    MarketIntelligence,
    /// Climate and weather advisory
    ClimateAdvisory,
    /// Geo-agronomy (satellite yield forecasts, soil)
    GeoAgronomy,
    /// Financial inclusion (credit, insurance)
    FinancialInclusion,
    /// Logistics and supply chain
    Logistics,
    /// Collective management and governance (the CMGA)
    CollectiveManagement,
    /// Human interface / conversational front
    HumanInterface,
}

impl AgentRole {
    /// Stable string form, also used as the queue name
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::MarketIntelligence => "market-intelligence",
            AgentRole::ClimateAdvisory => "climate-advisory",
            AgentRole::GeoAgronomy => "geo-agronomy",
            AgentRole::FinancialInclusion => "financial-inclusion",
            AgentRole::Logistics => "logistics",
            AgentRole::CollectiveManagement => "collective-management",
            AgentRole::HumanInterface => "human-interface",
        }
    }

    /// All roles, in registration order
    pub fn all() -> &'static [AgentRole] {
        &[
            AgentRole::MarketIntelligence,
            AgentRole::ClimateAdvisory,
            AgentRole::GeoAgronomy,
            AgentRole::FinancialInclusion,
            AgentRole::Logistics,
            AgentRole::CollectiveManagement,
            AgentRole::HumanInterface,
        ]
    }
}

impl std::fmt::Display for AgentRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    Request,
    Response,
    Event,
    ContextUpdate,
    Broadcast,
}

/// Delivery priority. Higher ranks are serviced before lower ones when
/// multiple messages are queued for the same agent.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl Priority {
    /// Numeric rank used for queue ordering
    pub fn rank(&self) -> u8 {
        match self {
            Priority::Low => 0,
            Priority::Normal => 1,
            Priority::High => 2,
            Priority::Critical => 3,
        }
    }
}

/// Conversation/entity context attached to a message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct MessageContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub farmer_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpo_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub season: Option<String>,

    /// Ids of prior messages in this conversation, oldest first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub prior_messages: Vec<MessageId>,

    /// Free-form metadata owned by the attaching agent
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, Value>,
}

impl MessageContext {
    /// Context scoped to a single farmer
    pub fn for_farmer(farmer_id: impl Into<String>) -> Self {
        Self {
            farmer_id: Some(farmer_id.into()),
            ..Default::default()
        }
    }

    /// Context scoped to an FPO
    pub fn for_fpo(fpo_id: impl Into<String>) -> Self {
        Self {
            fpo_id: Some(fpo_id.into()),
            ..Default::default()
        }
    }

    /// Shallow merge: fields set in `other` override ours, metadata keys are
    /// overwritten per key, prior message lists are concatenated.
    pub fn merge(&mut self, other: &MessageContext) {
        if other.farmer_id.is_some() {
            self.farmer_id = other.farmer_id.clone();
        }
        if other.fpo_id.is_some() {
            self.fpo_id = other.fpo_id.clone();
        }
        if other.location.is_some() {
            self.location = other.location.clone();
        }
        if other.crop_type.is_some() {
            self.crop_type = other.crop_type.clone();
        }
        if other.season.is_some() {
            self.season = other.season.clone();
        }
        self.prior_messages.extend(other.prior_messages.iter().copied());
        for (k, v) in &other.metadata {
            self.metadata.insert(k.clone(), v.clone());
        }
    }
}

/// A message as built by a sender, before the bus assigns id and timestamp
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageDraft {
    #[serde(rename = "type")]
    pub msg_type: MessageType,

    pub source: AgentRole,

    /// Zero, one, or many delivery targets. Required for Request/Response/
    /// ContextUpdate, ignored for Broadcast.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<AgentRole>,

    /// Opaque business data; structure is owned by sender and receiver
    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,

    #[serde(default)]
    pub priority: Priority,

    /// Seconds after which the broker silently drops the message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    /// Pairs a Response with the Request that solicited it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl MessageDraft {
    pub fn request(source: AgentRole, target: AgentRole, payload: Value) -> Self {
        Self::new(MessageType::Request, source, vec![target], payload)
    }

    pub fn response(source: AgentRole, target: AgentRole, payload: Value) -> Self {
        Self::new(MessageType::Response, source, vec![target], payload)
    }

    pub fn event(source: AgentRole, targets: Vec<AgentRole>, payload: Value) -> Self {
        Self::new(MessageType::Event, source, targets, payload)
    }

    pub fn context_update(source: AgentRole, target: AgentRole, payload: Value) -> Self {
        Self::new(MessageType::ContextUpdate, source, vec![target], payload)
    }

    pub fn broadcast(source: AgentRole, payload: Value) -> Self {
        Self::new(MessageType::Broadcast, source, Vec::new(), payload)
    }

    fn new(msg_type: MessageType, source: AgentRole, target: Vec<AgentRole>, payload: Value) -> Self {
        Self {
            msg_type,
            source,
            target,
            payload,
            context: None,
            priority: Priority::Normal,
            ttl: None,
            correlation_id: None,
        }
    }

    pub fn with_context(mut self, context: MessageContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_ttl(mut self, ttl_secs: u64) -> Self {
        self.ttl = Some(ttl_secs);
        self
    }

    pub fn with_correlation(mut self, correlation_id: Uuid) -> Self {
        self.correlation_id = Some(correlation_id);
        self
    }
}

/// A sealed message. `id` and `timestamp` are assigned exactly once, by the
/// bus at publish time, and never mutated afterward.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,

    pub timestamp: DateTime<Utc>,

    #[serde(rename = "type")]
    pub msg_type: MessageType,

    pub source: AgentRole,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target: Vec<AgentRole>,

    pub payload: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<MessageContext>,

    #[serde(default)]
    pub priority: Priority,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Uuid>,
}

impl Message {
    /// Seal a draft into a delivered message. Only the bus calls this.
    pub(crate) fn seal(draft: MessageDraft, id: MessageId, timestamp: DateTime<Utc>) -> Self {
        Self {
            id,
            timestamp,
            msg_type: draft.msg_type,
            source: draft.source,
            target: draft.target,
            payload: draft.payload,
            context: draft.context,
            priority: draft.priority,
            ttl: draft.ttl,
            correlation_id: draft.correlation_id,
        }
    }

    /// Decode the payload into a typed value owned by the receiving agent
    pub fn decode_payload<T: serde::de::DeserializeOwned>(&self) -> crate::error::Result<T> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
        assert_eq!(Priority::Critical.rank(), 3);
    }

    #[test]
    fn test_context_merge_later_wins() {
        let mut base = MessageContext::for_farmer("f-1");
        base.season = Some("kharif".into());
        base.metadata
            .insert("soil".into(), Value::String("loamy".into()));

        let mut overlay = MessageContext::default();
        overlay.season = Some("rabi".into());
        overlay
            .metadata
            .insert("soil".into(), Value::String("clay".into()));
        overlay
            .metadata
            .insert("irrigated".into(), Value::Bool(true));

        base.merge(&overlay);
        assert_eq!(base.farmer_id.as_deref(), Some("f-1"));
        assert_eq!(base.season.as_deref(), Some("rabi"));
        assert_eq!(base.metadata["soil"], Value::String("clay".into()));
        assert_eq!(base.metadata["irrigated"], Value::Bool(true));
    }

    #[test]
    fn test_envelope_round_trip_preserves_every_field() {
        let draft = MessageDraft::request(
            AgentRole::CollectiveManagement,
            AgentRole::MarketIntelligence,
            serde_json::json!({"kind": "market_snapshot", "crops": ["wheat"]}),
        )
        .with_context(MessageContext::for_fpo("fpo-42"))
        .with_priority(Priority::High)
        .with_ttl(120)
        .with_correlation(Uuid::new_v4());

        let sealed = Message::seal(draft, Uuid::new_v4(), Utc::now());
        let json = serde_json::to_string(&sealed).unwrap();
        let back: Message = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, sealed.id);
        assert_eq!(back.timestamp, sealed.timestamp);
        assert_eq!(back.msg_type, sealed.msg_type);
        assert_eq!(back.source, sealed.source);
        assert_eq!(back.target, sealed.target);
        assert_eq!(back.payload, sealed.payload);
        assert_eq!(back.context, sealed.context);
        assert_eq!(back.priority, sealed.priority);
        assert_eq!(back.ttl, sealed.ttl);
        assert_eq!(back.correlation_id, sealed.correlation_id);
    }

    #[test]
    fn test_wire_vocabulary() {
        let json = serde_json::to_string(&MessageType::ContextUpdate).unwrap();
        assert_eq!(json, "\"CONTEXT_UPDATE\"");
        let json = serde_json::to_string(&AgentRole::GeoAgronomy).unwrap();
        assert_eq!(json, "\"geo-agronomy\"");
    }
}
