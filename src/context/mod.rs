//! Context Store
//!
//! TTL-scoped key/value state shared across agents:
//! - Per-entity context (farmer or FPO) split into named slices, each merged
//!   shallowly on update and stamped with its last write time
//! - Short-lived per-message context snapshots used to correlate a reply
//!   with the conversation that spawned it
//! - A bounded recency list of message ids per entity for replay/debugging
//!
//! Reads never fail: an absent or expired entity resolves to the empty
//! state. Writes are fallible and must stay that way, since losing a write
//! silently produces inconsistent downstream state.

use crate::config::ContextSettings;
use crate::error::{MeshError, Result};
use crate::protocol::{MessageContext, MessageId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Entity a context belongs to. Farmer-scoped state is short-lived; FPO
/// state changes less often and is more expensive to recompute, so it lives
/// longer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum EntityId {
    Farmer(String),
    Fpo(String),
}

impl EntityId {
    pub fn farmer(id: impl Into<String>) -> Self {
        EntityId::Farmer(id.into())
    }

    pub fn fpo(id: impl Into<String>) -> Self {
        EntityId::Fpo(id.into())
    }

    /// Entity referenced by a message context, FPO taking precedence over
    /// farmer when both are present (collective state is the wider scope)
    pub fn from_context(context: &MessageContext) -> Option<Self> {
        if let Some(fpo) = &context.fpo_id {
            Some(EntityId::Fpo(fpo.clone()))
        } else {
            context.farmer_id.clone().map(EntityId::Farmer)
        }
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityId::Farmer(id) => write!(f, "farmer:{}", id),
            EntityId::Fpo(id) => write!(f, "fpo:{}", id),
        }
    }
}

/// Named context slices. Each slice is conventionally owned and written by
/// one agent type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextSlice {
    Farm,
    Market,
    Weather,
    Fpo,
}

impl ContextSlice {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextSlice::Farm => "farm",
            ContextSlice::Market => "market",
            ContextSlice::Weather => "weather",
            ContextSlice::Fpo => "fpo",
        }
    }
}

/// One slice of an entity's context
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceState {
    pub data: serde_json::Map<String, Value>,
    pub updated_at: DateTime<Utc>,
}

/// Full context state for one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextState {
    pub slices: HashMap<ContextSlice, SliceState>,
}

impl ContextState {
    pub fn slice(&self, slice: ContextSlice) -> Option<&SliceState> {
        self.slices.get(&slice)
    }

    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

struct EntityEntry {
    slices: HashMap<ContextSlice, SliceState>,
    expires_at: DateTime<Utc>,
    recent_messages: VecDeque<MessageId>,
}

struct MessageSnapshot {
    context: MessageContext,
    expires_at: DateTime<Utc>,
}

struct StoreInner {
    entities: HashMap<EntityId, EntityEntry>,
    snapshots: HashMap<MessageId, MessageSnapshot>,
    open: bool,
}

/// Thread-safe, TTL-scoped context store
#[derive(Clone)]
pub struct ContextStore {
    inner: Arc<RwLock<StoreInner>>,
    settings: ContextSettings,
}

impl ContextStore {
    pub fn new(settings: ContextSettings) -> Self {
        Self {
            inner: Arc::new(RwLock::new(StoreInner {
                entities: HashMap::new(),
                snapshots: HashMap::new(),
                open: true,
            })),
            settings,
        }
    }

    fn ttl_for(&self, entity: &EntityId) -> Duration {
        let secs = match entity {
            EntityId::Farmer(_) => self.settings.farmer_ttl_secs,
            EntityId::Fpo(_) => self.settings.fpo_ttl_secs,
        };
        Duration::seconds(secs as i64)
    }

    /// Current context for an entity. Absent or expired state resolves to
    /// the empty state, never an error.
    pub async fn get(&self, entity: &EntityId) -> ContextState {
        let inner = self.inner.read().await;
        match inner.entities.get(entity) {
            Some(entry) if entry.expires_at > Utc::now() => ContextState {
                slices: entry.slices.clone(),
            },
            _ => ContextState::default(),
        }
    }

    /// Merge `partial` into the named slice, stamping its update time and
    /// re-arming the entity TTL (sliding expiration). When the write belongs
    /// to a message, the id is appended to the entity's bounded recency list.
    pub async fn update(
        &self,
        entity: &EntityId,
        slice: ContextSlice,
        partial: serde_json::Map<String, Value>,
        message_id: Option<MessageId>,
    ) -> Result<()> {
        let now = Utc::now();
        let ttl = self.ttl_for(entity);
        let mut inner = self.inner.write().await;
        if !inner.open {
            return Err(MeshError::ContextWrite {
                entity: entity.to_string(),
                reason: "store is shut down".into(),
            });
        }

        let entry = inner.entities.entry(entity.clone()).or_insert_with(|| EntityEntry {
            slices: HashMap::new(),
            expires_at: now + ttl,
            recent_messages: VecDeque::new(),
        });

        let state = entry.slices.entry(slice).or_insert_with(|| SliceState {
            data: serde_json::Map::new(),
            updated_at: now,
        });
        for (k, v) in partial {
            state.data.insert(k, v);
        }
        state.updated_at = now;
        entry.expires_at = now + ttl;

        if let Some(id) = message_id {
            entry.recent_messages.push_back(id);
            while entry.recent_messages.len() > self.settings.recent_messages_cap {
                entry.recent_messages.pop_front();
            }
        }
        Ok(())
    }

    /// Fold the stored context snapshots of an ordered message chain into a
    /// single effective context, later entries overriding earlier ones.
    /// Unknown or expired ids contribute nothing.
    pub async fn resolve_chain(&self, message_ids: &[MessageId]) -> MessageContext {
        let now = Utc::now();
        let inner = self.inner.read().await;
        let mut merged = MessageContext::default();
        for id in message_ids {
            if let Some(snapshot) = inner.snapshots.get(id) {
                if snapshot.expires_at > now {
                    merged.merge(&snapshot.context);
                }
            }
        }
        merged
    }

    /// Explicit deletion, bypassing TTL (e.g. on logout)
    pub async fn clear(&self, entity: &EntityId) {
        let mut inner = self.inner.write().await;
        inner.entities.remove(entity);
    }

    /// Persist the context attached to a freshly published message, keyed by
    /// the bus-assigned id. Called by the broker at publish time.
    pub(crate) async fn snapshot_message(
        &self,
        id: MessageId,
        context: &MessageContext,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if !inner.open {
            return Err(MeshError::ContextWrite {
                entity: format!("message:{}", id),
                reason: "store is shut down".into(),
            });
        }
        inner.snapshots.insert(
            id,
            MessageSnapshot {
                context: context.clone(),
                expires_at: Utc::now()
                    + Duration::seconds(self.settings.message_ttl_secs as i64),
            },
        );
        Ok(())
    }

    /// Message ids recently written against this entity, oldest first
    pub async fn recent_messages(&self, entity: &EntityId) -> Vec<MessageId> {
        let inner = self.inner.read().await;
        inner
            .entities
            .get(entity)
            .map(|e| e.recent_messages.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Drop every expired entity and message snapshot. Returns the number of
    /// entries removed; expiry is otherwise lazy on read.
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut inner = self.inner.write().await;
        let before = inner.entities.len() + inner.snapshots.len();
        inner.entities.retain(|_, e| e.expires_at > now);
        inner.snapshots.retain(|_, s| s.expires_at > now);
        let removed = before - (inner.entities.len() + inner.snapshots.len());
        if removed > 0 {
            debug!("Purged {} expired context entries", removed);
        }
        removed
    }

    /// Refuse further writes. Reads keep degrading to the empty state.
    pub(crate) async fn shutdown(&self) {
        let mut inner = self.inner.write().await;
        inner.open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_settings() -> ContextSettings {
        ContextSettings {
            farmer_ttl_secs: 3600,
            fpo_ttl_secs: 86400,
            message_ttl_secs: 600,
            recent_messages_cap: 3,
        }
    }

    fn map(pairs: &[(&str, Value)]) -> serde_json::Map<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[tokio::test]
    async fn test_get_missing_returns_empty() {
        let store = ContextStore::new(test_settings());
        let state = store.get(&EntityId::farmer("f-1")).await;
        assert!(state.is_empty());
    }

    #[tokio::test]
    async fn test_update_merges_slice() {
        let store = ContextStore::new(test_settings());
        let farmer = EntityId::farmer("f-1");

        store
            .update(&farmer, ContextSlice::Farm, map(&[("soil", json!("loamy"))]), None)
            .await
            .unwrap();
        store
            .update(
                &farmer,
                ContextSlice::Farm,
                map(&[("area_ha", json!(2.5)), ("soil", json!("clay"))]),
                None,
            )
            .await
            .unwrap();

        let state = store.get(&farmer).await;
        let farm = state.slice(ContextSlice::Farm).unwrap();
        assert_eq!(farm.data["soil"], json!("clay"));
        assert_eq!(farm.data["area_ha"], json!(2.5));
    }

    #[tokio::test]
    async fn test_recency_list_is_bounded() {
        let store = ContextStore::new(test_settings());
        let fpo = EntityId::fpo("fpo-9");

        let ids: Vec<MessageId> = (0..5).map(|_| uuid::Uuid::new_v4()).collect();
        for id in &ids {
            store
                .update(&fpo, ContextSlice::Fpo, map(&[("n", json!(1))]), Some(*id))
                .await
                .unwrap();
        }

        let recent = store.recent_messages(&fpo).await;
        assert_eq!(recent.len(), 3);
        assert_eq!(recent, ids[2..].to_vec());
    }

    #[tokio::test]
    async fn test_clear_bypasses_ttl() {
        let store = ContextStore::new(test_settings());
        let farmer = EntityId::farmer("f-2");
        store
            .update(&farmer, ContextSlice::Market, map(&[("p", json!(1))]), None)
            .await
            .unwrap();
        store.clear(&farmer).await;
        assert!(store.get(&farmer).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_chain_later_overrides() {
        let store = ContextStore::new(test_settings());
        let first = uuid::Uuid::new_v4();
        let second = uuid::Uuid::new_v4();

        let mut early = MessageContext::for_farmer("f-1");
        early.season = Some("kharif".into());
        let mut late = MessageContext::default();
        late.season = Some("rabi".into());
        late.crop_type = Some("wheat".into());

        store.snapshot_message(first, &early).await.unwrap();
        store.snapshot_message(second, &late).await.unwrap();

        let merged = store.resolve_chain(&[first, second]).await;
        assert_eq!(merged.farmer_id.as_deref(), Some("f-1"));
        assert_eq!(merged.season.as_deref(), Some("rabi"));
        assert_eq!(merged.crop_type.as_deref(), Some("wheat"));

        // Unknown ids contribute nothing
        let merged = store.resolve_chain(&[uuid::Uuid::new_v4()]).await;
        assert_eq!(merged, MessageContext::default());
    }

    #[tokio::test]
    async fn test_write_after_shutdown_is_surfaced() {
        let store = ContextStore::new(test_settings());
        store.shutdown().await;
        let err = store
            .update(
                &EntityId::farmer("f-1"),
                ContextSlice::Farm,
                map(&[("x", json!(1))]),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MeshError::ContextWrite { .. }));
        // Reads degrade to empty instead of failing
        assert!(store.get(&EntityId::farmer("f-1")).await.is_empty());
    }
}
