//! Agent capability declarations
//!
//! Each agent declares, once at startup, who it is, what it can do, and
//! which peers it depends on. Declarations are immutable after registration
//! and introspectable by other agents for dependency discovery.

use crate::error::{MeshError, Result};
use crate::protocol::AgentRole;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::info;

/// Static description of one agent type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapabilityDeclaration {
    pub role: AgentRole,

    /// Semantic version of the agent implementation
    pub version: String,

    /// Capability tags, e.g. "portfolio-optimization"
    pub capabilities: Vec<String>,

    /// Named input schema hints. Informational only; the protocol layer
    /// does not enforce them.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub input_hints: HashMap<String, String>,

    /// Named output schema hints, informational only
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub output_hints: HashMap<String, String>,

    /// Peers this agent issues requests to
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<AgentRole>,
}

impl CapabilityDeclaration {
    pub fn new(role: AgentRole, version: impl Into<String>) -> Self {
        Self {
            role,
            version: version.into(),
            capabilities: Vec::new(),
            input_hints: HashMap::new(),
            output_hints: HashMap::new(),
            depends_on: Vec::new(),
        }
    }

    pub fn with_capability(mut self, tag: impl Into<String>) -> Self {
        self.capabilities.push(tag.into());
        self
    }

    pub fn with_dependency(mut self, role: AgentRole) -> Self {
        self.depends_on.push(role);
        self
    }

    pub fn with_input_hint(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        self.input_hints.insert(name.into(), hint.into());
        self
    }

    pub fn with_output_hint(mut self, name: impl Into<String>, hint: impl Into<String>) -> Self {
        self.output_hints.insert(name.into(), hint.into());
        self
    }
}

/// Thread-safe registry of declared capabilities
#[derive(Clone, Default)]
pub struct CapabilityRegistry {
    declarations: Arc<RwLock<HashMap<AgentRole, CapabilityDeclaration>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a declaration. A role declares exactly once; a second
    /// registration for the same role is a protocol violation.
    pub async fn register(&self, declaration: CapabilityDeclaration) -> Result<()> {
        let mut declarations = self.declarations.write().await;
        if declarations.contains_key(&declaration.role) {
            return Err(MeshError::Protocol(format!(
                "Capabilities for {} already declared",
                declaration.role
            )));
        }
        info!(
            "Registered {} v{} ({} capabilities)",
            declaration.role,
            declaration.version,
            declaration.capabilities.len()
        );
        declarations.insert(declaration.role, declaration);
        Ok(())
    }

    pub async fn get(&self, role: AgentRole) -> Option<CapabilityDeclaration> {
        self.declarations.read().await.get(&role).cloned()
    }

    pub async fn list(&self) -> Vec<CapabilityDeclaration> {
        self.declarations.read().await.values().cloned().collect()
    }

    /// Roles whose declarations name `role` as a dependency
    pub async fn dependents_of(&self, role: AgentRole) -> Vec<AgentRole> {
        self.declarations
            .read()
            .await
            .values()
            .filter(|d| d.depends_on.contains(&role))
            .map(|d| d.role)
            .collect()
    }
}
