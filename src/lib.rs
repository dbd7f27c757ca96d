//! Agrimesh - Multi-Agent Advisory Mesh for Farmer Collectives
//!
//! The coordination substrate of a multi-agent farm-advisory platform:
//! - Typed message envelope with priority, TTL, and context attachment
//! - In-process broker with per-agent priority queues, ack/retry delivery,
//!   broadcast, and correlation-id request/reply with timeout
//! - TTL-scoped context store for farmer and FPO state
//! - Base agent contract with capability declarations
//! - Collective allocation engine: a risk-aware greedy portfolio optimizer
//!   and a fair-share investment unit calculator, driven over the mesh by
//!   the collective-management agent
//!
//! # Architecture
//!
//! The substrate is layered bottom-up:
//! - **Protocol**: envelope schema and routing rules
//! - **Context**: shared TTL'd state, the only mutable resource across agents
//! - **Bus**: the broker adapter every message passes through
//! - **Agent**: the lifecycle contract and helper surface agents build on
//! - **Planning**: pure computation behind the collective agent
//!
//! # Example
//!
//! ```ignore
//! use agrimesh::{CollectiveAgent, ContextStore, MeshConfig, MessageBus};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MeshConfig::load("agrimesh.toml".as_ref())?;
//!     let store = ContextStore::new(config.context.clone());
//!     let bus = MessageBus::connect(config.bus.clone(), store).await?;
//!
//!     let agent = CollectiveAgent::new(bus.clone(), config.planning, config.investment);
//!     let mut runtime = agrimesh::AgentRuntime::new(std::sync::Arc::new(agent), bus.clone());
//!     runtime.start().await?;
//!
//!     // ... peers issue plan requests over the bus ...
//!
//!     bus.close().await;
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod agents;
pub mod bus;
pub mod config;
pub mod context;
pub mod error;
pub mod planning;
pub mod protocol;

// Re-export commonly used types
pub use agent::{Agent, AgentHandle, AgentRuntime, CapabilityDeclaration, CapabilityRegistry};
pub use agents::{CollectiveAgent, CollectiveEvent, CollectiveRequest, PlanOutcome};
pub use bus::{Delivery, MessageBus, MessageHandler};
pub use config::MeshConfig;
pub use context::{ContextSlice, ContextState, ContextStore, EntityId};
pub use error::{MeshError, Result};
pub use planning::{
    InvestmentFactors, InvestmentUnitCalculator, OptimizedPortfolio, PortfolioConstraints,
    PortfolioOptimizer,
};
pub use protocol::{AgentRole, Message, MessageContext, MessageDraft, MessageType, Priority};
