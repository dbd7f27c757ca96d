//! Mesh agents built on the base contract
//!
//! Only the collective-management agent lives in this crate: it drives the
//! allocation engine through the substrate. Domain agents (market, climate,
//! agronomy, finance, logistics) are external collaborators reached through
//! the message protocol.

pub mod collective;

pub use collective::{
    AgronomyRequest, ClimateRequest, CollectiveAgent, CollectiveEvent, CollectiveRequest,
    CropAdvisory, MarketRequest, PlanOutcome,
};
