//! Broker Adapter
//!
//! Wraps a topic-routed publish/subscribe transport with per-agent queues:
//! - `publish` assigns id/timestamp, snapshots context, and routes
//! - `subscribe` pulls a queue with ack/retry-requeue semantics
//! - `request` layers correlation-id request/reply with timeout on top
//! - `broadcast` fans one message out to every agent queue
//!
//! The transport here is in-process (priority heaps + notify wakeups); the
//! bus handle is injected into every component, never ambient global state.

mod broker;
mod request;

pub use broker::{Delivery, MessageBus, MessageHandler, SubscriptionHandle};
