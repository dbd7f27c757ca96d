//! Pending-reply registry for the request/reply pattern
//!
//! Each outstanding request owns a private oneshot channel keyed by its
//! correlation id; the registry is the ephemeral reply destination. Exactly
//! one caller owns each correlation id. Completing or releasing an id
//! removes the entry, so a timed-out request leaks nothing.

use crate::protocol::Message;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::oneshot;
use uuid::Uuid;

#[derive(Default)]
pub(crate) struct ReplyRegistry {
    pending: Mutex<HashMap<Uuid, oneshot::Sender<Message>>>,
}

impl ReplyRegistry {
    /// Reserve a reply slot for a new correlation id
    pub(crate) fn register(&self, correlation_id: Uuid) -> oneshot::Receiver<Message> {
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("reply registry lock poisoned")
            .insert(correlation_id, tx);
        rx
    }

    /// Deliver a reply to its waiting caller. Returns false when no caller
    /// owns the correlation id (already timed out, or never ours): such
    /// replies are ignored, never misdelivered.
    pub(crate) fn complete(&self, correlation_id: Uuid, reply: Message) -> bool {
        let sender = self
            .pending
            .lock()
            .expect("reply registry lock poisoned")
            .remove(&correlation_id);
        match sender {
            // send fails only if the caller gave up between removal and send
            Some(tx) => tx.send(reply).is_ok(),
            None => false,
        }
    }

    /// Drop a reservation without delivering (timeout path)
    pub(crate) fn release(&self, correlation_id: Uuid) {
        self.pending
            .lock()
            .expect("reply registry lock poisoned")
            .remove(&correlation_id);
    }

    #[cfg(test)]
    pub(crate) fn outstanding(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{AgentRole, Message, MessageDraft};
    use chrono::Utc;
    use serde_json::json;

    fn reply_message(correlation_id: Uuid) -> Message {
        let draft = MessageDraft::response(
            AgentRole::MarketIntelligence,
            AgentRole::CollectiveManagement,
            json!({"ok": true}),
        )
        .with_correlation(correlation_id);
        Message::seal(draft, Uuid::new_v4(), Utc::now())
    }

    #[tokio::test]
    async fn test_complete_delivers_to_owner() {
        let registry = ReplyRegistry::default();
        let correlation = Uuid::new_v4();
        let rx = registry.register(correlation);

        assert!(registry.complete(correlation, reply_message(correlation)));
        let reply = rx.await.unwrap();
        assert_eq!(reply.correlation_id, Some(correlation));
        assert_eq!(registry.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_unknown_correlation_is_ignored() {
        let registry = ReplyRegistry::default();
        let correlation = Uuid::new_v4();
        let _rx = registry.register(correlation);

        let stray = Uuid::new_v4();
        assert!(!registry.complete(stray, reply_message(stray)));
        assert_eq!(registry.outstanding(), 1);
    }

    #[test]
    fn test_reply_stays_pending_until_completed() {
        let registry = ReplyRegistry::default();
        let correlation = Uuid::new_v4();
        let mut rx = tokio_test::task::spawn(registry.register(correlation));

        assert!(rx.poll().is_pending());
        registry.complete(correlation, reply_message(correlation));
        assert!(rx.poll().is_ready());
    }

    #[tokio::test]
    async fn test_release_frees_the_slot() {
        let registry = ReplyRegistry::default();
        let correlation = Uuid::new_v4();
        let _rx = registry.register(correlation);

        registry.release(correlation);
        assert_eq!(registry.outstanding(), 0);
        assert!(!registry.complete(correlation, reply_message(correlation)));
    }
}
