//! In-process message broker with per-agent priority queues
//!
//! Ordering guarantee: within one agent's queue, messages are delivered
//! priority tier first, then in the order the bus accepted them. Across
//! queues there is no ordering guarantee. One handler invocation is in
//! flight per agent at any time.

use crate::bus::request::ReplyRegistry;
use crate::config::BusSettings;
use crate::context::{ContextState, ContextStore, EntityId};
use crate::error::{MeshError, Result};
use crate::protocol::{
    resolve_route, AgentRole, Message, MessageContext, MessageDraft, MessageId, MessageType, Route,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BinaryHeap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// A message as handed to an agent: the sealed envelope plus the entity
/// context state resolved from the store at delivery time
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub state: ContextState,
}

/// Inbound message handler bound to one agent's queue
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    /// Handle one delivery. `Ok` acknowledges the message; `Err` requeues it
    /// until the broker's delivery ceiling is reached.
    async fn handle(&self, delivery: Delivery) -> Result<()>;
}

struct QueuedMessage {
    message: Message,
    seq: u64,
    attempts: u32,
    expires_at: Option<Instant>,
}

impl PartialEq for QueuedMessage {
    fn eq(&self, other: &Self) -> bool {
        self.message.priority == other.message.priority && self.seq == other.seq
    }
}

impl Eq for QueuedMessage {}

impl PartialOrd for QueuedMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedMessage {
    // Max-heap: higher priority first, then earlier acceptance first
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.message
            .priority
            .cmp(&other.message.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct AgentQueue {
    heap: Mutex<BinaryHeap<QueuedMessage>>,
    notify: Notify,
}

impl AgentQueue {
    fn new() -> Self {
        Self {
            heap: Mutex::new(BinaryHeap::new()),
            notify: Notify::new(),
        }
    }

    fn push(&self, queued: QueuedMessage) {
        self.heap
            .lock()
            .expect("queue lock poisoned")
            .push(queued);
        self.notify.notify_one();
    }

    /// Wait for the next message; `None` once the bus has closed and the
    /// queue is drained of its wakeups.
    async fn pop(&self, open: &AtomicBool) -> Option<QueuedMessage> {
        loop {
            if let Some(queued) = self.heap.lock().expect("queue lock poisoned").pop() {
                return Some(queued);
            }
            if !open.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }
}

struct BusInner {
    queues: HashMap<AgentRole, Arc<AgentQueue>>,
    replies: ReplyRegistry,
    context: ContextStore,
    settings: BusSettings,
    seq: AtomicU64,
    open: AtomicBool,
    dead_letters: Mutex<Option<mpsc::UnboundedSender<Message>>>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to the message bus. Cheap to clone; inject one into every
/// component at construction.
#[derive(Clone)]
pub struct MessageBus {
    inner: Arc<BusInner>,
}

/// Handle to a running subscription loop
pub struct SubscriptionHandle {
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Abort the subscription loop immediately
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl MessageBus {
    /// Connect the bus. Failure here is fatal: a process must not start
    /// partially connected.
    pub async fn connect(settings: BusSettings, context: ContextStore) -> Result<Self> {
        if settings.max_delivery_attempts == 0 {
            return Err(MeshError::Config(
                "bus.max_delivery_attempts must be at least 1".into(),
            ));
        }
        if settings.sweep_interval_secs == 0 {
            return Err(MeshError::Config(
                "bus.sweep_interval_secs must be at least 1".into(),
            ));
        }

        let queues = AgentRole::all()
            .iter()
            .map(|role| (*role, Arc::new(AgentQueue::new())))
            .collect();

        let bus = Self {
            inner: Arc::new(BusInner {
                queues,
                replies: ReplyRegistry::default(),
                context: context.clone(),
                settings: settings.clone(),
                seq: AtomicU64::new(0),
                open: AtomicBool::new(true),
                dead_letters: Mutex::new(None),
                sweeper: Mutex::new(None),
            }),
        };

        let sweep_interval = Duration::from_secs(settings.sweep_interval_secs);
        let sweeper = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                context.purge_expired().await;
            }
        });
        *bus.inner.sweeper.lock().expect("sweeper lock poisoned") = Some(sweeper);

        info!(
            "Message bus connected ({} queues, retry ceiling {})",
            bus.inner.queues.len(),
            settings.max_delivery_attempts
        );
        Ok(bus)
    }

    /// Close the bus: refuse further traffic, wake subscription loops so
    /// they exit, stop the sweeper, and shut the context store to writes.
    pub async fn close(&self) {
        self.inner.open.store(false, Ordering::Release);
        for queue in self.inner.queues.values() {
            queue.notify.notify_waiters();
        }
        if let Some(sweeper) = self
            .inner
            .sweeper
            .lock()
            .expect("sweeper lock poisoned")
            .take()
        {
            sweeper.abort();
        }
        self.inner.context.shutdown().await;
        info!("Message bus closed");
    }

    pub fn is_connected(&self) -> bool {
        self.inner.open.load(Ordering::Acquire)
    }

    /// The context store this bus resolves delivery context against
    pub fn context_store(&self) -> &ContextStore {
        &self.inner.context
    }

    /// Route messages that exhausted their delivery attempts to a sink
    /// instead of dropping them.
    pub fn route_dead_letters(&self, sink: mpsc::UnboundedSender<Message>) {
        *self
            .inner
            .dead_letters
            .lock()
            .expect("dead letter lock poisoned") = Some(sink);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MeshError::BusUnavailable("bus is closed".into()))
        }
    }

    fn queue(&self, role: AgentRole) -> Arc<AgentQueue> {
        // every role has a queue from connect()
        Arc::clone(&self.inner.queues[&role])
    }

    /// Publish a draft: validate, assign id and timestamp (set exactly once,
    /// here), snapshot its context, and route. Returns the assigned id
    /// without waiting for delivery.
    pub async fn publish(&self, draft: MessageDraft) -> Result<MessageId> {
        self.ensure_open()?;
        let route = resolve_route(&draft)?;

        let id = Uuid::new_v4();
        if let Some(context) = &draft.context {
            self.inner.context.snapshot_message(id, context).await?;
        }
        let message = Message::seal(draft, id, Utc::now());

        // Replies ride the private per-correlation channel, not the queues
        if message.msg_type == MessageType::Response {
            if let Some(correlation_id) = message.correlation_id {
                if !self.inner.replies.complete(correlation_id, message) {
                    debug!(
                        %correlation_id,
                        "Reply arrived for no pending request, ignoring"
                    );
                }
                return Ok(id);
            }
        }

        let seq = self.inner.seq.fetch_add(1, Ordering::Relaxed);
        let expires_at = message
            .ttl
            .map(|secs| Instant::now() + Duration::from_secs(secs));

        match route {
            Route::Broadcast => {
                for queue in self.inner.queues.values() {
                    queue.push(QueuedMessage {
                        message: message.clone(),
                        seq,
                        attempts: 0,
                        expires_at,
                    });
                }
            }
            Route::Direct(targets) => {
                for role in targets {
                    self.queue(role).push(QueuedMessage {
                        message: message.clone(),
                        seq,
                        attempts: 0,
                        expires_at,
                    });
                }
            }
        }
        Ok(id)
    }

    /// Bind an agent's queue to a handler and start pulling. One message is
    /// in flight at a time; failures requeue up to the delivery ceiling,
    /// then go to the dead-letter sink (or are dropped with an error log).
    pub async fn subscribe(
        &self,
        role: AgentRole,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<SubscriptionHandle> {
        self.ensure_open()?;
        let queue = self.queue(role);
        let bus = self.clone();
        let max_attempts = self.inner.settings.max_delivery_attempts;

        let task = tokio::spawn(async move {
            debug!("Subscribed {} queue", role);
            while let Some(mut queued) = queue.pop(&bus.inner.open).await {
                if let Some(expires_at) = queued.expires_at {
                    if Instant::now() >= expires_at {
                        debug!(id = %queued.message.id, "Dropping expired message");
                        continue;
                    }
                }

                let state = bus.resolve_state(&queued.message).await;
                let delivery = Delivery {
                    message: queued.message.clone(),
                    state,
                };

                match handler.handle(delivery).await {
                    Ok(()) => {} // acknowledged by removal
                    Err(e) => {
                        queued.attempts += 1;
                        if queued.attempts < max_attempts {
                            warn!(
                                id = %queued.message.id,
                                attempt = queued.attempts,
                                "Handler failed for {}, requeueing: {}",
                                role,
                                e
                            );
                            queue.push(queued);
                        } else {
                            error!(
                                id = %queued.message.id,
                                "Dropping message for {} after {} attempts: {}",
                                role,
                                queued.attempts,
                                e
                            );
                            bus.send_dead_letter(queued.message);
                        }
                    }
                }
            }
            debug!("Subscription loop for {} stopped", role);
        });

        Ok(SubscriptionHandle { task })
    }

    /// Resolve the entity context attached to a message at delivery time
    async fn resolve_state(&self, message: &Message) -> ContextState {
        match message
            .context
            .as_ref()
            .and_then(EntityId::from_context)
        {
            Some(entity) => self.inner.context.get(&entity).await,
            None => ContextState::default(),
        }
    }

    fn send_dead_letter(&self, message: Message) {
        let sink = self
            .inner
            .dead_letters
            .lock()
            .expect("dead letter lock poisoned");
        if let Some(tx) = sink.as_ref() {
            let _ = tx.send(message);
        }
    }

    /// Synchronous-style request/reply over the asynchronous transport.
    ///
    /// Allocates a private reply slot keyed by a fresh correlation id,
    /// publishes the request, and awaits the matching reply. On timeout the
    /// slot is released (no leaked reply destination) and a typed timeout
    /// error is returned; other in-flight requests are unaffected.
    pub async fn request(
        &self,
        source: AgentRole,
        target: AgentRole,
        payload: serde_json::Value,
        context: Option<MessageContext>,
        timeout: Option<Duration>,
    ) -> Result<serde_json::Value> {
        self.ensure_open()?;
        let timeout = timeout.unwrap_or(Duration::from_millis(
            self.inner.settings.default_request_timeout_ms,
        ));
        let correlation_id = Uuid::new_v4();
        let reply_rx = self.inner.replies.register(correlation_id);

        let mut draft =
            MessageDraft::request(source, target, payload).with_correlation(correlation_id);
        if let Some(context) = context {
            draft = draft.with_context(context);
        }
        if let Err(e) = self.publish(draft).await {
            self.inner.replies.release(correlation_id);
            return Err(e);
        }

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(reply)) => Ok(reply.payload),
            Ok(Err(_)) => {
                self.inner.replies.release(correlation_id);
                Err(MeshError::BusUnavailable(
                    "reply channel closed before a reply arrived".into(),
                ))
            }
            Err(_) => {
                self.inner.replies.release(correlation_id);
                Err(MeshError::RequestTimeout {
                    target,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        }
    }

    /// Publish to the wildcard topic every agent listens on
    pub async fn broadcast(
        &self,
        source: AgentRole,
        payload: serde_json::Value,
        context: Option<MessageContext>,
    ) -> Result<MessageId> {
        let mut draft = MessageDraft::broadcast(source, payload);
        if let Some(context) = context {
            draft = draft.with_context(context);
        }
        self.publish(draft).await
    }

    #[cfg(test)]
    pub(crate) fn queued_len(&self, role: AgentRole) -> usize {
        self.inner.queues[&role].heap.lock().unwrap().len()
    }
}
