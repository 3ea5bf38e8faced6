//! Broadcast hub managing stream subscribers and fanning out events.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, info, warn};
use tokio::sync::mpsc;

use super::EventSink;
use super::replay::ReplaySource;
use super::types::ChatEvent;

/// Identifier of a registered subscriber.
pub type SubscriberId = u64;

/// A sender for events to a specific subscriber.
type EventSender = mpsc::UnboundedSender<ChatEvent>;

/// The receiving half of one stream connection.
///
/// Dropping a `Subscriber` does not unregister it; the hub notices the
/// closed queue on the next broadcast and removes it then.
#[derive(Debug)]
pub struct Subscriber {
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<ChatEvent>,
}

impl Subscriber {
    pub fn id(&self) -> SubscriberId {
        self.id
    }

    /// Wait for the next event. Returns `None` once the hub dropped this queue.
    pub async fn recv(&mut self) -> Option<ChatEvent> {
        self.rx.recv().await
    }

    /// Take the next pending event without waiting.
    pub fn try_recv(&mut self) -> Option<ChatEvent> {
        self.rx.try_recv().ok()
    }

    /// Drain every event that is already queued.
    pub fn drain(&mut self) -> Vec<ChatEvent> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    pub(crate) fn into_parts(self) -> (SubscriberId, mpsc::UnboundedReceiver<ChatEvent>) {
        (self.id, self.rx)
    }
}

/// Hub holding the set of active subscribers.
///
/// The hub is responsible for:
/// - Tracking active stream connections in registration order
/// - Broadcasting events to every active connection
/// - Dropping connections whose queue is closed
pub struct BroadcastHub {
    /// Active subscribers, in registration order
    subscribers: Mutex<Vec<(SubscriberId, EventSender)>>,

    next_id: AtomicU64,
}

impl BroadcastHub {
    /// Create a new hub with no subscribers.
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn subscribers(&self) -> MutexGuard<'_, Vec<(SubscriberId, EventSender)>> {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn new_queue(&self) -> (EventSender, Subscriber) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Subscriber { id, rx })
    }

    /// Register a new subscriber with an empty queue.
    pub fn register(&self) -> Subscriber {
        let (tx, subscriber) = self.new_queue();
        let mut subscribers = self.subscribers();
        subscribers.push((subscriber.id, tx));
        info!(
            "Registered stream subscriber {} ({} active)",
            subscriber.id,
            subscribers.len()
        );
        subscriber
    }

    /// Register a new subscriber whose queue starts with the replay set.
    ///
    /// The replay is computed and enqueued while the subscriber set is locked,
    /// so no broadcast can reach the new queue ahead of it. Replay events are
    /// never seen by other subscribers. A failing replay source is logged and
    /// the subscriber is registered without replay.
    pub fn register_with_replay(&self, source: &dyn ReplaySource) -> Subscriber {
        let (tx, subscriber) = self.new_queue();
        let mut subscribers = self.subscribers();

        match source.replay() {
            Ok(events) => {
                let count = events.len();
                for event in events {
                    // The receiver is still held by `subscriber`, so this cannot fail.
                    let _ = tx.send(event);
                }
                debug!("Replayed {} events to subscriber {}", count, subscriber.id);
            }
            Err(e) => {
                warn!(
                    "Failed to compute replay for subscriber {}: {:#}",
                    subscriber.id, e
                );
            }
        }

        subscribers.push((subscriber.id, tx));
        info!(
            "Registered stream subscriber {} ({} active)",
            subscriber.id,
            subscribers.len()
        );
        subscriber
    }

    /// Unregister a subscriber. Unknown or already removed ids are ignored.
    pub fn unregister(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sub_id, _)| *sub_id != id);
        let removed = subscribers.len() != before;
        if removed {
            info!(
                "Unregistered stream subscriber {} ({} active)",
                id,
                subscribers.len()
            );
        }
        removed
    }

    /// Enqueue an event onto every active subscriber.
    ///
    /// Subscribers whose queue is closed are removed once the pass is done.
    /// Returns the number of subscribers the event was delivered to.
    pub fn broadcast(&self, event: ChatEvent) -> usize {
        self.broadcast_with(|| Some(event))
    }

    /// Produce an event and broadcast it while the subscriber set is locked.
    ///
    /// Concurrent callers are serialized, so subscribers see events in the
    /// order `produce` ran. `produce` may take state locks but must not call
    /// back into the hub.
    pub fn broadcast_with(&self, produce: impl FnOnce() -> Option<ChatEvent>) -> usize {
        let mut subscribers = self.subscribers();
        match produce() {
            Some(event) => deliver(&mut subscribers, event),
            None => 0,
        }
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers().len()
    }

    /// Whether a subscriber is currently in the active set.
    pub fn is_registered(&self, id: SubscriberId) -> bool {
        self.subscribers().iter().any(|(sub_id, _)| *sub_id == id)
    }
}

impl Default for BroadcastHub {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for BroadcastHub {
    fn emit(&self, event: ChatEvent) {
        self.broadcast(event);
    }

    fn emit_with(&self, produce: &mut dyn FnMut() -> Option<ChatEvent>) {
        self.broadcast_with(produce);
    }
}

fn deliver(subscribers: &mut Vec<(SubscriberId, EventSender)>, event: ChatEvent) -> usize {
    let mut dead = Vec::new();
    let mut delivered = 0;

    for (id, tx) in subscribers.iter() {
        if tx.send(event.clone()).is_ok() {
            delivered += 1;
        } else {
            dead.push(*id);
        }
    }

    if !dead.is_empty() {
        subscribers.retain(|(id, _)| !dead.contains(id));
        debug!(
            "Removed {} dead stream subscriber(s) during broadcast: {:?}",
            dead.len(),
            dead
        );
    }

    delivered
}
