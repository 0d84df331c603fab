//! Event Bus - per-node pub/sub for coordination events
//!
//! Components emit, observers subscribe. Delivery is fire-and-forget: with no
//! subscribers the event is dropped, and slow subscribers lag.

use tokio::sync::broadcast;
use tracing::debug;

use super::types::NodeEvent;

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Cheap to clone; clones share one channel
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<NodeEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Emit an event to all current subscribers
    pub fn emit(&self, event: NodeEvent) {
        debug!(
            event_type = event.event_type(),
            proposal_id = event.proposal_id(),
            peer_id = event.peer_id(),
            "EventBus::emit"
        );
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}
