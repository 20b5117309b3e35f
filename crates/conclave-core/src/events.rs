use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default number of events buffered per subscriber before the oldest are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// A domain event that can travel on an [`EventBus`].
pub trait Event: Clone + Send + Sync + 'static {
    /// Stable, camelCase name of the event (e.g. `taskCompleted`).
    fn name(&self) -> &'static str;
}

/// Publish/subscribe bus for domain events, backed by a tokio broadcast channel.
///
/// The bus is an explicit object passed by reference to every component that
/// emits events. Publishing never blocks and never fails: with no subscribers
/// the event is simply dropped.
pub struct EventBus<E: Event> {
    sender: Arc<broadcast::Sender<E>>,
}

impl<E: Event> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            sender: Arc::clone(&self.sender),
        }
    }
}

impl<E: Event> EventBus<E> {
    /// Create a bus buffering at most `capacity` events per lagging subscriber.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender: Arc::new(sender),
        }
    }

    /// Publish an event to every current subscriber.
    pub fn publish(&self, event: E) {
        let name = event.name();
        let receivers = self.sender.send(event).unwrap_or(0);
        debug!(event = name, receivers, "event published");
    }

    /// Subscribe to every event published from now on.
    pub fn subscribe(&self) -> EventReceiver<E> {
        EventReceiver {
            receiver: self.sender.subscribe(),
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E: Event> Default for EventBus<E> {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving half of an [`EventBus`] subscription.
pub struct EventReceiver<E: Event> {
    receiver: broadcast::Receiver<E>,
}

impl<E: Event> EventReceiver<E> {
    /// Wait for the next event.
    pub async fn recv(&mut self) -> Result<E, EventBusError> {
        self.receiver.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => EventBusError::Closed,
            broadcast::error::RecvError::Lagged(n) => {
                warn!(skipped = n, "event receiver lagged");
                EventBusError::Lagged(n)
            }
        })
    }

    /// Take the next event if one is already buffered.
    pub fn try_recv(&mut self) -> Result<E, EventBusError> {
        self.receiver.try_recv().map_err(|e| match e {
            broadcast::error::TryRecvError::Empty => EventBusError::Empty,
            broadcast::error::TryRecvError::Closed => EventBusError::Closed,
            broadcast::error::TryRecvError::Lagged(n) => {
                warn!(skipped = n, "event receiver lagged");
                EventBusError::Lagged(n)
            }
        })
    }

    /// Drain every event currently buffered, stopping at the first gap.
    pub fn drain(&mut self) -> Vec<E> {
        let mut events = Vec::new();
        loop {
            match self.try_recv() {
                Ok(event) => events.push(event),
                Err(EventBusError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        events
    }
}

/// Errors returned when receiving from an [`EventBus`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventBusError {
    /// Every sender has been dropped.
    #[error("event bus is closed")]
    Closed,

    /// No event is buffered right now.
    #[error("no events available")]
    Empty,

    /// The receiver fell behind and the oldest events were dropped.
    #[error("receiver lagged by {0} events")]
    Lagged(u64),
}
