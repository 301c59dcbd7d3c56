// src/events/bus.rs

//! Named-event publish/subscribe.
//!
//! Two ways to listen:
//! - [`EventBus::register`] attaches a synchronous callback for one
//!   [`EventKind`]. Callbacks run on the thread that triggers the event, in
//!   registration order.
//! - [`EventBus::subscribe`] hands out a `tokio::sync::broadcast` receiver
//!   that observes every event. Slow receivers see `RecvError::Lagged`.
//!
//! The bus never catches handler failures: the first `Err` stops the
//! dispatch and is returned to whoever called [`EventBus::trigger`].

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tokio::sync::broadcast;

use super::{EventKind, SupervisorEvent};

/// Callback registered for one event kind.
pub type Handler = Arc<dyn Fn(&SupervisorEvent) -> anyhow::Result<()> + Send + Sync>;

const BROADCAST_CAPACITY: usize = 1024;

pub struct EventBus {
    handlers: RwLock<HashMap<EventKind, Vec<Handler>>>,
    tx: broadcast::Sender<SupervisorEvent>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventKind, usize> = self
            .handlers
            .read()
            .map(|h| h.iter().map(|(k, v)| (*k, v.len())).collect())
            .unwrap_or_default();
        f.debug_struct("EventBus")
            .field("handlers", &counts)
            .field("subscribers", &self.tx.receiver_count())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            handlers: RwLock::new(HashMap::new()),
            tx,
        }
    }

    /// Append `handler` to the list for `kind`.
    pub fn register<F>(&self, kind: EventKind, handler: F)
    where
        F: Fn(&SupervisorEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        handlers.entry(kind).or_default().push(Arc::new(handler));
    }

    /// Invoke every handler registered for the event's kind.
    ///
    /// The handler list is snapshotted first, so a handler may register
    /// further handlers without deadlocking; those only see later events.
    pub fn trigger(&self, event: &SupervisorEvent) -> anyhow::Result<()> {
        // No receivers is fine.
        let _ = self.tx.send(event.clone());

        let snapshot: Vec<Handler> = {
            let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match handlers.get(&event.kind()) {
                Some(list) => list.clone(),
                None => return Ok(()),
            }
        };

        for handler in snapshot {
            handler(event)?;
        }
        Ok(())
    }

    /// Receiver that observes every event triggered after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.tx.subscribe()
    }

    pub fn handler_count(&self, kind: EventKind) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&kind).map_or(0, Vec::len)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
