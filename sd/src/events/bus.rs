//! Event Bus - fan-out of scheduler notifications to any number of subscribers
//!
//! The EventBus uses a tokio broadcast channel. Emitting never blocks and never
//! fails: with no subscribers the event is dropped.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

use super::types::{BusEvent, CallerMeta};

/// Default channel capacity (events)
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1_000;

/// Anything that accepts structured notifications from the scheduler
///
/// Implementations must not block: sources call `emit` from their trigger path.
pub trait EventSink: Send + Sync {
    fn emit(&self, event_name: &str, caller: CallerMeta, agent_name: &str, payload: Value);
}

/// Broadcast-backed event bus
pub struct EventBus {
    tx: broadcast::Sender<BusEvent>,
}

impl EventBus {
    /// Create a new event bus with the given capacity
    pub fn new(capacity: usize) -> Self {
        debug!(capacity, "EventBus::new: creating event bus");
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Create a new event bus with default capacity
    pub fn with_default_capacity() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }

    /// Publish a fully built event
    pub fn publish(&self, event: BusEvent) {
        debug!(event_name = %event.event_name, agent = %event.agent_name, "EventBus::publish");
        // Ignore send errors (no subscribers is OK)
        let _ = self.tx.send(event);
    }

    /// Subscribe to events emitted after this call
    pub fn subscribe(&self) -> broadcast::Receiver<BusEvent> {
        debug!("EventBus::subscribe: new subscriber");
        self.tx.subscribe()
    }

    /// Get the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_default_capacity()
    }
}

impl EventSink for EventBus {
    fn emit(&self, event_name: &str, caller: CallerMeta, agent_name: &str, payload: Value) {
        self.publish(BusEvent::new(event_name, caller, agent_name, payload));
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::with_default_capacity())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::broadcast::error::TryRecvError;

    #[test]
    fn test_event_bus_subscribe() {
        let bus = EventBus::new(16);
        assert_eq!(bus.subscriber_count(), 0);
        let _rx1 = bus.subscribe();
        let _rx2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[test]
    fn test_emit_without_subscribers() {
        let bus = EventBus::new(16);
        bus.emit("idle", CallerMeta::system("test"), "agent-a", Value::Null);
    }

    #[tokio::test]
    async fn test_emit_reaches_every_subscriber() {
        let bus = EventBus::new(16);
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        bus.emit(
            "cron:0 9 * * *",
            CallerMeta::system("CronInput"),
            "agent-a",
            serde_json::json!({"pattern": "0 9 * * *"}),
        );

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_name, "cron:0 9 * * *");
        assert_eq!(e2.agent_name, "agent-a");
        assert!(matches!(rx1.try_recv(), Err(TryRecvError::Empty)));
    }
}
