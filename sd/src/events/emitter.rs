//! Local pub/sub channel for Hook sources
//!
//! A minimal subscribe/unsubscribe capability keyed by event name. Handlers run
//! synchronously on the emitting thread, in subscription order.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tracing::debug;

/// Callback invoked with the emitted payload, if any
pub type EventHandler = Arc<dyn Fn(Option<&Value>) + Send + Sync>;

/// Handle returned by [`EventChannel::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Subscribe/unsubscribe by event name
pub trait EventChannel: Send + Sync {
    fn subscribe(&self, event_name: &str, handler: EventHandler) -> SubscriptionId;

    /// Returns whether the subscription existed
    fn unsubscribe(&self, event_name: &str, id: SubscriptionId) -> bool;
}

/// In-process callback table implementing [`EventChannel`]
#[derive(Default)]
pub struct LocalEmitter {
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, EventHandler)>>>,
    next_id: AtomicU64,
}

impl LocalEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<(SubscriptionId, EventHandler)>>> {
        self.handlers.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Invoke every handler subscribed to `event_name`
    ///
    /// Returns whether any handler was listening.
    pub fn emit(&self, event_name: &str, payload: Option<&Value>) -> bool {
        // Snapshot so handlers may subscribe/unsubscribe without deadlocking
        let handlers: Vec<EventHandler> = self
            .lock()
            .get(event_name)
            .map(|hs| hs.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        debug!(%event_name, listeners = handlers.len(), "LocalEmitter::emit: called");

        for handler in &handlers {
            handler(payload);
        }
        !handlers.is_empty()
    }

    pub fn listener_count(&self, event_name: &str) -> usize {
        self.lock().get(event_name).map_or(0, Vec::len)
    }
}

impl EventChannel for LocalEmitter {
    fn subscribe(&self, event_name: &str, handler: EventHandler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        debug!(%event_name, ?id, "LocalEmitter::subscribe: called");
        self.lock().entry(event_name.to_string()).or_default().push((id, handler));
        id
    }

    fn unsubscribe(&self, event_name: &str, id: SubscriptionId) -> bool {
        debug!(%event_name, ?id, "LocalEmitter::unsubscribe: called");
        let mut handlers = self.lock();
        let Some(list) = handlers.get_mut(event_name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event_name);
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, EventHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, Arc::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }))
    }

    #[test]
    fn test_emit_reaches_subscribers_of_that_event_only() {
        let emitter = LocalEmitter::new();
        let (push_count, push_handler) = counter();
        let (other_count, other_handler) = counter();
        emitter.subscribe("on-push", push_handler);
        emitter.subscribe("on-merge", other_handler);

        assert!(emitter.emit("on-push", None));
        assert!(emitter.emit("on-push", None));

        assert_eq!(push_count.load(Ordering::SeqCst), 2);
        assert_eq!(other_count.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_emit_without_listeners() {
        let emitter = LocalEmitter::new();
        assert!(!emitter.emit("nothing", None));
    }

    #[test]
    fn test_unsubscribe() {
        let emitter = LocalEmitter::new();
        let (count, handler) = counter();
        let id = emitter.subscribe("tick", handler);
        assert_eq!(emitter.listener_count("tick"), 1);

        assert!(emitter.unsubscribe("tick", id));
        assert!(!emitter.unsubscribe("tick", id));
        emitter.emit("tick", None);

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(emitter.listener_count("tick"), 0);
    }

    #[test]
    fn test_payload_is_passed_through() {
        let emitter = LocalEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        emitter.subscribe(
            "data",
            Arc::new(move |payload| {
                s.lock().unwrap().push(payload.cloned());
            }),
        );

        emitter.emit("data", Some(&serde_json::json!({"id": 42})));
        emitter.emit("data", None);

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0], Some(serde_json::json!({"id": 42})));
        assert_eq!(seen[1], None);
    }
}
