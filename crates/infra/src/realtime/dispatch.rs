//! Typed subscriber registry
//!
//! Handlers are keyed by [`MessageKind`]. Each registration returns a
//! [`Subscription`] that removes the handler when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use rentline_domain::{InboundMessage, MessageKind};
use tracing::trace;

/// Callback invoked for every inbound message of the subscribed kind.
pub type MessageHandler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

struct Entry {
    id: u64,
    kind: MessageKind,
    handler: MessageHandler,
}

#[derive(Default)]
pub struct SubscriberRegistry {
    next_id: AtomicU64,
    entries: RwLock<Vec<Entry>>,
}

impl SubscriberRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(self: &Arc<Self>, kind: MessageKind, handler: MessageHandler) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.write().push(Entry { id, kind, handler });
        Subscription { id, registry: Arc::downgrade(self) }
    }

    /// Call every handler for the message's kind. Returns how many ran.
    pub fn dispatch(&self, message: &InboundMessage) -> usize {
        let Some(kind) = message.kind() else {
            return 0;
        };

        // Handlers run outside the lock so they may (un)subscribe.
        let handlers: Vec<MessageHandler> = self
            .entries
            .read()
            .iter()
            .filter(|entry| entry.kind == kind)
            .map(|entry| Arc::clone(&entry.handler))
            .collect();

        trace!(%kind, handlers = handlers.len(), "Dispatching realtime message");
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    fn remove(&self, id: u64) {
        self.entries.write().retain(|entry| entry.id != id);
    }
}

/// Handle to a registered handler.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    registry: Weak<SubscriberRegistry>,
}

impl Subscription {
    pub fn unsubscribe(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.remove(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use rentline_domain::{PresenceUpdate, Envelope};
    use serde_json::Value;

    use super::*;

    fn counter() -> (Arc<AtomicUsize>, MessageHandler) {
        let count = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&count);
        (count, Arc::new(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        }))
    }

    fn presence() -> InboundMessage {
        InboundMessage::Presence(PresenceUpdate { user: "owner-1".into(), status: "online".into() })
    }

    #[test]
    fn test_dispatch_by_kind() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (presence_count, presence_handler) = counter();
        let (generic_count, generic_handler) = counter();
        let _a = registry.subscribe(MessageKind::Presence, presence_handler);
        let _b = registry.subscribe(MessageKind::Message, generic_handler);

        assert_eq!(registry.dispatch(&presence()), 1);
        let generic = InboundMessage::Message(Envelope {
            kind: "message".into(),
            data: Value::Null,
            timestamp: None,
            sender: None,
        });
        registry.dispatch(&generic);
        assert_eq!(registry.dispatch(&InboundMessage::Pong), 0);

        assert_eq!(presence_count.load(Ordering::SeqCst), 1);
        assert_eq!(generic_count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_and_unsubscribe_remove_handlers() {
        let registry = Arc::new(SubscriberRegistry::new());
        let (count, handler) = counter();

        let first = registry.subscribe(MessageKind::Presence, Arc::clone(&handler));
        let second = registry.subscribe(MessageKind::Presence, handler);
        assert_eq!(registry.len(), 2);

        drop(first);
        second.unsubscribe();
        assert!(registry.is_empty());

        registry.dispatch(&presence());
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
