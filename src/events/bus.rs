//! Fan-out of [`LinkEvent`]s to subscribed listeners.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use tokio::sync::mpsc;
use tracing::{error, trace};

use super::event::LinkEvent;
use crate::core::EventListener;

type ListenerList = Vec<(u64, Arc<dyn EventListener>)>;

#[derive(Default)]
struct BusInner {
    listeners: Mutex<ListenerList>,
    next_id: AtomicU64,
}

impl BusInner {
    fn listeners(&self) -> MutexGuard<'_, ListenerList> {
        self.listeners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn remove(&self, id: u64) {
        self.listeners().retain(|(lid, _)| *lid != id);
    }
}

/// Event fan-out point.
///
/// Listeners are called in subscription order, outside the bus lock, so a
/// listener may subscribe or unsubscribe from inside its callback.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<BusInner>,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

impl EventBus {
    /// Create an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener until the returned [`Subscription`] is dropped.
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners().push((id, listener));
        Subscription {
            id,
            bus: Arc::downgrade(&self.inner),
        }
    }

    /// Subscribe a channel-backed listener.
    pub fn stream(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(Arc::new(ChannelListener { tx }));
        EventStream {
            rx,
            _subscription: subscription,
        }
    }

    /// Deliver an event to every listener.
    ///
    /// A panicking listener is logged and skipped; the others still
    /// receive the event.
    pub fn publish(&self, event: &LinkEvent) {
        let snapshot: Vec<(u64, Arc<dyn EventListener>)> = self.inner.listeners().clone();
        trace!(kind = event.kind(), listeners = snapshot.len(), "publishing event");

        for (id, listener) in snapshot {
            let delivered = catch_unwind(AssertUnwindSafe(|| listener.on_event(event)));
            if delivered.is_err() {
                error!(listener = id, kind = event.kind(), "event listener panicked");
            }
        }
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.inner.listeners().len()
    }

    /// Drop every listener.
    pub fn clear(&self) {
        self.inner.listeners().clear();
    }
}

/// Scoped registration on an [`EventBus`]. Unsubscribes on drop.
#[derive(Debug)]
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    id: u64,
    bus: Weak<BusInner>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.id);
        }
    }
}

struct ChannelListener {
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &LinkEvent) {
        // Receiver dropped: the stream's subscription is about to go too.
        let _ = self.tx.send(event.clone());
    }
}

/// Async stream of events. Unsubscribes on drop.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<LinkEvent>,
    _subscription: Subscription,
}

impl EventStream {
    /// Wait for the next event. `None` once the bus is gone.
    pub async fn recv(&mut self) -> Option<LinkEvent> {
        self.rx.recv().await
    }

    /// Take an already-published event without waiting.
    pub fn try_recv(&mut self) -> Option<LinkEvent> {
        self.rx.try_recv().ok()
    }

    /// Take every already-published event.
    pub fn drain(&mut self) -> Vec<LinkEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            out.push(event);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn sent(payload: &str) -> LinkEvent {
        LinkEvent::MessageSent {
            success: true,
            payload: payload.into(),
        }
    }

    #[test]
    fn test_publish_reaches_all_listeners() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c1 = count.clone();
        let c2 = count.clone();
        let _a = bus.subscribe(Arc::new(move |_: &LinkEvent| {
            c1.fetch_add(1, Ordering::SeqCst);
        }));
        let _b = bus.subscribe(Arc::new(move |_: &LinkEvent| {
            c2.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(&sent("x"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dropping_subscription_unsubscribes() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Arc::new(|_: &LinkEvent| {}));
        assert_eq!(bus.listener_count(), 1);
        drop(sub);
        assert_eq!(bus.listener_count(), 0);
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        fn explode(_: &LinkEvent) {
            panic!("listener bug");
        }
        let _bad = bus.subscribe(Arc::new(explode));
        let _good = bus.subscribe(Arc::new(move |_: &LinkEvent| {
            c.fetch_add(1, Ordering::SeqCst);
        }));

        bus.publish(&sent("a"));
        bus.publish(&sent("b"));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(bus.listener_count(), 2);
    }

    #[test]
    fn test_stream_receives_in_order() {
        let bus = EventBus::new();
        let mut stream = bus.stream();
        bus.publish(&sent("1"));
        bus.publish(&sent("2"));
        assert_eq!(stream.drain(), vec![sent("1"), sent("2")]);
        assert!(stream.try_recv().is_none());
    }

    #[test]
    fn test_subscription_outlives_bus() {
        let bus = EventBus::new();
        let sub = bus.subscribe(Arc::new(|_: &LinkEvent| {}));
        drop(bus);
        drop(sub);
    }
}
