//! # Event bus for broadcasting diagnostic events.
//!
//! [`Bus`] is a thin wrapper around [`tokio::sync::broadcast`] that provides
//! non-blocking event publishing from any thread, including synchronous code
//! running outside of a tokio runtime.
//!
//! ## Architecture
//! ```text
//! Publishers (many):                     Listener side (one):
//!   Subscriber  ──┐
//!   Subscription ─┼──────► Bus ───────► listener loop ────► ListenerSet
//!   Scheduler   ──┘  (broadcast chan)    (Diagnostics)
//! ```
//!
//! ## Rules
//! - **Non-blocking publish**: `publish()` never blocks; it calls `broadcast::Sender::send`.
//! - **Bounded capacity**: a single ring buffer stores recent events for all receivers.
//! - **Lag handling**: slow receivers get `RecvError::Lagged(n)` and skip `n` oldest items.
//! - **No persistence**: events are lost if there are no active receivers at send time;
//!   `publish()` reports that case so callers can fall back.

use tokio::sync::broadcast;

use super::event::Event;

/// Broadcast channel for diagnostic events.
///
/// ### Properties
/// - **Non-blocking**: `publish()` returns immediately.
/// - **Fire-and-forget**: no delivery or durability guarantees.
/// - **Cloneable**: cheap to clone (internally holds an `Arc`-backed sender).
#[derive(Clone, Debug)]
pub struct Bus {
    tx: broadcast::Sender<Event>,
    capacity: usize,
}

impl Bus {
    /// Creates a new bus with the given channel capacity (clamped to at least 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, _rx) = broadcast::channel::<Event>(capacity);
        Self { tx, capacity }
    }

    /// Publishes an event to all active receivers.
    ///
    /// Returns `false` when nobody was listening and the event was dropped.
    pub fn publish(&self, ev: Event) -> bool {
        self.tx.send(ev).is_ok()
    }

    /// Creates a new receiver that will observe subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }

    /// Ring buffer size this bus was created with.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;

    #[test]
    fn test_publish_without_receivers_reports_drop() {
        let bus = Bus::new(4);
        assert!(!bus.publish(Event::new(EventKind::UnhandledError)));
    }

    #[test]
    fn test_receiver_sees_published_event() {
        let bus = Bus::new(0);
        assert_eq!(bus.capacity(), 1);
        let mut rx = bus.subscribe();
        assert!(bus.publish(Event::new(EventKind::TeardownFailed)));
        let ev = rx.try_recv().expect("event");
        assert_eq!(ev.kind, EventKind::TeardownFailed);
    }
}
