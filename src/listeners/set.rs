//! # Non-blocking fan-out to diagnostics listeners.
//!
//! ```text
//! emit(event)
//!     │
//!     ├──► [queue 1] ──► worker 1 ──► listener1.on_event()
//!     │    (bounded)         └──────► panic → ListenerPanicked
//!     └──► [queue N] ──► worker N ──► listenerN.on_event()
//!          (bounded)
//! ```
//!
//! ## Rules
//! - `emit()` never blocks (`try_send`).
//! - A full or closed queue drops the event for that listener only and
//!   publishes `ListenerOverflow` (overflow events themselves are not re-reported).
//! - Each listener sees its events in order; there is no cross-listener ordering.
//! - A panicking listener keeps its worker: the panic becomes `ListenerPanicked`.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StreamError;
use crate::events::{Bus, Event};

use super::Listen;

struct Channel {
    name: &'static str,
    sender: mpsc::Sender<Arc<Event>>,
}

/// Fan-out coordinator: one bounded queue and one worker task per listener.
///
/// Must be created inside a tokio runtime.
pub struct ListenerSet {
    channels: Vec<Channel>,
    workers: Vec<JoinHandle<()>>,
    bus: Bus,
}

impl ListenerSet {
    /// Spawns one worker per listener. Failures are published on `bus`.
    #[must_use]
    pub fn new(listeners: Vec<Arc<dyn Listen>>, bus: Bus) -> Self {
        let mut channels = Vec::with_capacity(listeners.len());
        let mut workers = Vec::with_capacity(listeners.len());

        for listener in listeners {
            let name = listener.name();
            let (tx, mut rx) = mpsc::channel::<Arc<Event>>(listener.queue_capacity().max(1));
            let bus_for_worker = bus.clone();

            let handle = tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    let fut = listener.on_event(ev.as_ref());
                    if let Err(payload) = AssertUnwindSafe(fut).catch_unwind().await {
                        let info = StreamError::from_panic(payload).as_message();
                        bus_for_worker.publish(Event::listener_panicked(name, info));
                    }
                }
            });
            channels.push(Channel { name, sender: tx });
            workers.push(handle);
        }
        Self {
            channels,
            workers,
            bus,
        }
    }

    /// Sends `event` to every listener without waiting.
    pub fn emit(&self, event: &Event) {
        self.emit_arc(Arc::new(event.clone()));
    }

    /// Like [`emit`](Self::emit), without cloning the event.
    pub fn emit_arc(&self, event: Arc<Event>) {
        let overflow = event.is_listener_overflow();

        for channel in &self.channels {
            let reason = match channel.sender.try_send(Arc::clone(&event)) {
                Ok(()) => continue,
                Err(mpsc::error::TrySendError::Full(_)) => "full",
                Err(mpsc::error::TrySendError::Closed(_)) => "closed",
            };
            if overflow {
                continue;
            }
            if !self.bus.publish(Event::listener_overflow(channel.name, reason)) {
                eprintln!("[rill] listener {} dropped an event: {reason}", channel.name);
            }
        }
    }

    /// Closes every queue and waits for the workers to drain them.
    pub async fn shutdown(self) {
        drop(self.channels);
        for worker in self.workers {
            let _ = worker.await;
        }
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<EventKind>>);

    #[async_trait]
    impl Listen for Collect {
        async fn on_event(&self, ev: &Event) {
            self.0.lock().push(ev.kind);
        }

        fn name(&self) -> &'static str {
            "collect"
        }
    }

    struct Explode;

    #[async_trait]
    impl Listen for Explode {
        async fn on_event(&self, _ev: &Event) {
            panic!("listener exploded");
        }

        fn name(&self) -> &'static str {
            "explode"
        }
    }

    struct Tiny;

    #[async_trait]
    impl Listen for Tiny {
        async fn on_event(&self, _ev: &Event) {}

        fn name(&self) -> &'static str {
            "tiny"
        }

        fn queue_capacity(&self) -> usize {
            1
        }
    }

    #[tokio::test]
    async fn test_events_reach_every_listener_in_order() {
        let bus = Bus::new(8);
        let a = Arc::new(Collect::default());
        let b = Arc::new(Collect::default());
        let set = ListenerSet::new(vec![a.clone(), b.clone()], bus);
        assert_eq!(set.len(), 2);

        set.emit(&Event::new(EventKind::UnhandledError));
        set.emit(&Event::new(EventKind::TeardownFailed));
        set.shutdown().await;

        let expected = vec![EventKind::UnhandledError, EventKind::TeardownFailed];
        assert_eq!(*a.0.lock(), expected);
        assert_eq!(*b.0.lock(), expected);
    }

    #[tokio::test]
    async fn test_panicking_listener_is_reported_and_keeps_running() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = ListenerSet::new(vec![Arc::new(Explode)], bus);

        set.emit(&Event::new(EventKind::UnhandledError));
        set.emit(&Event::new(EventKind::UnhandledError));
        set.shutdown().await;

        for _ in 0..2 {
            let ev = rx.try_recv().expect("panic event");
            assert_eq!(ev.kind, EventKind::ListenerPanicked);
            assert_eq!(ev.origin.as_deref(), Some("explode"));
            assert_eq!(ev.reason.as_deref(), Some("panic: listener exploded"));
        }
    }

    #[tokio::test]
    async fn test_full_queue_publishes_overflow() {
        let bus = Bus::new(8);
        let mut rx = bus.subscribe();
        let set = ListenerSet::new(vec![Arc::new(Tiny)], bus);

        // The worker cannot run before the next await point, so the second event overflows.
        set.emit(&Event::new(EventKind::UnhandledError));
        set.emit(&Event::new(EventKind::UnhandledError));

        let ev = rx.try_recv().expect("overflow event");
        assert!(ev.is_listener_overflow());
        assert_eq!(ev.origin.as_deref(), Some("tiny"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
        set.shutdown().await;
    }

    #[tokio::test]
    async fn test_empty_set() {
        let set = ListenerSet::new(Vec::new(), Bus::new(1));
        assert!(set.is_empty());
        set.emit(&Event::new(EventKind::ActionPanicked));
        set.shutdown().await;
    }
}
