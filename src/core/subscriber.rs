//! # Execution node: one live subscription.
//!
//! [`Subscriber`] composes a [`Subscription`] with a boxed destination
//! [`Observer`]. It is what producers receive, and it enforces the terminal-state
//! invariant no matter how badly the producer or the destination behaves.
//!
//! ## Architecture
//! ```text
//! producer ── next/error/complete ──► Subscriber ──► destination Observer
//!                                        │  ▲
//!                         (backlog while │  │ drained by the caller
//!                          delivering)   ▼  │ that owns delivery
//!                                     VecDeque<Notification>
//! ```
//!
//! ## Rules
//! - After `error` or `complete`, later `next` calls are dropped; the terminal
//!   notification is delivered at most once, then the subscriber releases itself.
//! - A second `error` after a terminal is reported as **unhandled**; a second
//!   `complete` is a stopped notification (diagnostic only).
//! - Once released (externally or after a terminal) nothing reaches the destination.
//! - A panic in the destination's `next` is caught and turned into the
//!   subscriber's terminal error ([`StreamError::Panicked`]); queued values are
//!   discarded.
//! - A panic in the destination's `error`/`complete` is reported as unhandled.
//! - Re-entrant and cross-thread emissions never run the destination concurrently:
//!   they are queued and drained in FIFO order by the caller already delivering.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;
use crate::events::report;

use super::notification::Notification;
use super::observer::Observer;
use super::subscription::{Subscription, Teardown};

struct Delivery<T> {
    destination: Option<Box<dyn Observer<T>>>,
    /// Terminal notification accepted.
    stopped: bool,
    /// Subscription released; destination dropped.
    released: bool,
    /// A caller is currently running the destination.
    draining: bool,
    backlog: VecDeque<Notification<T>>,
}

struct Inner<T> {
    subscription: Subscription,
    state: Mutex<Delivery<T>>,
}

impl<T> Inner<T> {
    fn detach_destination(&self) {
        let dest = {
            let mut st = self.state.lock();
            st.released = true;
            st.stopped = true;
            st.backlog.clear();
            st.destination.take()
        };
        drop(dest);
    }
}

/// Live execution of a source for one consumer.
///
/// Cheap to clone: clones are handles to the same execution.
pub struct Subscriber<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Subscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> Subscriber<T> {
    /// Wraps `observer` in a fresh execution node.
    pub fn new<O>(observer: O) -> Self
    where
        O: Observer<T>,
    {
        let inner = Arc::new(Inner {
            subscription: Subscription::new(),
            state: Mutex::new(Delivery {
                destination: Some(Box::new(observer)),
                stopped: false,
                released: false,
                draining: false,
                backlog: VecDeque::new(),
            }),
        });
        let weak = Arc::downgrade(&inner);
        inner.subscription.add(Teardown::from_fn(move || {
            if let Some(inner) = weak.upgrade() {
                inner.detach_destination();
            }
        }));
        Self { inner }
    }

    /// Builds an operator node that feeds `destination`.
    ///
    /// The new node is attached to `destination`'s subscription, so releasing the
    /// consumer releases the operator and everything upstream of it.
    pub fn chained<U, O>(destination: &Subscriber<U>, observer: O) -> Self
    where
        U: Send + 'static,
        O: Observer<T>,
    {
        let node = Self::new(observer);
        destination.add(node.subscription());
        node
    }

    /// Delivers a value unless stopped or released.
    pub fn next(&self, value: T) {
        self.emit(Notification::Next(value));
    }

    /// Delivers the terminal error (at most once) and releases.
    pub fn error(&self, err: StreamError) {
        self.emit(Notification::Error(err));
    }

    /// Delivers the terminal completion (at most once) and releases.
    pub fn complete(&self) {
        self.emit(Notification::Complete);
    }

    /// True once a terminal notification was accepted or the node was released.
    pub fn is_stopped(&self) -> bool {
        self.inner.state.lock().stopped
    }

    /// True once the underlying subscription was released.
    pub fn is_closed(&self) -> bool {
        self.inner.subscription.is_closed()
    }

    /// Handle to this node's cancellation tree.
    pub fn subscription(&self) -> Subscription {
        self.inner.subscription.clone()
    }

    /// Attaches a teardown to this execution.
    pub fn add(&self, teardown: impl Into<Teardown>) {
        self.inner.subscription.add(teardown);
    }

    /// Releases this execution (same as releasing [`subscription`](Self::subscription)).
    pub fn release(&self) -> Result<(), StreamError> {
        self.inner.subscription.release()
    }

    /// Queues `batch` ahead of anything emitted later, without delivering it.
    ///
    /// Returns true when the caller claimed delivery and must call
    /// [`resume`](Self::resume) once it no longer holds its own locks.
    pub(crate) fn preload<I>(&self, batch: I) -> bool
    where
        I: IntoIterator<Item = Notification<T>>,
    {
        let mut st = self.inner.state.lock();
        if st.released {
            return false;
        }
        for n in batch {
            if st.stopped {
                break;
            }
            if n.is_terminal() {
                st.stopped = true;
            }
            st.backlog.push_back(n);
        }
        if st.draining || st.backlog.is_empty() || st.destination.is_none() {
            return false;
        }
        st.draining = true;
        true
    }

    /// Delivers what [`preload`](Self::preload) queued, plus anything queued since.
    pub(crate) fn resume(&self) {
        let (dest, first) = {
            let mut st = self.inner.state.lock();
            let first = if st.released { None } else { st.backlog.pop_front() };
            match (first, st.destination.take()) {
                (Some(n), Some(dest)) => (dest, n),
                (_, dest) => {
                    st.draining = false;
                    st.destination = dest;
                    return;
                }
            }
        };
        self.drain(dest, first);
    }

    fn emit(&self, n: Notification<T>) {
        let (dest, first) = {
            let mut st = self.inner.state.lock();
            if st.released {
                drop(st);
                if n.is_terminal() {
                    report::stopped_notification("subscriber");
                }
                return;
            }
            if st.stopped {
                drop(st);
                match n {
                    Notification::Error(err) => report::unhandled("subscriber", &err),
                    Notification::Complete => report::stopped_notification("subscriber"),
                    Notification::Next(_) => {}
                }
                return;
            }
            if n.is_terminal() {
                st.stopped = true;
            }
            if st.draining {
                st.backlog.push_back(n);
                return;
            }
            let Some(dest) = st.destination.take() else {
                return;
            };
            st.draining = true;
            (dest, n)
        };
        self.drain(dest, first);
    }

    fn drain(&self, mut dest: Box<dyn Observer<T>>, first: Notification<T>) {
        let mut current = first;
        loop {
            let terminal = current.is_terminal();
            self.deliver(&mut dest, current);
            if terminal {
                if let Err(e) = self.inner.subscription.release() {
                    report::teardown_failed("subscriber", &e);
                }
            }

            let mut st = self.inner.state.lock();
            let next = if st.released {
                None
            } else {
                st.backlog.pop_front()
            };
            match next {
                Some(n) => {
                    drop(st);
                    current = n;
                }
                None => {
                    st.draining = false;
                    if st.released {
                        drop(st);
                        drop(dest);
                    } else {
                        st.destination = Some(dest);
                    }
                    return;
                }
            }
        }
    }

    fn deliver(&self, dest: &mut Box<dyn Observer<T>>, n: Notification<T>) {
        match n {
            Notification::Next(value) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| dest.next(value)));
                if let Err(panic) = outcome {
                    self.convert_panic(StreamError::from_panic(panic));
                }
            }
            Notification::Error(err) => {
                let outcome = catch_unwind(AssertUnwindSafe(|| dest.error(err)));
                if let Err(panic) = outcome {
                    report::unhandled("subscriber", &StreamError::from_panic(panic));
                }
            }
            Notification::Complete => {
                let outcome = catch_unwind(AssertUnwindSafe(|| dest.complete()));
                if let Err(panic) = outcome {
                    report::unhandled("subscriber", &StreamError::from_panic(panic));
                }
            }
        }
    }

    /// Replaces whatever is queued with the destination's own failure.
    fn convert_panic(&self, err: StreamError) {
        let displaced: Vec<StreamError> = {
            let mut st = self.inner.state.lock();
            st.stopped = true;
            let displaced = st
                .backlog
                .drain(..)
                .filter_map(|n| match n {
                    Notification::Error(e) => Some(e),
                    _ => None,
                })
                .collect();
            st.backlog.push_back(Notification::Error(err));
            displaced
        };
        for e in displaced {
            report::unhandled("subscriber", &e);
        }
    }
}

impl<T: Send + 'static> Observer<T> for Subscriber<T> {
    fn next(&mut self, value: T) {
        Subscriber::next(self, value)
    }

    fn error(&mut self, err: StreamError) {
        Subscriber::error(self, err)
    }

    fn complete(&mut self) {
        Subscriber::complete(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::observer::FnObserver;
    use crate::testing::TestObserver;

    #[test]
    fn test_terminal_notification_is_delivered_once() {
        let obs = TestObserver::<i32>::new();
        let sub = Subscriber::new(obs.clone());

        sub.next(1);
        sub.complete();
        sub.next(2);
        sub.complete();
        sub.error(StreamError::fail("late"));

        assert_eq!(obs.values(), vec![1]);
        assert!(obs.is_completed());
        assert_eq!(obs.terminal_count(), 1);
        assert!(sub.is_closed());
    }

    #[test]
    fn test_error_after_complete_is_reported_out_of_band() {
        let mut rx = crate::events::bus().subscribe();
        let obs = TestObserver::<i32>::new();
        let sub = Subscriber::new(obs.clone());
        sub.complete();
        sub.error(StreamError::fail("subscriber-late-error-marker"));

        assert!(obs.error().is_none());
        let mut seen = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.reason.as_deref() == Some("stream failed: subscriber-late-error-marker") {
                seen = true;
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_release_stops_delivery() {
        let obs = TestObserver::<i32>::new();
        let sub = Subscriber::new(obs.clone());
        sub.next(1);
        sub.release().unwrap();
        sub.next(2);
        sub.complete();

        assert_eq!(obs.values(), vec![1]);
        assert_eq!(obs.terminal_count(), 0);
        assert!(sub.is_stopped());
    }

    #[test]
    fn test_destination_panic_becomes_error() {
        let obs = TestObserver::<i32>::new();
        let rec = obs.clone();
        let sub = Subscriber::new(
            FnObserver::new(move |v: i32| {
                if v == 2 {
                    panic!("bad value");
                }
                let mut r = rec.clone();
                Observer::next(&mut r, v);
            })
            .on_error({
                let mut r = obs.clone();
                move |e| Observer::error(&mut r, e)
            }),
        );

        sub.next(1);
        sub.next(2);
        sub.next(3);

        assert_eq!(obs.values(), vec![1]);
        let err = obs.error().expect("panic routed to error");
        assert_eq!(err.as_label(), "panicked");
        assert!(sub.is_closed());
    }

    #[test]
    fn test_reentrant_emission_is_queued_in_order() {
        let obs = TestObserver::<i32>::new();
        let slot: Arc<Mutex<Option<Subscriber<i32>>>> = Arc::new(Mutex::new(None));
        let rec = obs.clone();
        let me = slot.clone();
        let sub = Subscriber::new(FnObserver::new(move |v: i32| {
            let mut r = rec.clone();
            Observer::next(&mut r, v);
            if v < 3 {
                let this = me.lock().clone();
                if let Some(this) = this {
                    this.next(v + 10);
                    this.next(v + 1);
                }
            }
        }));
        *slot.lock() = Some(sub.clone());

        sub.next(1);
        assert_eq!(obs.values(), vec![1, 11, 2, 12, 3]);
        slot.lock().take();
    }

    #[test]
    fn test_chained_node_released_with_destination() {
        let downstream = Subscriber::new(TestObserver::<i32>::new());
        let upstream = Subscriber::<i32>::chained(&downstream, TestObserver::<i32>::new());
        downstream.release().unwrap();
        assert!(upstream.is_closed());
    }

    #[test]
    fn test_teardown_runs_after_terminal() {
        let obs = TestObserver::<i32>::new();
        let sub = Subscriber::new(obs.clone());
        let flag = Arc::new(Mutex::new(false));
        let f = flag.clone();
        sub.add(Teardown::from_fn(move || *f.lock() = true));
        sub.error(StreamError::fail("x"));
        assert!(*flag.lock());
    }
}
