//! # Deferred, shared upstream execution.
//!
//! [`ConnectableSource`] routes subscribers into a subject and only subscribes
//! the subject to the upstream when [`connect`](ConnectableSource::connect) is
//! called. [`ref_count`](ConnectableSource::ref_count) automates that: the first
//! subscriber connects, the last one to leave disconnects.
//!
//! ```text
//!  subscriber ─┐                     connect()
//!  subscriber ─┼─► subject ◄── relay ◄────────── upstream
//!  subscriber ─┘
//! ```
//!
//! ## Rules
//! - One connection at a time; `connect` while connected returns the live one.
//! - When the connection ends (released, or upstream terminated) the subject and
//!   the reference count are reset, so the next connection starts a fresh
//!   execution with a fresh subject.
//! - A subject that already terminated is replaced on the next subscription.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::core::{Observer, Source, Subscriber, Subscription, Teardown};
use crate::error::StreamError;
use crate::events::report;

use super::Multicast;

type Factory<T> = dyn Fn() -> Arc<dyn Multicast<T>> + Send + Sync;

struct State<T> {
    subject: Option<Arc<dyn Multicast<T>>>,
    connection: Option<(u64, Subscription)>,
    epoch: u64,
    ref_count: usize,
}

struct Inner<T> {
    upstream: Source<T>,
    factory: Box<Factory<T>>,
    state: Mutex<State<T>>,
}

impl<T: Send + 'static> Inner<T> {
    fn subject(&self) -> Arc<dyn Multicast<T>> {
        {
            let st = self.state.lock();
            if let Some(s) = st.subject.as_ref().filter(|s| !s.is_stopped()) {
                return Arc::clone(s);
            }
        }
        let fresh = (self.factory)();
        let mut st = self.state.lock();
        match st.subject.as_ref().filter(|s| !s.is_stopped()) {
            Some(s) => Arc::clone(s),
            None => {
                st.subject = Some(Arc::clone(&fresh));
                fresh
            }
        }
    }

    /// Forgets connection `epoch` and hands it back; no-op if a newer
    /// connection replaced it.
    fn reset(&self, epoch: u64) -> Option<Subscription> {
        let mut st = self.state.lock();
        if !st.connection.as_ref().is_some_and(|(e, _)| *e == epoch) {
            return None;
        }
        st.subject = None;
        st.ref_count = 0;
        st.connection.take().map(|(_, c)| c)
    }
}

/// Forwards the upstream into the connected subject.
struct Relay<T> {
    subject: Arc<dyn Multicast<T>>,
    owner: Weak<Inner<T>>,
    epoch: u64,
}

impl<T: Send + 'static> Relay<T> {
    fn disconnect(&self) {
        let Some(inner) = self.owner.upgrade() else {
            return;
        };
        if let Some(connection) = inner.reset(self.epoch) {
            if let Err(e) = connection.release() {
                report::teardown_failed("connectable", &e);
            }
        }
    }
}

impl<T: Send + 'static> Observer<T> for Relay<T> {
    fn next(&mut self, value: T) {
        if let Err(e) = self.subject.try_next(value) {
            report::unhandled("connectable", &e);
        }
    }

    fn error(&mut self, err: StreamError) {
        self.disconnect();
        if let Err(e) = self.subject.try_error(err) {
            report::unhandled("connectable", &e);
        }
    }

    fn complete(&mut self) {
        self.disconnect();
        if let Err(e) = self.subject.try_complete() {
            report::unhandled("connectable", &e);
        }
    }
}

/// Hot source whose upstream subscription is controlled explicitly.
pub struct ConnectableSource<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for ConnectableSource<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> ConnectableSource<T> {
    /// Shares `upstream` through subjects built by `factory`.
    pub fn new<M, F>(upstream: Source<T>, factory: F) -> Self
    where
        M: Multicast<T>,
        F: Fn() -> M + Send + Sync + 'static,
    {
        let factory: Box<Factory<T>> = Box::new(move || Arc::new(factory()) as Arc<dyn Multicast<T>>);
        Self {
            inner: Arc::new(Inner {
                upstream,
                factory,
                state: Mutex::new(State {
                    subject: None,
                    connection: None,
                    epoch: 0,
                    ref_count: 0,
                }),
            }),
        }
    }

    /// Subscribing joins the current subject without connecting.
    pub fn source(&self) -> Source<T> {
        let inner = Arc::clone(&self.inner);
        Source::new(move |subscriber| {
            inner.subject().source().subscribe_with(subscriber);
            Ok(Teardown::None)
        })
    }

    /// Subscribes the subject to the upstream, or returns the live connection.
    ///
    /// Releasing the returned handle disconnects.
    pub fn connect(&self) -> Subscription {
        let (epoch, connection) = {
            let mut st = self.inner.state.lock();
            if let Some((_, live)) = &st.connection {
                return live.clone();
            }
            st.epoch += 1;
            let connection = Subscription::new();
            st.connection = Some((st.epoch, connection.clone()));
            (st.epoch, connection)
        };

        let subject = self.inner.subject();
        let relay = Subscriber::new(Relay {
            subject,
            owner: Arc::downgrade(&self.inner),
            epoch,
        });
        connection.add(relay.subscription());
        let owner = Arc::downgrade(&self.inner);
        connection.add(Teardown::from_fn(move || {
            if let Some(inner) = owner.upgrade() {
                let _ = inner.reset(epoch);
            }
        }));
        self.inner.upstream.subscribe_with(relay);
        connection
    }

    /// True while a connection is live.
    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connection.is_some()
    }

    /// Source that connects on the first subscriber and disconnects after the last.
    pub fn ref_count(&self) -> Source<T> {
        let this = self.clone();
        Source::new(move |subscriber| {
            this.inner.state.lock().ref_count += 1;
            this.source().subscribe_with(subscriber.clone());
            let mine = (!subscriber.is_closed()).then(|| this.connect());

            let owner = Arc::downgrade(&this.inner);
            Ok(Teardown::from_fn(move || {
                let Some(inner) = owner.upgrade() else {
                    return;
                };
                let shared = {
                    let mut st = inner.state.lock();
                    if st.ref_count == 0 {
                        return;
                    }
                    st.ref_count -= 1;
                    if st.ref_count > 0 {
                        return;
                    }
                    st.connection.as_ref().map(|(_, c)| c.clone())
                };
                let Some(shared) = shared else {
                    return;
                };
                if mine.as_ref().is_none_or(|m| m.ptr_eq(&shared)) {
                    if let Err(e) = shared.release() {
                        report::teardown_failed("ref_count", &e);
                    }
                }
            }))
        })
    }
}
