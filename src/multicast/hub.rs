//! # Shared fan-out core of every subject.
//!
//! A [`Hub`] keeps the live observer list, the terminal state and (depending on
//! its [`Memory`]) whatever late subscribers need to see.
//!
//! ## Rules
//! - Fan-out iterates a snapshot taken under the lock; user code runs unlocked,
//!   so observers may subscribe or unsubscribe from inside a notification.
//! - After a terminal notification, emissions fail with
//!   [`StreamError::AlreadyTerminated`] and late subscribers get the recorded
//!   terminal (after any replayed values).
//! - Replayed values are queued into a new subscriber before it joins the
//!   fan-out, so live values always follow them.
//! - After `release`, emissions fail with [`StreamError::ObjectUnsubscribed`] and
//!   subscribing delivers that error.

use std::collections::VecDeque;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{Notification, Source, Subscriber, Teardown};
use crate::error::StreamError;
use crate::scheduler::Scheduler;

/// What a hub remembers for late subscribers.
pub(crate) enum Memory<T> {
    /// Nothing (plain subject).
    None,
    /// Bounded, optionally time-windowed history.
    Replay {
        buffer: VecDeque<(Duration, T)>,
        size: usize,
        window: Option<Duration>,
        clock: Option<Arc<dyn Scheduler>>,
    },
    /// Current value, emitted on subscribe; shared with the owning subject.
    Behavior(Arc<Mutex<T>>),
    /// Latest value, emitted only on completion.
    Last(Option<T>),
}

impl<T: Clone> Memory<T> {
    fn now(&self) -> Duration {
        match self {
            Memory::Replay { clock: Some(c), .. } => c.now(),
            _ => Duration::ZERO,
        }
    }

    fn trim(&mut self) {
        let now = self.now();
        if let Memory::Replay {
            buffer,
            size,
            window,
            ..
        } = self
        {
            while buffer.len() > *size {
                buffer.pop_front();
            }
            if let Some(window) = window {
                while buffer
                    .front()
                    .is_some_and(|(at, _)| at.saturating_add(*window) <= now)
                {
                    buffer.pop_front();
                }
            }
        }
    }
}

struct State<T> {
    observers: Vec<(u64, Subscriber<T>)>,
    next_id: u64,
    stopped: bool,
    closed: bool,
    error: Option<StreamError>,
    memory: Memory<T>,
}

pub(crate) struct Hub<T> {
    state: Arc<Mutex<State<T>>>,
}

impl<T> Clone for Hub<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T: Clone + Send + 'static> Hub<T> {
    pub(crate) fn new(memory: Memory<T>) -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                observers: Vec::new(),
                next_id: 0,
                stopped: false,
                closed: false,
                error: None,
                memory,
            })),
        }
    }

    pub(crate) fn source(&self) -> Source<T> {
        let hub = self.clone();
        Source::new(move |subscriber| Ok(hub.attach(subscriber)))
    }

    fn attach(&self, subscriber: Subscriber<T>) -> Teardown {
        let (claimed, id) = {
            let mut st = self.state.lock();
            if st.closed {
                drop(st);
                subscriber.error(StreamError::ObjectUnsubscribed);
                return Teardown::None;
            }
            st.memory.trim();
            let stopped = st.stopped;
            let mut replay: Vec<Notification<T>> = match &st.memory {
                Memory::None => Vec::new(),
                Memory::Replay { buffer, .. } => buffer
                    .iter()
                    .map(|(_, v)| Notification::Next(v.clone()))
                    .collect(),
                Memory::Behavior(v) if !stopped => vec![Notification::Next(v.lock().clone())],
                Memory::Behavior(_) => Vec::new(),
                Memory::Last(v) if stopped && st.error.is_none() => {
                    v.iter().cloned().map(Notification::Next).collect()
                }
                Memory::Last(_) => Vec::new(),
            };
            if stopped {
                replay.push(match &st.error {
                    Some(err) => Notification::Error(err.clone()),
                    None => Notification::Complete,
                });
            }
            // Replay is queued before the subscriber becomes visible to emitters.
            let claimed = subscriber.preload(replay);
            let id = if stopped {
                None
            } else {
                let id = st.next_id;
                st.next_id += 1;
                st.observers.push((id, subscriber.clone()));
                Some(id)
            };
            (claimed, id)
        };
        if claimed {
            subscriber.resume();
        }

        let Some(id) = id else {
            return Teardown::None;
        };
        let weak: Weak<Mutex<State<T>>> = Arc::downgrade(&self.state);
        Teardown::from_fn(move || {
            if let Some(state) = weak.upgrade() {
                state.lock().observers.retain(|(i, _)| *i != id);
            }
        })
    }

    fn snapshot(st: &State<T>) -> Vec<Subscriber<T>> {
        st.observers.iter().map(|(_, s)| s.clone()).collect()
    }

    pub(crate) fn try_next(&self, value: T) -> Result<(), StreamError> {
        let targets = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(StreamError::ObjectUnsubscribed);
            }
            if st.stopped {
                return Err(StreamError::AlreadyTerminated);
            }
            let now = st.memory.now();
            match &mut st.memory {
                Memory::None => {}
                Memory::Replay { buffer, .. } => buffer.push_back((now, value.clone())),
                Memory::Behavior(current) => *current.lock() = value.clone(),
                Memory::Last(last) => {
                    *last = Some(value);
                    return Ok(());
                }
            }
            st.memory.trim();
            Self::snapshot(&st)
        };
        fan_out(targets, value);
        Ok(())
    }

    pub(crate) fn try_error(&self, err: StreamError) -> Result<(), StreamError> {
        let targets = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(StreamError::ObjectUnsubscribed);
            }
            if st.stopped {
                return Err(StreamError::AlreadyTerminated);
            }
            st.stopped = true;
            st.error = Some(err.clone());
            std::mem::take(&mut st.observers)
        };
        for (_, s) in targets {
            s.error(err.clone());
        }
        Ok(())
    }

    pub(crate) fn try_complete(&self) -> Result<(), StreamError> {
        let (targets, last) = {
            let mut st = self.state.lock();
            if st.closed {
                return Err(StreamError::ObjectUnsubscribed);
            }
            if st.stopped {
                return Err(StreamError::AlreadyTerminated);
            }
            st.stopped = true;
            let last = match &st.memory {
                Memory::Last(v) => v.clone(),
                _ => None,
            };
            (std::mem::take(&mut st.observers), last)
        };
        for (_, s) in targets {
            if let Some(v) = &last {
                s.next(v.clone());
            }
            s.complete();
        }
        Ok(())
    }

    /// Closes the hub; current observers are dropped without notification.
    pub(crate) fn release(&self) {
        let dropped = {
            let mut st = self.state.lock();
            st.closed = true;
            st.stopped = true;
            std::mem::take(&mut st.observers)
        };
        drop(dropped);
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.state.lock().observers.len()
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.state.lock().stopped
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub(crate) fn thrown_error(&self) -> Option<StreamError> {
        self.state.lock().error.clone()
    }
}

fn fan_out<T: Clone + Send + 'static>(mut targets: Vec<Subscriber<T>>, value: T) {
    let Some(last) = targets.pop() else {
        return;
    };
    for s in targets {
        s.next(value.clone());
    }
    last.next(value);
}

/// Generates the shared public surface of a subject newtype around `Hub`.
macro_rules! subject_surface {
    ($name:ident) => {
        impl<T: Clone + Send + 'static> $name<T> {
            /// Cold view of this subject: each subscription joins the fan-out.
            pub fn source(&self) -> $crate::core::Source<T> {
                self.hub.source()
            }

            /// Subscribes `observer` to the fan-out.
            pub fn subscribe<O>(&self, observer: O) -> $crate::core::Subscription
            where
                O: $crate::core::Observer<T>,
            {
                self.hub.source().subscribe(observer)
            }

            /// Emits a value; fails once the subject is terminated or released.
            pub fn try_next(&self, value: T) -> Result<(), $crate::error::StreamError> {
                self.hub.try_next(value)
            }

            /// Emits the terminal error; fails once the subject is terminated or released.
            pub fn try_error(
                &self,
                err: $crate::error::StreamError,
            ) -> Result<(), $crate::error::StreamError> {
                self.hub.try_error(err)
            }

            /// Emits completion; fails once the subject is terminated or released.
            pub fn try_complete(&self) -> Result<(), $crate::error::StreamError> {
                self.hub.try_complete()
            }

            /// Emits a value, reporting misuse as unhandled.
            pub fn next(&self, value: T) {
                if let Err(e) = self.hub.try_next(value) {
                    $crate::events::report::unhandled(stringify!($name), &e);
                }
            }

            /// Emits the terminal error, reporting misuse as unhandled.
            pub fn error(&self, err: $crate::error::StreamError) {
                if let Err(e) = self.hub.try_error(err) {
                    $crate::events::report::unhandled(stringify!($name), &e);
                }
            }

            /// Emits completion, reporting misuse as unhandled.
            pub fn complete(&self) {
                if let Err(e) = self.hub.try_complete() {
                    $crate::events::report::unhandled(stringify!($name), &e);
                }
            }

            /// Number of live observers.
            pub fn observer_count(&self) -> usize {
                self.hub.observer_count()
            }

            /// True once a terminal notification was emitted (or released).
            pub fn is_stopped(&self) -> bool {
                self.hub.is_stopped()
            }

            /// True once released.
            pub fn is_closed(&self) -> bool {
                self.hub.is_closed()
            }

            /// Closes the subject and drops its observers without notifying them.
            pub fn release(&self) {
                self.hub.release()
            }
        }

        impl<T: Clone + Send + 'static> $crate::core::Observer<T> for $name<T> {
            fn next(&mut self, value: T) {
                $name::next(self, value)
            }

            fn error(&mut self, err: $crate::error::StreamError) {
                $name::error(self, err)
            }

            fn complete(&mut self) {
                $name::complete(self)
            }
        }

        impl<T: Clone + Send + 'static> $crate::multicast::Multicast<T> for $name<T> {
            fn source(&self) -> $crate::core::Source<T> {
                self.hub.source()
            }

            fn try_next(&self, value: T) -> Result<(), $crate::error::StreamError> {
                self.hub.try_next(value)
            }

            fn try_error(&self, err: $crate::error::StreamError) -> Result<(), $crate::error::StreamError> {
                self.hub.try_error(err)
            }

            fn try_complete(&self) -> Result<(), $crate::error::StreamError> {
                self.hub.try_complete()
            }

            fn release(&self) {
                self.hub.release()
            }

            fn is_stopped(&self) -> bool {
                self.hub.is_stopped()
            }
        }
    };
}

pub(crate) use subject_surface;
