//! # Stages.
//!
//! Operators are inherent methods on [`Source`](crate::Source), each built with
//! [`Source::lift`](crate::Source::lift). They are grouped by concern:
//!
//! - [`transform`]: `map`, `filter`, `take`, `tap`, `finalize`;
//! - [`schedule`]: `observe_on`, `subscribe_on`;
//! - [`flatten`]: outer/inner coordination behind `merge_map`, `concat_map`,
//!   `merge_all`, `switch_map`, `exhaust_map`;
//! - [`share`]: `publish`, `publish_replay`, `publish_behavior`, `share`.

use std::marker::PhantomData;

use crate::core::{Observer, Source, Subscriber};
use crate::error::StreamError;

pub mod flatten;
pub mod schedule;
pub mod share;
pub mod transform;

/// Operator observer: handles values with `on_next`, forwards terminals.
pub(crate) struct Forward<T, U, N> {
    destination: Subscriber<U>,
    on_next: N,
    _in: PhantomData<fn(T)>,
}

impl<T, U, N> Forward<T, U, N>
where
    U: Send + 'static,
    N: FnMut(&Subscriber<U>, T) + Send + 'static,
{
    pub(crate) fn new(destination: Subscriber<U>, on_next: N) -> Self {
        Self {
            destination,
            on_next,
            _in: PhantomData,
        }
    }
}

impl<T, U, N> Observer<T> for Forward<T, U, N>
where
    T: 'static,
    U: Send + 'static,
    N: FnMut(&Subscriber<U>, T) + Send + 'static,
{
    fn next(&mut self, value: T) {
        (self.on_next)(&self.destination, value)
    }

    fn error(&mut self, err: StreamError) {
        self.destination.error(err)
    }

    fn complete(&mut self) {
        self.destination.complete()
    }
}

/// Lifts a per-subscription `on_next` builder into a stage.
///
/// `build` runs once per subscription and returns the value handler for it.
pub(crate) fn forward_stage<T, U, B, N>(
    upstream: &Source<T>,
    build: B,
) -> Source<U>
where
    T: Send + 'static,
    U: Send + 'static,
    B: Fn() -> N + Send + Sync + 'static,
    N: FnMut(&Subscriber<U>, T) + Send + 'static,
{
    upstream.lift(move |destination: Subscriber<U>, _: &Source<T>| {
        let forward = Forward::new(destination.clone(), build());
        Subscriber::chained(&destination, forward)
    })
}
