//! # Sources and stages.
//!
//! A [`Source`] is a reusable recipe: every `subscribe` call creates a fresh
//! [`Subscriber`] and runs the recipe against it. Recipes are either a producing
//! function, or an upstream source plus a [`Stage`].
//!
//! ## Lifting
//! ```text
//! source.lift(stage).subscribe(consumer)
//!
//!   consumer ──► Subscriber<Out> (destination)
//!                      │
//!        stage.call(destination, &upstream)
//!                      │
//!                      ▼
//!                Subscriber<In> (operator node, attached to destination)
//!                      │
//!        upstream.subscribe_with(node)
//! ```
//! Each stage only sees its own destination and its own upstream, so chains
//! compose without any stage knowing about the others.
//!
//! ## Rules
//! - Subscribing never panics and never returns an error: a producer that
//!   returns `Err` or panics has the failure routed into the subscriber's
//!   `error` (reported as unhandled if the subscriber already terminated).
//! - Synchronous producers deliver everything before `subscribe` returns.
//! - The teardown returned by a producer is attached to the subscriber; if the
//!   subscriber already terminated it runs immediately.

use std::marker::PhantomData;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::error::StreamError;

use super::observer::{FnObserver, Observer};
use super::subscriber::Subscriber;
use super::subscription::{Subscription, Teardown};

/// Transformation attached to a source by [`Source::lift`].
///
/// Given the downstream destination and the upstream source, returns the node to
/// subscribe upstream with. Implementations normally build it with
/// [`Subscriber::chained`].
pub trait Stage<In, Out>: Send + Sync + 'static {
    /// Builds the operator node for one subscription.
    fn call(&self, destination: Subscriber<Out>, upstream: &Source<In>) -> Subscriber<In>;
}

impl<In, Out, F> Stage<In, Out> for F
where
    F: Fn(Subscriber<Out>, &Source<In>) -> Subscriber<In> + Send + Sync + 'static,
{
    fn call(&self, destination: Subscriber<Out>, upstream: &Source<In>) -> Subscriber<In> {
        self(destination, upstream)
    }
}

trait Recipe<T>: Send + Sync {
    fn run(&self, subscriber: Subscriber<T>);
}

type ProduceFn<T> = dyn Fn(Subscriber<T>) -> Result<Teardown, StreamError> + Send + Sync;

struct Produce<T> {
    f: Box<ProduceFn<T>>,
}

impl<T: Send + 'static> Recipe<T> for Produce<T> {
    fn run(&self, subscriber: Subscriber<T>) {
        let outcome = catch_unwind(AssertUnwindSafe(|| (self.f)(subscriber.clone())));
        match outcome {
            Ok(Ok(teardown)) => subscriber.add(teardown),
            Ok(Err(err)) => subscriber.error(err),
            Err(panic) => subscriber.error(StreamError::from_panic(panic)),
        }
    }
}

struct Lifted<In, Out, S> {
    upstream: Source<In>,
    stage: S,
    _out: PhantomData<fn() -> Out>,
}

impl<In, Out, S> Recipe<Out> for Lifted<In, Out, S>
where
    In: Send + 'static,
    Out: Send + 'static,
    S: Stage<In, Out>,
{
    fn run(&self, destination: Subscriber<Out>) {
        let node = self.stage.call(destination, &self.upstream);
        self.upstream.subscribe_with(node);
    }
}

/// Cold, reusable description of a sequence.
pub struct Source<T> {
    recipe: Arc<dyn Recipe<T>>,
}

impl<T> Clone for Source<T> {
    fn clone(&self) -> Self {
        Self {
            recipe: Arc::clone(&self.recipe),
        }
    }
}

impl<T: Send + 'static> Source<T> {
    /// Creates a source from a producing function.
    ///
    /// The function runs once per subscription and returns the teardown for that
    /// execution.
    ///
    /// # Example
    /// ```
    /// use rill::{Source, Teardown};
    ///
    /// let numbers = Source::new(|s| {
    ///     s.next(1);
    ///     s.next(2);
    ///     s.complete();
    ///     Ok(Teardown::None)
    /// });
    /// numbers.subscribe_fn(|v: i32| println!("{v}"));
    /// ```
    pub fn new<F>(producer: F) -> Self
    where
        F: Fn(Subscriber<T>) -> Result<Teardown, StreamError> + Send + Sync + 'static,
    {
        Self {
            recipe: Arc::new(Produce {
                f: Box::new(producer),
            }),
        }
    }

    /// Subscribes `observer` and returns the cancellation handle of the execution.
    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: Observer<T>,
    {
        self.subscribe_with(Subscriber::new(observer))
    }

    /// Subscribes with a `next` callback only; errors become unhandled.
    pub fn subscribe_fn<N>(&self, next: N) -> Subscription
    where
        N: FnMut(T) + Send + 'static,
    {
        self.subscribe(FnObserver::new(next))
    }

    /// Subscribes with all three callbacks.
    pub fn subscribe_all<N, E, C>(&self, next: N, error: E, complete: C) -> Subscription
    where
        N: FnMut(T) + Send + 'static,
        E: FnMut(StreamError) + Send + 'static,
        C: FnMut() + Send + 'static,
    {
        self.subscribe(FnObserver::new(next).on_error(error).on_complete(complete))
    }

    /// Runs this source against an existing execution node.
    pub fn subscribe_with(&self, subscriber: Subscriber<T>) -> Subscription {
        let handle = subscriber.subscription();
        self.recipe.run(subscriber);
        handle
    }

    /// Returns a source that applies `stage` on every subscription.
    pub fn lift<Out, S>(&self, stage: S) -> Source<Out>
    where
        Out: Send + 'static,
        S: Stage<T, Out>,
    {
        Source {
            recipe: Arc::new(Lifted {
                upstream: self.clone(),
                stage,
                _out: PhantomData,
            }),
        }
    }

    /// Applies an operator function.
    ///
    /// # Example
    /// ```
    /// use rill::{Source, from_iter};
    ///
    /// fn doubled(src: Source<i32>) -> Source<i32> {
    ///     src.map(|v| v * 2)
    /// }
    ///
    /// from_iter(vec![1, 2]).pipe(doubled).subscribe_fn(|v| println!("{v}"));
    /// ```
    pub fn pipe<U, F>(self, op: F) -> Source<U>
    where
        F: FnOnce(Source<T>) -> Source<U>,
    {
        op(self)
    }
}
