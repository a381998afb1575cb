//! Per-value stages: `map`, `filter`, `take`, `tap`, `finalize`.
//!
//! A panic inside a user callback is caught by the operator's own node and
//! becomes the stream's error, releasing the upstream.

use std::sync::Arc;

use crate::core::{Source, Subscriber, Teardown};

use super::{Forward, forward_stage};

impl<T: Send + 'static> Source<T> {
    /// Transforms every value.
    pub fn map<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        forward_stage(self, move || {
            let f = Arc::clone(&f);
            move |d: &Subscriber<U>, v: T| d.next(f(v))
        })
    }

    /// Transforms every value together with its zero-based index.
    pub fn map_indexed<U, F>(&self, f: F) -> Source<U>
    where
        U: Send + 'static,
        F: Fn(T, usize) -> U + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        forward_stage(self, move || {
            let f = Arc::clone(&f);
            let mut index = 0;
            move |d: &Subscriber<U>, v: T| {
                let i = index;
                index += 1;
                d.next(f(v, i))
            }
        })
    }

    /// Keeps values matching `predicate`.
    pub fn filter<P>(&self, predicate: P) -> Source<T>
    where
        P: Fn(&T) -> bool + Send + Sync + 'static,
    {
        let p = Arc::new(predicate);
        forward_stage(self, move || {
            let p = Arc::clone(&p);
            move |d: &Subscriber<T>, v: T| {
                if p(&v) {
                    d.next(v)
                }
            }
        })
    }

    /// Emits the first `count` values, then completes and releases the upstream.
    pub fn take(&self, count: usize) -> Source<T> {
        if count == 0 {
            return Source::new(|s| {
                s.complete();
                Ok(Teardown::None)
            });
        }
        forward_stage(self, move || {
            let mut seen = 0;
            move |d: &Subscriber<T>, v: T| {
                seen += 1;
                d.next(v);
                if seen >= count {
                    d.complete();
                }
            }
        })
    }

    /// Runs a side effect for every value, passing values through unchanged.
    pub fn tap<F>(&self, f: F) -> Source<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        forward_stage(self, move || {
            let f = Arc::clone(&f);
            move |d: &Subscriber<T>, v: T| {
                f(&v);
                d.next(v)
            }
        })
    }

    /// Runs `f` once the subscription ends, whether by error, completion or release.
    pub fn finalize<F>(&self, f: F) -> Source<T>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        self.lift(move |destination: Subscriber<T>, _: &Source<T>| {
            let node = Subscriber::chained(
                &destination,
                Forward::new(destination.clone(), |d: &Subscriber<T>, v: T| d.next(v)),
            );
            let f = Arc::clone(&f);
            node.add(Teardown::from_fn(move || f()));
            node
        })
    }
}
