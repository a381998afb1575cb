//! # Observer contract
//!
//! `Observer` is the three-channel protocol every consumer implements:
//! `next` for values, then at most one of `error` or `complete`.
//!
//! ## Contract
//! - Implementations only need `next`; `complete` defaults to a no-op.
//! - The default `error` treats the error as **unhandled**: it is reported on the
//!   diagnostics bus instead of being dropped.
//! - Observers are never called concurrently for one subscription; the
//!   [`Subscriber`](crate::Subscriber) wrapping them serializes delivery.
//!
//! ## Example
//! ```rust
//! use rill::{Observer, StreamError};
//!
//! struct Sum(i64);
//!
//! impl Observer<i64> for Sum {
//!     fn next(&mut self, value: i64) {
//!         self.0 += value;
//!     }
//!     fn error(&mut self, err: StreamError) {
//!         eprintln!("sum failed: {err}");
//!     }
//! }
//! ```

use crate::error::StreamError;
use crate::events::report;

/// Consumer side of a stream.
pub trait Observer<T>: Send + 'static {
    /// Receives one value.
    fn next(&mut self, value: T);

    /// Receives the terminal error.
    ///
    /// The default implementation reports the error as unhandled.
    fn error(&mut self, err: StreamError) {
        report::unhandled("observer", &err);
    }

    /// Receives the terminal completion.
    fn complete(&mut self) {}
}

impl<T, O> Observer<T> for Box<O>
where
    O: Observer<T> + ?Sized,
{
    fn next(&mut self, value: T) {
        (**self).next(value)
    }

    fn error(&mut self, err: StreamError) {
        (**self).error(err)
    }

    fn complete(&mut self) {
        (**self).complete()
    }
}

type NextFn<T> = Box<dyn FnMut(T) + Send>;
type ErrorFn = Box<dyn FnMut(StreamError) + Send>;
type CompleteFn = Box<dyn FnMut() + Send>;

/// Closure-backed observer.
///
/// Missing callbacks behave like the [`Observer`] defaults: a missing error
/// callback makes errors unhandled, a missing complete callback ignores completion.
///
/// ## Example
/// ```rust
/// use rill::{FnObserver, from_iter};
///
/// let obs = FnObserver::new(|v: i32| println!("{v}"))
///     .on_error(|e| eprintln!("{e}"))
///     .on_complete(|| println!("done"));
/// from_iter(vec![1, 2, 3]).subscribe(obs);
/// ```
pub struct FnObserver<T> {
    next: Option<NextFn<T>>,
    error: Option<ErrorFn>,
    complete: Option<CompleteFn>,
}

impl<T: 'static> FnObserver<T> {
    /// Observer with a `next` callback only.
    pub fn new<N>(next: N) -> Self
    where
        N: FnMut(T) + Send + 'static,
    {
        Self {
            next: Some(Box::new(next)),
            error: None,
            complete: None,
        }
    }

    /// Observer that ignores values (useful for terminal-only consumers).
    pub fn ignore() -> Self {
        Self {
            next: None,
            error: None,
            complete: None,
        }
    }

    /// Sets the error callback.
    pub fn on_error<E>(mut self, error: E) -> Self
    where
        E: FnMut(StreamError) + Send + 'static,
    {
        self.error = Some(Box::new(error));
        self
    }

    /// Sets the completion callback.
    pub fn on_complete<C>(mut self, complete: C) -> Self
    where
        C: FnMut() + Send + 'static,
    {
        self.complete = Some(Box::new(complete));
        self
    }
}

impl<T: Send + 'static> Observer<T> for FnObserver<T> {
    fn next(&mut self, value: T) {
        if let Some(f) = self.next.as_mut() {
            f(value);
        }
    }

    fn error(&mut self, err: StreamError) {
        match self.error.as_mut() {
            Some(f) => f(err),
            None => report::unhandled("observer", &err),
        }
    }

    fn complete(&mut self) {
        if let Some(f) = self.complete.as_mut() {
            f();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_fn_observer_dispatches_each_channel() {
        let nexts = Arc::new(AtomicUsize::new(0));
        let errs = Arc::new(AtomicUsize::new(0));
        let dones = Arc::new(AtomicUsize::new(0));

        let (n, e, d) = (nexts.clone(), errs.clone(), dones.clone());
        let mut obs = FnObserver::new(move |v: usize| {
            n.fetch_add(v, Ordering::SeqCst);
        })
        .on_error(move |_| {
            e.fetch_add(1, Ordering::SeqCst);
        })
        .on_complete(move || {
            d.fetch_add(1, Ordering::SeqCst);
        });

        obs.next(2);
        obs.next(3);
        obs.error(StreamError::fail("x"));
        obs.complete();

        assert_eq!(nexts.load(Ordering::SeqCst), 5);
        assert_eq!(errs.load(Ordering::SeqCst), 1);
        assert_eq!(dones.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_missing_error_handler_reports_unhandled() {
        let mut rx = crate::events::bus().subscribe();
        let mut obs = FnObserver::<u8>::ignore();
        obs.error(StreamError::fail("observer-unhandled-marker"));

        let mut seen = false;
        while let Ok(ev) = rx.try_recv() {
            if ev.reason.as_deref() == Some("stream failed: observer-unhandled-marker") {
                seen = true;
            }
        }
        assert!(seen);
    }
}
