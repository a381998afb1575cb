//! Synchronous sources.

use std::panic::{AssertUnwindSafe, catch_unwind};

use crate::core::{Source, Teardown};
use crate::error::StreamError;

/// Emits `value` then completes.
pub fn of<T>(value: T) -> Source<T>
where
    T: Clone + Send + Sync + 'static,
{
    Source::new(move |s| {
        s.next(value.clone());
        s.complete();
        Ok(Teardown::None)
    })
}

/// Emits every item of `items` then completes.
///
/// Iteration stops early once the subscriber is released.
pub fn from_iter<I>(items: I) -> Source<I::Item>
where
    I: IntoIterator + Clone + Send + Sync + 'static,
    I::Item: Send + 'static,
{
    Source::new(move |s| {
        for item in items.clone() {
            if s.is_stopped() {
                return Ok(Teardown::None);
            }
            s.next(item);
        }
        s.complete();
        Ok(Teardown::None)
    })
}

/// Completes immediately.
pub fn empty<T: Send + 'static>() -> Source<T> {
    Source::new(|s| {
        s.complete();
        Ok(Teardown::None)
    })
}

/// Never emits and never terminates.
pub fn never<T: Send + 'static>() -> Source<T> {
    Source::new(|_| Ok(Teardown::None))
}

/// Errors immediately with `err`.
pub fn throw_error<T: Send + 'static>(err: StreamError) -> Source<T> {
    Source::new(move |_| Err(err.clone()))
}

/// Builds the source lazily, once per subscription.
///
/// A factory that returns `Err` or panics errors that subscription.
pub fn defer<T, F>(factory: F) -> Source<T>
where
    T: Send + 'static,
    F: Fn() -> Result<Source<T>, StreamError> + Send + Sync + 'static,
{
    Source::new(move |s| {
        let built = catch_unwind(AssertUnwindSafe(&factory))
            .map_err(StreamError::from_panic)
            .and_then(|r| r)?;
        built.subscribe_with(s);
        Ok(Teardown::None)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestObserver;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_of_and_empty() {
        let one = TestObserver::new();
        of(42).subscribe(one.clone());
        assert_eq!(one.values(), vec![42]);
        assert!(one.is_completed());

        let none = TestObserver::<u8>::new();
        empty().subscribe(none.clone());
        assert!(none.values().is_empty());
        assert!(none.is_completed());
    }

    #[test]
    fn test_from_iter_stops_when_released() {
        let obs = TestObserver::new();
        from_iter(0..1_000_000u64).take(3).subscribe(obs.clone());
        assert_eq!(obs.values(), vec![0, 1, 2]);
    }

    #[test]
    fn test_never_stays_open() {
        let obs = TestObserver::<u8>::new();
        let handle = never().subscribe(obs.clone());
        assert!(!handle.is_closed());
        assert_eq!(obs.terminal_count(), 0);
    }

    #[test]
    fn test_throw_error_delivers_error() {
        let obs = TestObserver::<u8>::new();
        throw_error(StreamError::fail("nope")).subscribe(obs.clone());
        assert_eq!(obs.error().map(|e| e.as_label()), Some("stream_failed"));
    }

    #[test]
    fn test_defer_runs_factory_per_subscription() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        let src = defer(move || Ok(of(c.fetch_add(1, Ordering::SeqCst))));
        let a = TestObserver::new();
        let b = TestObserver::new();
        src.subscribe(a.clone());
        src.subscribe(b.clone());
        assert_eq!(a.values(), vec![0]);
        assert_eq!(b.values(), vec![1]);
    }

    #[test]
    fn test_defer_factory_error_is_routed() {
        let obs = TestObserver::<u8>::new();
        defer(|| Err(StreamError::fail("factory"))).subscribe(obs.clone());
        assert!(obs.error().is_some());
    }
}
