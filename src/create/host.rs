//! # Host adapters.
//!
//! Normalizes futures, async streams and callback registries into sources.
//!
//! ## Rules
//! - Future- and stream-backed sources run on the tokio runtime the subscriber
//!   subscribes from; without one the subscription errors with
//!   [`RuntimeError::NoRuntime`] wrapped in [`StreamError::Custom`].
//! - Releasing the subscription cancels the spawned task through the
//!   subscription's cancellation token.
//! - Listener-backed sources unregister exactly once, on release.

use std::future::Future;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use tokio::runtime::Handle;

use crate::core::{Source, Teardown};
use crate::error::{RuntimeError, StreamError};

/// Callback handed to a host registry by [`from_listener`].
pub type Handler<T> = Arc<dyn Fn(T) + Send + Sync>;

fn runtime(origin: &'static str) -> Result<Handle, StreamError> {
    Handle::try_current()
        .map_err(|_| StreamError::custom(RuntimeError::NoRuntime { scheduler: origin }))
}

/// Source backed by a future built per subscription.
///
/// `Ok(v)` emits `v` then completes; `Err(e)` errors.
pub fn from_future<T, F, Fut>(factory: F) -> Source<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, StreamError>> + Send + 'static,
{
    Source::new(move |s| {
        let handle = runtime("from_future")?;
        let token = s.subscription().token();
        let work = factory();
        let target = s.clone();
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                out = work => match out {
                    Ok(v) => {
                        target.next(v);
                        target.complete();
                    }
                    Err(e) => target.error(e),
                },
            }
        });
        Ok(Teardown::None)
    })
}

/// Source backed by an async stream built per subscription.
///
/// Completes when the stream ends.
pub fn from_stream<T, F, St>(factory: F) -> Source<T>
where
    T: Send + 'static,
    F: Fn() -> St + Send + Sync + 'static,
    St: Stream<Item = T> + Send + 'static,
{
    Source::new(move |s| {
        let handle = runtime("from_stream")?;
        let token = s.subscription().token();
        let stream = factory();
        let target = s.clone();
        handle.spawn(async move {
            let mut stream = std::pin::pin!(stream);
            loop {
                tokio::select! {
                    _ = token.cancelled() => return,
                    item = stream.next() => match item {
                        Some(v) => target.next(v),
                        None => {
                            target.complete();
                            return;
                        }
                    },
                }
            }
        });
        Ok(Teardown::None)
    })
}

/// Source backed by an add/remove listener pair.
///
/// `add` registers the handler and returns a registration token; `remove`
/// receives that token when the subscription is released.
pub fn from_listener<T, H, A, R>(add: A, remove: R) -> Source<T>
where
    T: Send + 'static,
    H: Send + 'static,
    A: Fn(Handler<T>) -> H + Send + Sync + 'static,
    R: Fn(H) + Send + Sync + 'static,
{
    let remove = Arc::new(remove);
    Source::new(move |s| {
        let target = s.clone();
        let handler: Handler<T> = Arc::new(move |v| target.next(v));
        let registration = add(handler);
        let remove = Arc::clone(&remove);
        Ok(Teardown::from_fn(move || remove(registration)))
    })
}
