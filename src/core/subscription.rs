//! # Cancellation tree.
//!
//! [`Subscription`] is a disposable resource with idempotent release that owns
//! child resources, forming a release tree. Every execution, scheduled action and
//! connection in the engine is (or owns) a `Subscription`.
//!
//! ## Architecture
//! ```text
//!              release()
//!                 │
//!   ┌─────────────▼─────────────┐
//!   │ Subscription (closed=true)│──► initial teardown
//!   └──┬──────────┬─────────────┘
//!      ▼          ▼
//!   child #1   child #2 ...        (insertion order, failures aggregated)
//! ```
//!
//! ## Rules
//! - `release()` runs at most once; later calls return `Ok(())`.
//! - Children added after release are released immediately instead of stored.
//! - A child that releases itself early detaches from every parent (no growth).
//! - Adding `self`, an already released node or an already attached child is a no-op.
//! - Teardown failures (`Err` or panic) are collected into one
//!   [`StreamError::Unsubscription`]; remaining teardowns still run.
//! - No lock is held while teardown code runs.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, OnceLock, Weak};

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::StreamError;

type TeardownFn = Box<dyn FnOnce() -> Result<(), StreamError> + Send>;

/// Resource cleanup attached to a [`Subscription`].
pub enum Teardown {
    /// Nothing to clean up.
    None,
    /// Release another node.
    Subscription(Subscription),
    /// Run a closure.
    Fn(TeardownFn),
}

impl Teardown {
    /// Wraps an infallible cleanup closure.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Teardown::Fn(Box::new(move || {
            f();
            Ok(())
        }))
    }

    /// Wraps a cleanup closure that may fail.
    pub fn fallible<F>(f: F) -> Self
    where
        F: FnOnce() -> Result<(), StreamError> + Send + 'static,
    {
        Teardown::Fn(Box::new(f))
    }
}

impl From<Subscription> for Teardown {
    fn from(s: Subscription) -> Self {
        Teardown::Subscription(s)
    }
}

impl From<&Subscription> for Teardown {
    fn from(s: &Subscription) -> Self {
        Teardown::Subscription(s.clone())
    }
}

impl From<()> for Teardown {
    fn from(_: ()) -> Self {
        Teardown::None
    }
}

enum Finalizer {
    Child(Subscription),
    Fn(TeardownFn),
}

#[derive(Default)]
struct State {
    closed: bool,
    initial: Option<TeardownFn>,
    finalizers: Vec<Finalizer>,
    parents: Vec<Weak<Inner>>,
    token: Option<CancellationToken>,
}

struct Inner {
    state: Mutex<State>,
}

/// Node of the cancellation tree.
///
/// Cheap to clone: clones are handles to the same node.
#[derive(Clone)]
pub struct Subscription {
    inner: Arc<Inner>,
}

impl Default for Subscription {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Subscription {
    /// Creates an open node with no teardown.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::default()),
            }),
        }
    }

    /// Creates an open node whose initial teardown is `f`.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let sub = Self::new();
        sub.inner.state.lock().initial = Some(Box::new(move || {
            f();
            Ok(())
        }));
        sub
    }

    /// Shared, already released sentinel.
    ///
    /// Adding it anywhere is a no-op.
    pub fn empty() -> Subscription {
        static EMPTY: OnceLock<Subscription> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                let sub = Subscription::new();
                sub.inner.state.lock().closed = true;
                sub
            })
            .clone()
    }

    /// True once [`release`](Self::release) ran.
    pub fn is_closed(&self) -> bool {
        self.inner.state.lock().closed
    }

    /// True if both handles point to the same node.
    pub fn ptr_eq(&self, other: &Subscription) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns a token cancelled when this node is released.
    ///
    /// Lets async work (tokio tasks, timers) observe cancellation of the tree.
    pub fn token(&self) -> CancellationToken {
        let mut st = self.inner.state.lock();
        if st.closed {
            let token = CancellationToken::new();
            token.cancel();
            return token;
        }
        st.token.get_or_insert_with(CancellationToken::new).clone()
    }

    /// Attaches a teardown to this node.
    ///
    /// - released node: the teardown runs (or the child is released) right away;
    /// - child node: stored once, and removed again when it releases on its own.
    pub fn add(&self, teardown: impl Into<Teardown>) {
        let finalizer = match teardown.into() {
            Teardown::None => return,
            Teardown::Fn(f) => Finalizer::Fn(f),
            Teardown::Subscription(child) => {
                if self.ptr_eq(&child) {
                    return;
                }
                Finalizer::Child(child)
            }
        };

        let rejected = {
            let mut st = self.inner.state.lock();
            if st.closed {
                Some(finalizer)
            } else {
                match finalizer {
                    Finalizer::Child(child) => {
                        if !child.attach_parent(&self.inner) {
                            return;
                        }
                        st.finalizers.push(Finalizer::Child(child));
                    }
                    f @ Finalizer::Fn(_) => st.finalizers.push(f),
                }
                None
            }
        };

        if let Some(finalizer) = rejected {
            let mut errors = Vec::new();
            run_finalizer(finalizer, &mut errors);
            if !errors.is_empty() {
                crate::events::report::teardown_failed(
                    "subscription",
                    &StreamError::Unsubscription { errors },
                );
            }
        }
    }

    /// Detaches a previously added child without releasing it.
    pub fn remove(&self, child: &Subscription) {
        {
            let mut st = self.inner.state.lock();
            st.finalizers
                .retain(|f| !matches!(f, Finalizer::Child(c) if c.ptr_eq(child)));
        }
        child.detach_parent(&self.inner);
    }

    /// Releases this node and everything it owns.
    ///
    /// Idempotent. Returns the aggregated teardown failures, if any.
    pub fn release(&self) -> Result<(), StreamError> {
        let (initial, finalizers, parents, token) = {
            let mut st = self.inner.state.lock();
            if st.closed {
                return Ok(());
            }
            st.closed = true;
            (
                st.initial.take(),
                std::mem::take(&mut st.finalizers),
                std::mem::take(&mut st.parents),
                st.token.take(),
            )
        };

        for parent in parents.iter().filter_map(Weak::upgrade) {
            Subscription { inner: parent }.forget_child(self);
        }

        let mut errors = Vec::new();
        if let Some(f) = initial {
            run_finalizer(Finalizer::Fn(f), &mut errors);
        }
        for finalizer in finalizers {
            run_finalizer(finalizer, &mut errors);
        }
        if let Some(token) = token {
            token.cancel();
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(StreamError::Unsubscription { errors })
        }
    }

    /// Number of children currently stored (test/diagnostic helper).
    pub fn child_count(&self) -> usize {
        self.inner.state.lock().finalizers.len()
    }

    /// Records `parent` as a parent of `self`. Returns `false` if `self` is
    /// closed or already attached to it.
    fn attach_parent(&self, parent: &Arc<Inner>) -> bool {
        let mut st = self.inner.state.lock();
        if st.closed {
            return false;
        }
        let already = st
            .parents
            .iter()
            .any(|p| std::ptr::eq(p.as_ptr(), Arc::as_ptr(parent)));
        if already {
            return false;
        }
        st.parents.push(Arc::downgrade(parent));
        true
    }

    fn detach_parent(&self, parent: &Arc<Inner>) {
        let mut st = self.inner.state.lock();
        st.parents
            .retain(|p| !std::ptr::eq(p.as_ptr(), Arc::as_ptr(parent)));
    }

    fn forget_child(&self, child: &Subscription) {
        let mut st = self.inner.state.lock();
        st.finalizers
            .retain(|f| !matches!(f, Finalizer::Child(c) if c.ptr_eq(child)));
    }
}

fn run_finalizer(finalizer: Finalizer, errors: &mut Vec<StreamError>) {
    let outcome = match finalizer {
        Finalizer::Child(child) => catch_unwind(AssertUnwindSafe(|| child.release())),
        Finalizer::Fn(f) => catch_unwind(AssertUnwindSafe(f)),
    };
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => e.flatten_into(errors),
        Err(panic) => errors.push(StreamError::from_panic(panic)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter() -> (Arc<AtomicUsize>, impl Fn() -> Teardown) {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        (hits, move || {
            let h = h.clone();
            Teardown::from_fn(move || {
                h.fetch_add(1, Ordering::SeqCst);
            })
        })
    }

    #[test]
    fn test_release_is_idempotent() {
        let (hits, make) = counter();
        let sub = Subscription::new();
        sub.add(make());

        assert!(sub.release().is_ok());
        assert!(sub.release().is_ok());
        assert!(sub.is_closed());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_children_release_in_insertion_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let parent = Subscription::new();
        for i in 0..3 {
            let o = order.clone();
            parent.add(Subscription::from_fn(move || o.lock().push(i)));
        }
        parent.release().unwrap();
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }

    #[test]
    fn test_add_after_release_runs_immediately() {
        let (hits, make) = counter();
        let parent = Subscription::new();
        parent.release().unwrap();

        parent.add(make());
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let child = Subscription::new();
        parent.add(child.clone());
        assert!(child.is_closed());
        assert_eq!(parent.child_count(), 0);
    }

    #[test]
    fn test_child_release_detaches_from_parent() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(child.clone());
        assert_eq!(parent.child_count(), 1);

        child.release().unwrap();
        assert_eq!(parent.child_count(), 0);
        assert!(!parent.is_closed());
    }

    #[test]
    fn test_self_empty_and_duplicate_adds_are_noops() {
        let parent = Subscription::new();
        parent.add(parent.clone());
        parent.add(Subscription::empty());
        let child = Subscription::new();
        parent.add(child.clone());
        parent.add(child.clone());
        assert_eq!(parent.child_count(), 1);
        assert!(Subscription::empty().is_closed());
    }

    #[test]
    fn test_remove_detaches_without_release() {
        let parent = Subscription::new();
        let child = Subscription::new();
        parent.add(child.clone());
        parent.remove(&child);
        parent.release().unwrap();
        assert!(!child.is_closed());
    }

    #[test]
    fn test_teardown_failures_are_aggregated() {
        let (hits, make) = counter();
        let sub = Subscription::new();
        sub.add(Teardown::fallible(|| Err(StreamError::fail("first"))));
        sub.add(Teardown::from_fn(|| panic!("second")));
        sub.add(make());

        let err = sub.release().unwrap_err();
        match err {
            StreamError::Unsubscription { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].as_label(), "stream_failed");
                assert_eq!(errors[1].as_label(), "panicked");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_failures_flatten_into_parent() {
        let parent = Subscription::new();
        let child = Subscription::new();
        child.add(Teardown::fallible(|| Err(StreamError::fail("deep"))));
        parent.add(child);

        match parent.release().unwrap_err() {
            StreamError::Unsubscription { errors } => assert_eq!(errors.len(), 1),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_token_cancelled_on_release() {
        let sub = Subscription::new();
        let token = sub.token();
        assert!(!token.is_cancelled());
        sub.release().unwrap();
        assert!(token.is_cancelled());
        assert!(sub.token().is_cancelled());
    }

    #[test]
    fn test_reentrant_release_from_teardown() {
        let sub = Subscription::new();
        let again = sub.clone();
        sub.add(Teardown::from_fn(move || {
            again.release().unwrap();
        }));
        assert!(sub.release().is_ok());
    }
}
