//! # Scheduled unit of work.
//!
//! An [`Action`] *is* a cancellation node: releasing it prevents any future run
//! and cancels its platform timer. Schedulers hand actions to their queue through
//! the crate-private [`Dispatch`] seam.
//!
//! ## Lifecycle
//! ```text
//! unscheduled ──enqueue──► pending ──due──► executing ──┬─► pending   (rescheduled)
//!                             ▲                         └─► released  (done)
//!                             └──── reschedule(delay) ─────┘
//! ```
//!
//! ## Rules
//! - A run never starts before its due time; the queue only pops due entries.
//! - `reschedule` keeps the identity of the action. Called from inside its own
//!   work, the new run is queued once the current run returns.
//! - Every enqueue bumps a generation counter; queue entries carrying an older
//!   generation are stale and skip silently.
//! - An action that finishes a run without rescheduling releases itself.
//! - A panicking run releases the action; the scheduler decides how to report it.

use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::core::{Subscription, Teardown};
use crate::error::StreamError;

/// Work run by an [`Action`]; receives the action itself so it can reschedule.
pub type Work = Box<dyn FnMut(&Action) + Send>;

/// Queue side of a scheduler.
pub(crate) trait Dispatch: Send + Sync {
    /// Current time of the scheduler clock.
    fn now(&self) -> Duration;

    /// Queues `action` to run after `delay`; stale generations must be skipped.
    fn enqueue(&self, action: Action, delay: Duration, generation: u64);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Unscheduled,
    Pending,
    Executing,
}

struct State {
    work: Option<Work>,
    phase: Phase,
    generation: u64,
    delay: Duration,
    due: Duration,
    /// Reschedule requested while executing.
    requested: Option<Duration>,
    /// Platform timer handle of the pending run.
    timer: Option<CancellationToken>,
}

struct Inner {
    subscription: Subscription,
    dispatch: Weak<dyn Dispatch>,
    state: Mutex<State>,
}

/// Scheduled unit of work and its cancellation handle.
#[derive(Clone)]
pub struct Action {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let st = self.inner.state.lock();
        f.debug_struct("Action")
            .field("phase", &st.phase)
            .field("delay", &st.delay)
            .field("due", &st.due)
            .field("closed", &self.inner.subscription.is_closed())
            .finish()
    }
}

impl Action {
    pub(crate) fn new(dispatch: Weak<dyn Dispatch>, work: Work) -> Self {
        let inner = Arc::new(Inner {
            subscription: Subscription::new(),
            dispatch,
            state: Mutex::new(State {
                work: Some(work),
                phase: Phase::Unscheduled,
                generation: 0,
                delay: Duration::ZERO,
                due: Duration::ZERO,
                requested: None,
                timer: None,
            }),
        });
        let weak = Arc::downgrade(&inner);
        inner.subscription.add(Teardown::from_fn(move || {
            if let Some(inner) = weak.upgrade() {
                let (work, timer) = {
                    let mut st = inner.state.lock();
                    (st.work.take(), st.timer.take())
                };
                if let Some(t) = timer {
                    t.cancel();
                }
                drop(work);
            }
        }));
        Self { inner }
    }

    /// Schedules the next run of this action after `delay`.
    ///
    /// No-op once the action is released.
    pub fn reschedule(&self, delay: Duration) {
        if self.is_closed() {
            return;
        }
        {
            let mut st = self.inner.state.lock();
            if st.phase == Phase::Executing {
                st.requested = Some(delay);
                return;
            }
        }
        self.enqueue(delay);
    }

    /// Cancels every future run.
    pub fn release(&self) -> Result<(), StreamError> {
        self.inner.subscription.release()
    }

    /// True once released.
    pub fn is_closed(&self) -> bool {
        self.inner.subscription.is_closed()
    }

    /// Cancellation node of this action, for attaching to a release tree.
    pub fn subscription(&self) -> Subscription {
        self.inner.subscription.clone()
    }

    /// Delay of the most recent scheduling request.
    pub fn delay(&self) -> Duration {
        self.inner.state.lock().delay
    }

    /// Scheduler time at which the pending run becomes due.
    pub fn due(&self) -> Duration {
        self.inner.state.lock().due
    }

    pub(crate) fn enqueue(&self, delay: Duration) {
        let Some(dispatch) = self.inner.dispatch.upgrade() else {
            let _ = self.release();
            return;
        };
        let (generation, stale) = {
            let mut st = self.inner.state.lock();
            st.generation = st.generation.wrapping_add(1);
            st.phase = Phase::Pending;
            st.delay = delay;
            st.due = dispatch.now().saturating_add(delay);
            (st.generation, st.timer.take())
        };
        if let Some(t) = stale {
            t.cancel();
        }
        dispatch.enqueue(self.clone(), delay, generation);
    }

    pub(crate) fn set_timer(&self, token: CancellationToken) {
        let mut st = self.inner.state.lock();
        if self.inner.subscription.is_closed() {
            drop(st);
            token.cancel();
            return;
        }
        st.timer = Some(token);
    }

    /// Runs the pending work if `generation` is current.
    ///
    /// Returns the panic payload when the work panicked.
    pub(crate) fn run(&self, generation: u64) -> Result<(), Box<dyn Any + Send>> {
        let mut work = {
            let mut st = self.inner.state.lock();
            if self.inner.subscription.is_closed()
                || st.generation != generation
                || st.phase != Phase::Pending
            {
                return Ok(());
            }
            let Some(work) = st.work.take() else {
                return Ok(());
            };
            st.phase = Phase::Executing;
            st.requested = None;
            st.timer = None;
            work
        };

        let outcome = catch_unwind(AssertUnwindSafe(|| work(self)));

        let requested = {
            let mut st = self.inner.state.lock();
            st.phase = Phase::Unscheduled;
            if outcome.is_ok() && !self.inner.subscription.is_closed() {
                st.work = Some(work);
                st.requested.take()
            } else {
                drop(st);
                drop(work);
                None
            }
        };

        match (outcome, requested) {
            (Err(panic), _) => {
                let _ = self.release();
                Err(panic)
            }
            (Ok(()), Some(delay)) => {
                self.enqueue(delay);
                Ok(())
            }
            (Ok(()), None) => {
                let _ = self.release();
                Ok(())
            }
        }
    }
}

impl From<Action> for Teardown {
    fn from(a: Action) -> Self {
        Teardown::Subscription(a.inner.subscription.clone())
    }
}

impl From<&Action> for Teardown {
    fn from(a: &Action) -> Self {
        Teardown::Subscription(a.inner.subscription.clone())
    }
}

pub(crate) fn downgrade<D: Dispatch + 'static>(core: &Arc<D>) -> Weak<dyn Dispatch> {
    let weak: Weak<D> = Arc::downgrade(core);
    weak
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Records enqueues without running anything.
    #[derive(Default)]
    struct Manual {
        queued: Mutex<Vec<(Action, Duration, u64)>>,
    }

    impl Dispatch for Manual {
        fn now(&self) -> Duration {
            Duration::ZERO
        }

        fn enqueue(&self, action: Action, delay: Duration, generation: u64) {
            self.queued.lock().push((action, delay, generation));
        }
    }

    fn pop(m: &Manual) -> (Action, Duration, u64) {
        m.queued.lock().remove(0)
    }

    #[test]
    fn test_run_once_then_release() {
        let core = Arc::new(Manual::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let action = Action::new(
            downgrade(&core),
            Box::new(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        action.enqueue(Duration::from_millis(5));
        let (a, delay, generation) = pop(&core);
        assert_eq!(delay, Duration::from_millis(5));

        a.run(generation).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert!(action.is_closed());
    }

    #[test]
    fn test_reschedule_from_work_keeps_identity() {
        let core = Arc::new(Manual::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let action = Action::new(
            downgrade(&core),
            Box::new(move |me: &Action| {
                if r.fetch_add(1, Ordering::SeqCst) < 2 {
                    me.reschedule(Duration::from_millis(1));
                }
            }),
        );
        action.enqueue(Duration::ZERO);

        for _ in 0..3 {
            let (a, _, generation) = pop(&core);
            assert!(Arc::ptr_eq(&a.inner, &action.inner));
            a.run(generation).unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
        assert!(core.queued.lock().is_empty());
        assert!(action.is_closed());
    }

    #[test]
    fn test_stale_generation_is_skipped() {
        let core = Arc::new(Manual::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let action = Action::new(
            downgrade(&core),
            Box::new(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        action.enqueue(Duration::from_millis(10));
        action.reschedule(Duration::from_millis(20));

        let (stale, _, old) = pop(&core);
        let (fresh, delay, new) = pop(&core);
        assert_eq!(delay, Duration::from_millis(20));

        stale.run(old).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        fresh.run(new).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_released_action_never_runs() {
        let core = Arc::new(Manual::default());
        let runs = Arc::new(AtomicUsize::new(0));
        let r = runs.clone();
        let action = Action::new(
            downgrade(&core),
            Box::new(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
            }),
        );
        action.enqueue(Duration::ZERO);
        action.release().unwrap();

        let (a, _, generation) = pop(&core);
        a.run(generation).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_panicking_work_releases_action() {
        let core = Arc::new(Manual::default());
        let action = Action::new(downgrade(&core), Box::new(|_| panic!("work failed")));
        action.enqueue(Duration::ZERO);
        let (a, _, generation) = pop(&core);
        assert!(a.run(generation).is_err());
        assert!(action.is_closed());
    }

    #[test]
    fn test_release_cancels_timer() {
        let core = Arc::new(Manual::default());
        let action = Action::new(downgrade(&core), Box::new(|_| {}));
        action.enqueue(Duration::from_secs(1));
        let token = CancellationToken::new();
        action.set_timer(token.clone());
        action.release().unwrap();
        assert!(token.is_cancelled());
    }
}
