//! # Schedulers: ordered work queues with a clock.
//!
//! A [`Scheduler`] decides *when* work runs; every scheduled unit is an
//! [`Action`] that doubles as its cancellation handle.
//!
//! | Scheduler                   | Zero delay                    | Positive delay                |
//! |-----------------------------|-------------------------------|-------------------------------|
//! | [`QueueScheduler`]          | now, trampolined              | tokio timer, then trampolined |
//! | [`AsapScheduler`]           | batched, next runtime tick    | tokio timer                   |
//! | [`AsyncScheduler`]          | tokio timer                   | tokio timer                   |
//! | [`AnimationFrameScheduler`] | batched, next frame boundary  | tokio timer                   |
//! | [`VirtualTimeScheduler`]    | virtual frame queue           | virtual frame queue           |
//!
//! Schedulers are cheap cloneable handles; clones share one queue.
//!
//! ## Example
//! ```
//! use std::time::Duration;
//! use rill::{QueueScheduler, Scheduler, SchedulerExt};
//!
//! let queue = QueueScheduler::new();
//! queue.schedule_with_state(0u32, Duration::ZERO, |action, count| {
//!     *count += 1;
//!     if *count < 3 {
//!         action.reschedule(Duration::ZERO);
//!     }
//! });
//! ```

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

mod action;
mod queue;
mod task;
mod virtual_time;

pub use action::{Action, Work};
pub use queue::QueueScheduler;
pub use task::{AnimationFrameScheduler, AsapScheduler, AsyncScheduler};
pub use virtual_time::VirtualTimeScheduler;

pub(crate) use action::{Dispatch, downgrade};

/// Ordered work queue with a notion of time.
pub trait Scheduler: Send + Sync + 'static {
    /// Current time of this scheduler's clock.
    fn now(&self) -> Duration;

    /// Runs `work` after `delay`; the returned action cancels it.
    fn schedule(&self, delay: Duration, work: Work) -> Action;
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn now(&self) -> Duration {
        (**self).now()
    }

    fn schedule(&self, delay: Duration, work: Work) -> Action {
        (**self).schedule(delay, work)
    }
}

/// Convenience methods for every [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Schedules a closure without boxing it at the call site.
    fn schedule_fn<F>(&self, delay: Duration, work: F) -> Action
    where
        F: FnMut(&Action) + Send + 'static,
    {
        self.schedule(delay, Box::new(work))
    }

    /// Schedules work that carries `state` across its rescheduled runs.
    fn schedule_with_state<S, F>(&self, state: S, delay: Duration, mut work: F) -> Action
    where
        S: Send + 'static,
        F: FnMut(&Action, &mut S) + Send + 'static,
    {
        let mut state = state;
        self.schedule(delay, Box::new(move |action| work(action, &mut state)))
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

/// Wall-clock time since the Unix epoch.
pub(crate) fn wall_clock() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
}
