//! # Trampolining scheduler.
//!
//! [`QueueScheduler`] runs work on the calling thread. The first `schedule` call
//! becomes the drainer: it runs its action right away, and any work scheduled
//! while draining is queued and run afterwards, in FIFO order. Recursion through
//! the scheduler therefore becomes iteration.
//!
//! ## Rules
//! - Zero-delay work scheduled outside a drain runs before `schedule` returns.
//! - Delayed work never blocks: it waits on a tokio timer of the current runtime
//!   and joins the trampoline when due, on the thread that fired the timer.
//! - Delayed work scheduled outside a runtime is released and reported as
//!   unhandled [`RuntimeError::NoRuntime`].
//! - A panicking action is released and reported; draining continues.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::error::{RuntimeError, StreamError};
use crate::events::report;

use super::{Action, Dispatch, Scheduler, Work, downgrade, wall_clock};

#[derive(Default)]
struct State {
    draining: bool,
    queue: VecDeque<(Action, u64)>,
}

#[derive(Default)]
struct Core {
    state: Arc<Mutex<State>>,
}

/// Queues a due action and drains if nobody else is draining.
fn push(state: &Mutex<State>, action: Action, generation: u64) {
    let start = {
        let mut st = state.lock();
        st.queue.push_back((action, generation));
        !std::mem::replace(&mut st.draining, true)
    };
    if start {
        drain(state);
    }
}

fn drain(state: &Mutex<State>) {
    loop {
        let (action, generation) = {
            let mut st = state.lock();
            match st.queue.pop_front() {
                Some(entry) => entry,
                None => {
                    st.draining = false;
                    return;
                }
            }
        };
        if let Err(panic) = action.run(generation) {
            report::action_panicked("queue", &StreamError::from_panic(panic));
        }
    }
}

impl Dispatch for Core {
    fn now(&self) -> Duration {
        wall_clock()
    }

    fn enqueue(&self, action: Action, delay: Duration, generation: u64) {
        if delay.is_zero() {
            push(&self.state, action, generation);
            return;
        }
        let Ok(handle) = Handle::try_current() else {
            let _ = action.release();
            report::unhandled(
                "queue",
                &StreamError::custom(RuntimeError::NoRuntime { scheduler: "queue" }),
            );
            return;
        };
        let token = CancellationToken::new();
        action.set_timer(token.clone());
        let state = Arc::clone(&self.state);
        handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => push(&state, action.clone(), generation),
            }
        });
    }
}

/// Immediate, trampolined scheduler.
#[derive(Clone, Default)]
pub struct QueueScheduler {
    core: Arc<Core>,
}

impl QueueScheduler {
    /// Creates a scheduler with its own queue.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Scheduler for QueueScheduler {
    fn now(&self) -> Duration {
        wall_clock()
    }

    fn schedule(&self, delay: Duration, work: Work) -> Action {
        let action = Action::new(downgrade(&self.core), work);
        action.enqueue(delay);
        action
    }
}
