//! # Deterministic virtual time.
//!
//! [`VirtualTimeScheduler`] never touches a real clock. Scheduled actions go
//! into a priority queue keyed by `(due frame, insertion index)` and only run when
//! the test calls [`flush`](VirtualTimeScheduler::flush) or one of the `advance`
//! methods. One frame is one millisecond; a delay that ends inside a frame is
//! due at the end of that frame.
//!
//! ```text
//! schedule(3ms) ─┐
//! schedule(1ms) ─┼─► heap ─► flush(): pop (1, #1) frame=1 run
//! schedule(1ms) ─┘                    pop (1, #2) frame=1 run
//!                                     pop (3, #0) frame=3 run
//! ```
//!
//! ## Rules
//! - Equal due frames run in insertion order.
//! - Work scheduled while flushing joins the same flush if due within the limit.
//! - Nothing due after `max_frames` ever runs.
//! - A panicking action releases every queued action, then the panic resumes in
//!   the flushing caller.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::panic::resume_unwind;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::core::{Notification, Source, Teardown};
use crate::multicast::Subject;
use crate::testing::TestObserver;

use super::{Action, Dispatch, Scheduler, SchedulerExt, Work, downgrade};

struct Entry {
    due: u64,
    index: u64,
    generation: u64,
    action: Action,
}

impl PartialEq for Entry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.index == other.index
    }
}

impl Eq for Entry {}

impl PartialOrd for Entry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Entry {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.due, self.index).cmp(&(other.due, other.index))
    }
}

struct State {
    frame: u64,
    max_frames: u64,
    index: u64,
    flushing: bool,
    queue: BinaryHeap<Reverse<Entry>>,
}

struct Core {
    state: Mutex<State>,
}

/// Frames a delay spans; a partial frame counts as a whole one.
fn delay_frames(d: Duration) -> u64 {
    u64::try_from(d.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX)
}

/// Whole frames elapsed in `d`.
fn elapsed_frames(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

impl Dispatch for Core {
    fn now(&self) -> Duration {
        Duration::from_millis(self.state.lock().frame)
    }

    fn enqueue(&self, action: Action, delay: Duration, generation: u64) {
        let mut st = self.state.lock();
        st.index += 1;
        let entry = Entry {
            due: st.frame.saturating_add(delay_frames(delay)),
            index: st.index,
            generation,
            action,
        };
        st.queue.push(Reverse(entry));
    }
}

/// Scheduler whose clock only moves when the test tells it to.
#[derive(Clone)]
pub struct VirtualTimeScheduler {
    core: Arc<Core>,
}

impl Default for VirtualTimeScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualTimeScheduler {
    /// Creates a scheduler at frame 0 with no frame limit.
    pub fn new() -> Self {
        Self::with_max_frames(u64::MAX)
    }

    /// Creates a scheduler that never runs work due after `max_frames`.
    pub fn with_max_frames(max_frames: u64) -> Self {
        Self {
            core: Arc::new(Core {
                state: Mutex::new(State {
                    frame: 0,
                    max_frames,
                    index: 0,
                    flushing: false,
                    queue: BinaryHeap::new(),
                }),
            }),
        }
    }

    /// Current virtual frame.
    pub fn frame(&self) -> u64 {
        self.core.state.lock().frame
    }

    /// Changes the frame limit used by [`flush`](Self::flush).
    pub fn set_max_frames(&self, max_frames: u64) {
        self.core.state.lock().max_frames = max_frames;
    }

    /// Number of queued entries, stale ones included.
    pub fn pending(&self) -> usize {
        self.core.state.lock().queue.len()
    }

    /// Runs every queued action due within `max_frames`, in due order.
    pub fn flush(&self) {
        let limit = self.core.state.lock().max_frames;
        self.run_until(limit);
    }

    /// Runs everything due up to `frame`, then moves the clock to `frame`.
    pub fn advance_to(&self, frame: u64) {
        let limit = frame.min(self.core.state.lock().max_frames);
        self.run_until(limit);
        let mut st = self.core.state.lock();
        st.frame = st.frame.max(frame);
    }

    /// Advances the clock by `by`, running everything that becomes due.
    pub fn advance_by(&self, by: Duration) {
        let target = self.frame().saturating_add(elapsed_frames(by));
        self.advance_to(target);
    }

    fn run_until(&self, limit: u64) {
        {
            let mut st = self.core.state.lock();
            if st.flushing {
                return;
            }
            st.flushing = true;
        }
        loop {
            let entry = {
                let mut st = self.core.state.lock();
                let due_now = matches!(st.queue.peek(), Some(Reverse(e)) if e.due <= limit);
                if !due_now {
                    st.flushing = false;
                    break;
                }
                let Some(Reverse(entry)) = st.queue.pop() else {
                    st.flushing = false;
                    break;
                };
                st.frame = st.frame.max(entry.due);
                entry
            };
            if let Err(panic) = entry.action.run(entry.generation) {
                let abandoned: Vec<Entry> = {
                    let mut st = self.core.state.lock();
                    st.flushing = false;
                    st.queue.drain().map(|Reverse(e)| e).collect()
                };
                for e in abandoned {
                    let _ = e.action.release();
                }
                resume_unwind(panic);
            }
        }
    }

    /// Source that replays `messages` relative to each subscription's start.
    ///
    /// `messages` pairs a frame offset with the notification to deliver.
    pub fn create_cold<T>(&self, messages: Vec<(u64, Notification<T>)>) -> Source<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let scheduler = self.clone();
        Source::new(move |subscriber| {
            for (frame, notification) in messages.iter().cloned() {
                let mut target = subscriber.clone();
                let mut notification = Some(notification);
                let action = scheduler.schedule_fn(Duration::from_millis(frame), move |_| {
                    if let Some(n) = notification.take() {
                        n.accept(&mut target);
                    }
                });
                subscriber.add(action);
            }
            Ok(Teardown::None)
        })
    }

    /// Subject that emits `messages` at absolute frames, whoever is listening.
    pub fn create_hot<T>(&self, messages: Vec<(u64, Notification<T>)>) -> Subject<T>
    where
        T: Clone + Send + 'static,
    {
        let subject = Subject::new();
        let now = self.frame();
        for (frame, notification) in messages {
            let target = subject.clone();
            let mut notification = Some(notification);
            let delay = Duration::from_millis(frame.saturating_sub(now));
            self.schedule_fn(delay, move |_| match notification.take() {
                Some(Notification::Next(v)) => target.next(v),
                Some(Notification::Error(e)) => target.error(e),
                Some(Notification::Complete) => target.complete(),
                None => {}
            });
        }
        subject
    }

    /// Observer that stamps every notification with the current frame.
    pub fn observer<T: Send + 'static>(&self) -> TestObserver<T> {
        TestObserver::with_clock(self.clone())
    }
}

impl Scheduler for VirtualTimeScheduler {
    fn now(&self) -> Duration {
        self.core.now()
    }

    fn schedule(&self, delay: Duration, work: Work) -> Action {
        let action = Action::new(downgrade(&self.core), work);
        action.enqueue(delay);
        action
    }
}
