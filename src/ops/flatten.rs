//! # Outer/inner coordination.
//!
//! Every flattening stage projects each outer value into an inner source and
//! merges the inner emissions into one output. What differs is the policy for a
//! new outer value while inners are live:
//!
//! | Mode                   | New outer value while busy                 |
//! |------------------------|--------------------------------------------|
//! | `Merge { concurrent }` | buffered until an inner slot frees up      |
//! | `Switch`               | previous inner released, new one started   |
//! | `Exhaust`              | dropped                                    |
//!
//! `concat_map` is `Merge { concurrent: 1 }`.
//!
//! ## Architecture
//! ```text
//!              outer node ──► Coordinator ──project──► inner source
//!                 │               │                        │
//!    destination ◄┴───────────────┴──── inner node ◄───────┘
//!   (owns outer node and every inner node in its release tree)
//! ```
//!
//! ## Rules
//! - Output completes only when the outer completed, no inner is active and
//!   nothing is buffered.
//! - Any error (outer, inner, or a panicking projection) errors the output at
//!   once; releasing the output releases the outer and every inner.
//! - Inner nodes detach from the destination as they finish, so long-running
//!   streams do not accumulate finished children.

use std::collections::VecDeque;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Observer, Source, Subscriber, Subscription};
use crate::error::StreamError;

/// How new outer values are treated while inner sources are live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Run up to `concurrent` inners at once; buffer the rest.
    Merge {
        /// Maximum number of simultaneously active inners (at least 1).
        concurrent: usize,
    },
    /// Only the latest inner is live.
    Switch,
    /// Ignore outer values while an inner is live.
    Exhaust,
}

type Project<T, R> = dyn Fn(T, usize) -> Source<R> + Send + Sync;

struct Track<T> {
    active: usize,
    outer_done: bool,
    buffer: VecDeque<T>,
    index: usize,
    /// Live inner of `Switch` mode, keyed by its index.
    current: Option<(usize, Subscription)>,
    /// Admitted `Merge` inners waiting for the launching caller.
    launches: VecDeque<(T, usize)>,
    launching: bool,
}

struct Coordinator<T, R> {
    destination: Subscriber<R>,
    project: Arc<Project<T, R>>,
    mode: Mode,
    track: Mutex<Track<T>>,
}

enum Admit<T> {
    Start(T, usize),
    Replace(T, usize, Subscription),
    Hold,
}

impl<T: Send + 'static, R: Send + 'static> Coordinator<T, R> {
    fn on_outer(self: &Arc<Self>, value: T) {
        let admit = {
            let mut tr = self.track.lock();
            match self.mode {
                Mode::Merge { concurrent } if tr.active >= concurrent.max(1) => {
                    tr.buffer.push_back(value);
                    Admit::Hold
                }
                Mode::Exhaust if tr.active > 0 => Admit::Hold,
                Mode::Switch => {
                    let index = tr.index;
                    tr.index += 1;
                    match tr.current.take() {
                        Some((_, previous)) => Admit::Replace(value, index, previous),
                        None => {
                            tr.active += 1;
                            Admit::Start(value, index)
                        }
                    }
                }
                _ => {
                    let index = tr.index;
                    tr.index += 1;
                    tr.active += 1;
                    Admit::Start(value, index)
                }
            }
        };
        match admit {
            Admit::Start(value, index) if matches!(self.mode, Mode::Merge { .. }) => {
                self.launch(value, index)
            }
            Admit::Start(value, index) => self.start(value, index),
            Admit::Replace(value, index, previous) => {
                if let Err(e) = previous.release() {
                    self.destination.error(e);
                    return;
                }
                self.start(value, index);
            }
            Admit::Hold => {}
        }
    }

    fn on_outer_complete(&self) {
        let done = {
            let mut tr = self.track.lock();
            tr.outer_done = true;
            tr.active == 0 && tr.buffer.is_empty()
        };
        if done {
            self.destination.complete();
        }
    }

    /// Starts `Merge` inners one after another from a single stack frame.
    ///
    /// An inner that completes synchronously admits the next buffered value
    /// while its own start is still on the stack; that value is queued here and
    /// started by the loop instead of by recursion.
    fn launch(self: &Arc<Self>, value: T, index: usize) {
        {
            let mut tr = self.track.lock();
            tr.launches.push_back((value, index));
            if std::mem::replace(&mut tr.launching, true) {
                return;
            }
        }
        loop {
            let next = {
                let mut tr = self.track.lock();
                match tr.launches.pop_front() {
                    Some(next) => next,
                    None => {
                        tr.launching = false;
                        return;
                    }
                }
            };
            self.start(next.0, next.1);
        }
    }

    fn start(self: &Arc<Self>, value: T, index: usize) {
        let project = Arc::clone(&self.project);
        let inner = match catch_unwind(AssertUnwindSafe(|| project(value, index))) {
            Ok(inner) => inner,
            Err(panic) => {
                self.destination.error(StreamError::from_panic(panic));
                return;
            }
        };
        let node = Subscriber::chained(
            &self.destination,
            InnerObserver {
                coordinator: Arc::clone(self),
                index,
            },
        );
        if self.mode == Mode::Switch {
            self.track.lock().current = Some((index, node.subscription()));
        }
        inner.subscribe_with(node);
    }

    fn on_inner_complete(self: &Arc<Self>, index: usize) {
        let (next, done) = {
            let mut tr = self.track.lock();
            if self.mode == Mode::Switch {
                if !matches!(tr.current, Some((i, _)) if i == index) {
                    return;
                }
                tr.current = None;
            }
            tr.active = tr.active.saturating_sub(1);
            let next = match tr.buffer.pop_front() {
                Some(value) => {
                    let i = tr.index;
                    tr.index += 1;
                    tr.active += 1;
                    Some((value, i))
                }
                None => None,
            };
            let done = next.is_none() && tr.outer_done && tr.active == 0;
            (next, done)
        };
        if let Some((value, i)) = next {
            self.launch(value, i);
        } else if done {
            self.destination.complete();
        }
    }
}

struct OuterObserver<T, R> {
    coordinator: Arc<Coordinator<T, R>>,
}

impl<T: Send + 'static, R: Send + 'static> Observer<T> for OuterObserver<T, R> {
    fn next(&mut self, value: T) {
        self.coordinator.on_outer(value);
    }

    fn error(&mut self, err: StreamError) {
        self.coordinator.destination.error(err);
    }

    fn complete(&mut self) {
        self.coordinator.on_outer_complete();
    }
}

struct InnerObserver<T, R> {
    coordinator: Arc<Coordinator<T, R>>,
    index: usize,
}

impl<T: Send + 'static, R: Send + 'static> Observer<R> for InnerObserver<T, R> {
    fn next(&mut self, value: R) {
        self.coordinator.destination.next(value);
    }

    fn error(&mut self, err: StreamError) {
        self.coordinator.destination.error(err);
    }

    fn complete(&mut self) {
        self.coordinator.on_inner_complete(self.index);
    }
}

/// Builds the flattening stage for `mode`.
pub fn flatten<T, R, P>(upstream: &Source<T>, mode: Mode, project: P) -> Source<R>
where
    T: Send + 'static,
    R: Send + 'static,
    P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
{
    let project: Arc<Project<T, R>> = Arc::new(project);
    upstream.lift(move |destination: Subscriber<R>, _: &Source<T>| {
        let coordinator = Arc::new(Coordinator {
            destination: destination.clone(),
            project: Arc::clone(&project),
            mode,
            track: Mutex::new(Track {
                active: 0,
                outer_done: false,
                buffer: VecDeque::new(),
                index: 0,
                current: None,
                launches: VecDeque::new(),
                launching: false,
            }),
        });
        Subscriber::chained(&destination, OuterObserver { coordinator })
    })
}

impl<T: Send + 'static> Source<T> {
    /// Projects every value to an inner source and merges all of them.
    pub fn merge_map<R, P>(&self, project: P) -> Source<R>
    where
        R: Send + 'static,
        P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
    {
        flatten(self, Mode::Merge { concurrent: usize::MAX }, project)
    }

    /// Like [`merge_map`](Self::merge_map) with at most `concurrent` live inners.
    pub fn merge_map_concurrent<R, P>(&self, project: P, concurrent: usize) -> Source<R>
    where
        R: Send + 'static,
        P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
    {
        flatten(self, Mode::Merge { concurrent }, project)
    }

    /// Merges inners and combines each inner value with its outer value.
    ///
    /// `combine` receives `(outer, inner, outer_index, inner_index)`.
    pub fn merge_map_with<I, R, P, C>(&self, project: P, combine: C) -> Source<R>
    where
        T: Clone + Sync,
        I: Send + 'static,
        R: Send + 'static,
        P: Fn(T, usize) -> Source<I> + Send + Sync + 'static,
        C: Fn(T, I, usize, usize) -> R + Send + Sync + 'static,
    {
        let combine = Arc::new(combine);
        flatten(self, Mode::Merge { concurrent: usize::MAX }, move |outer: T, i| {
            let combine = Arc::clone(&combine);
            project(outer.clone(), i).map_indexed(move |inner, j| combine(outer.clone(), inner, i, j))
        })
    }

    /// Runs inners one at a time, in outer order.
    pub fn concat_map<R, P>(&self, project: P) -> Source<R>
    where
        R: Send + 'static,
        P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
    {
        flatten(self, Mode::Merge { concurrent: 1 }, project)
    }

    /// Keeps only the inner of the latest outer value.
    pub fn switch_map<R, P>(&self, project: P) -> Source<R>
    where
        R: Send + 'static,
        P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
    {
        flatten(self, Mode::Switch, project)
    }

    /// Ignores outer values while an inner is live.
    pub fn exhaust_map<R, P>(&self, project: P) -> Source<R>
    where
        R: Send + 'static,
        P: Fn(T, usize) -> Source<R> + Send + Sync + 'static,
    {
        flatten(self, Mode::Exhaust, project)
    }
}

impl<T: Send + 'static> Source<Source<T>> {
    /// Flattens a source of sources with at most `concurrent` live inners.
    pub fn merge_all(&self, concurrent: usize) -> Source<T> {
        flatten(self, Mode::Merge { concurrent }, |inner, _| inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Recorded, TestObserver};
    use crate::{Notification, Subject, VirtualTimeScheduler, from_iter, interval, of, timer};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_merge_map_interleaves_inners() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        let s = sched.clone();
        from_iter(vec![10u64, 15])
            .merge_map(move |period, _| interval(ms(period), s.clone()).take(2).map(move |i| (period, i)))
            .subscribe(obs.clone());
        sched.flush();
        assert_eq!(obs.values(), vec![(10, 0), (15, 0), (10, 1), (15, 1)]);
        assert_eq!(obs.recorded().last().map(|r| r.frame), Some(30));
        assert!(obs.is_completed());
    }

    #[test]
    fn test_concat_map_runs_inners_in_order() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        let s = sched.clone();
        from_iter(vec![30u64, 10])
            .concat_map(move |delay, _| timer(ms(delay), s.clone()).map(move |_| delay))
            .subscribe(obs.clone());
        sched.flush();
        assert_eq!(
            obs.recorded(),
            vec![
                Recorded::new(30, Notification::Next(30)),
                Recorded::new(40, Notification::Next(10)),
                Recorded::new(40, Notification::Complete),
            ]
        );
    }

    #[test]
    fn test_concat_map_drains_large_sync_backlog_iteratively() {
        let gate = Subject::<u32>::new();
        let first = gate.clone();
        let obs = TestObserver::new();
        from_iter(0..100_000u32)
            .concat_map(move |v, _| if v == 0 { first.source() } else { of(v) })
            .subscribe(obs.clone());
        assert!(obs.values().is_empty());

        gate.complete();
        let values = obs.values();
        assert_eq!(values.len(), 99_999);
        assert_eq!(values.first(), Some(&1));
        assert_eq!(values.last(), Some(&99_999));
        assert!(obs.is_completed());
    }

    #[test]
    fn test_merge_map_concurrency_limit_buffers_outer() {
        let inners: Vec<Subject<u8>> = (0..3).map(|_| Subject::new()).collect();
        let handles = inners.clone();
        let obs = TestObserver::new();
        from_iter(vec![0usize, 1, 2])
            .merge_map_concurrent(move |i, _| handles[i].source(), 2)
            .subscribe(obs.clone());

        assert_eq!(inners[0].observer_count(), 1);
        assert_eq!(inners[1].observer_count(), 1);
        assert_eq!(inners[2].observer_count(), 0);

        inners[0].complete();
        assert_eq!(inners[2].observer_count(), 1);
        inners[2].next(9);
        inners[1].complete();
        assert!(!obs.is_completed());
        inners[2].complete();
        assert_eq!(obs.values(), vec![9]);
        assert!(obs.is_completed());
    }

    #[test]
    fn test_switch_map_releases_previous_inner() {
        let outer = Subject::new();
        let first = Subject::new();
        let second = Subject::new();
        let pick = vec![first.clone(), second.clone()];
        let obs = TestObserver::new();
        outer
            .source()
            .switch_map(move |i: usize, _| pick[i].source())
            .subscribe(obs.clone());

        outer.next(0);
        first.next("a");
        outer.next(1);
        assert_eq!(first.observer_count(), 0);
        first.next("stale");
        second.next("b");
        outer.complete();
        assert!(!obs.is_completed());
        second.complete();

        assert_eq!(obs.values(), vec!["a", "b"]);
        assert!(obs.is_completed());
    }

    #[test]
    fn test_exhaust_map_ignores_outer_while_busy() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        let s = sched.clone();
        let outer = sched.create_hot(vec![
            (1, Notification::Next(1u64)),
            (3, Notification::Next(2)),
            (12, Notification::Next(3)),
            (30, Notification::Complete),
        ]);
        outer
            .source()
            .exhaust_map(move |v, _| timer(ms(10), s.clone()).map(move |_| v))
            .subscribe(obs.clone());
        sched.flush();
        assert_eq!(obs.values(), vec![1, 3]);
        assert!(obs.is_completed());
    }

    #[test]
    fn test_merge_map_with_combines_indices() {
        let obs = TestObserver::new();
        from_iter(vec!['x', 'y'])
            .merge_map_with(|_, _| from_iter(vec![10, 20]), |o, i, oi, ii| format!("{o}{i}:{oi}{ii}"))
            .subscribe(obs.clone());
        assert_eq!(obs.values(), vec!["x10:00", "x20:01", "y10:10", "y20:11"]);
    }

    #[test]
    fn test_merge_all_flattens_sources() {
        let obs = TestObserver::new();
        from_iter(vec![from_iter(vec![1, 2]), from_iter(vec![3])])
            .merge_all(usize::MAX)
            .subscribe(obs.clone());
        assert_eq!(obs.values(), vec![1, 2, 3]);
        assert!(obs.is_completed());
    }

    #[test]
    fn test_inner_error_fails_fast_and_releases_everything() {
        let released = Arc::new(AtomicBool::new(false));
        let flag = released.clone();
        let outer = Subject::new();
        let slow = Subject::<u8>::new();
        let slow_src = slow.source().finalize(move || flag.store(true, Ordering::SeqCst));
        let obs = TestObserver::new();
        outer
            .source()
            .merge_map(move |fail: bool, _| {
                if fail {
                    crate::throw_error(StreamError::fail("inner"))
                } else {
                    slow_src.clone()
                }
            })
            .subscribe(obs.clone());

        outer.next(false);
        outer.next(true);
        assert!(obs.error().is_some());
        assert!(released.load(Ordering::SeqCst));
        assert_eq!(outer.observer_count(), 0);
    }

    #[test]
    fn test_panicking_projection_errors_output() {
        let obs = TestObserver::<u8>::new();
        from_iter(vec![1u8])
            .merge_map(|_, _| -> Source<u8> { panic!("no inner") })
            .subscribe(obs.clone());
        assert_eq!(obs.error().map(|e| e.as_label()), Some("panicked"));
    }

    #[test]
    fn test_finished_inners_detach_from_destination() {
        let outer = Subject::new();
        let obs = TestObserver::new();
        let handle = outer
            .source()
            .merge_map(|v: u32, _| of(v))
            .subscribe(obs.clone());
        for v in 0..100 {
            outer.next(v);
        }
        assert_eq!(obs.values().len(), 100);
        assert!(handle.child_count() <= 2);
    }
}
