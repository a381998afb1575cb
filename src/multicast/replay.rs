//! Subject with a replay buffer.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::Scheduler;

use super::hub::{Hub, Memory, subject_surface};

/// Subject that replays recent values to every new subscriber, then goes live.
///
/// History is bounded by a count and optionally by a trailing time window
/// measured on an injected scheduler. Late subscribers to a terminated subject
/// receive the buffer followed by the terminal notification.
#[derive(Clone)]
pub struct ReplaySubject<T> {
    hub: Hub<T>,
}

impl<T: Clone + Send + 'static> ReplaySubject<T> {
    /// Keeps the last `size` values.
    pub fn new(size: usize) -> Self {
        Self {
            hub: Hub::new(Memory::Replay {
                buffer: VecDeque::new(),
                size,
                window: None,
                clock: None,
            }),
        }
    }

    /// Keeps every value.
    pub fn unbounded() -> Self {
        Self::new(usize::MAX)
    }

    /// Keeps at most `size` values, none older than `window` on `clock`.
    pub fn with_window<S: Scheduler>(size: usize, window: Duration, clock: S) -> Self {
        Self {
            hub: Hub::new(Memory::Replay {
                buffer: VecDeque::new(),
                size,
                window: Some(window),
                clock: Some(Arc::new(clock)),
            }),
        }
    }
}

subject_surface!(ReplaySubject);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::scheduler::VirtualTimeScheduler;
    use crate::testing::TestObserver;

    #[test]
    fn test_replays_last_n_then_goes_live() {
        let subject = ReplaySubject::new(2);
        for v in 1..=3 {
            subject.next(v);
        }
        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        subject.next(4);
        assert_eq!(obs.values(), vec![2, 3, 4]);
    }

    #[test]
    fn test_late_subscriber_after_error_gets_buffer_then_error() {
        let subject = ReplaySubject::unbounded();
        subject.next('x');
        subject.error(StreamError::fail("done"));

        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        assert_eq!(obs.values(), vec!['x']);
        assert!(obs.error().is_some());
    }

    #[test]
    fn test_replay_precedes_values_emitted_during_subscribe() {
        use parking_lot::Mutex;
        use std::sync::mpsc;

        let subject = ReplaySubject::new(10);
        subject.next(1);
        subject.next(2);

        let (entered_tx, entered_rx) = mpsc::channel();
        let (go_tx, go_rx) = mpsc::channel::<()>();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let (sink, late) = (seen.clone(), subject.clone());
        let worker = std::thread::spawn(move || {
            late.subscribe(crate::FnObserver::new(move |v: i32| {
                if v == 1 {
                    entered_tx.send(()).unwrap();
                    go_rx.recv().unwrap();
                }
                sink.lock().push(v);
            }));
        });

        entered_rx.recv().unwrap();
        subject.next(99);
        go_tx.send(()).unwrap();
        worker.join().unwrap();

        assert_eq!(*seen.lock(), vec![1, 2, 99]);
    }

    #[test]
    fn test_window_drops_expired_values() {
        let clock = VirtualTimeScheduler::new();
        let subject = ReplaySubject::with_window(10, Duration::from_millis(5), clock.clone());
        subject.next(1);
        clock.advance_to(3);
        subject.next(2);
        clock.advance_to(6);

        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        assert_eq!(obs.values(), vec![2]);
    }
}
