//! Plain multicast subject.

use super::hub::{Hub, Memory, subject_surface};

/// Hot source that fans every emission out to its current observers.
///
/// Late subscribers to a terminated subject only receive the terminal
/// notification.
///
/// # Example
/// ```
/// use rill::Subject;
///
/// let subject = Subject::new();
/// subject.subscribe(rill::FnObserver::new(|v: i32| println!("a: {v}")));
/// subject.subscribe(rill::FnObserver::new(|v: i32| println!("b: {v}")));
/// subject.next(1);
/// subject.complete();
/// ```
#[derive(Clone)]
pub struct Subject<T> {
    hub: Hub<T>,
}

impl<T: Clone + Send + 'static> Default for Subject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> Subject<T> {
    /// Creates an open subject with no observers.
    pub fn new() -> Self {
        Self {
            hub: Hub::new(Memory::None),
        }
    }
}

subject_surface!(Subject);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamError;
    use crate::testing::TestObserver;

    #[test]
    fn test_fans_out_to_current_observers_only() {
        let subject = Subject::new();
        let early = TestObserver::new();
        subject.subscribe(early.clone());
        subject.next(1);

        let late = TestObserver::new();
        subject.subscribe(late.clone());
        subject.next(2);
        subject.complete();

        assert_eq!(early.values(), vec![1, 2]);
        assert_eq!(late.values(), vec![2]);
        assert!(early.is_completed() && late.is_completed());
        assert_eq!(subject.observer_count(), 0);
    }

    #[test]
    fn test_late_subscriber_gets_recorded_error() {
        let subject = Subject::<u8>::new();
        subject.error(StreamError::fail("boom"));
        let late = TestObserver::new();
        subject.subscribe(late.clone());
        assert_eq!(late.error().map(|e| e.to_string()).as_deref(), Some("stream failed: boom"));
    }

    #[test]
    fn test_emissions_after_terminal_are_rejected() {
        let subject = Subject::new();
        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        subject.complete();
        assert!(matches!(subject.try_next(5), Err(StreamError::AlreadyTerminated)));
        assert!(matches!(
            subject.try_error(StreamError::fail("late")),
            Err(StreamError::AlreadyTerminated)
        ));
        assert!(matches!(subject.try_complete(), Err(StreamError::AlreadyTerminated)));
        assert!(obs.values().is_empty());
        assert_eq!(obs.terminal_count(), 1);
    }

    #[test]
    fn test_late_emission_is_reported_as_unhandled() {
        let mut rx = crate::events::bus().subscribe();
        let subject = Subject::new();
        subject.complete();
        subject.next(1);

        let mut seen = false;
        loop {
            match rx.try_recv() {
                Ok(ev) => {
                    seen |= ev.kind == crate::EventKind::UnhandledError
                        && ev.origin.as_deref() == Some("Subject")
                        && ev.label == Some("already_terminated");
                }
                Err(tokio::sync::broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        assert!(seen);
    }

    #[test]
    fn test_released_subject_rejects_use() {
        let subject = Subject::<u8>::new();
        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        subject.release();

        assert!(matches!(subject.try_next(1), Err(StreamError::ObjectUnsubscribed)));
        assert!(obs.values().is_empty());

        let late = TestObserver::new();
        subject.subscribe(late.clone());
        assert_eq!(late.error().map(|e| e.as_label()), Some("object_unsubscribed"));
    }

    #[test]
    fn test_unsubscribe_removes_observer() {
        let subject = Subject::new();
        let obs = TestObserver::new();
        let handle = subject.subscribe(obs.clone());
        assert_eq!(subject.observer_count(), 1);
        handle.release().unwrap();
        assert_eq!(subject.observer_count(), 0);
        subject.next(3);
        assert!(obs.values().is_empty());
    }

    #[test]
    fn test_observer_may_unsubscribe_another_during_fan_out() {
        let subject = Subject::new();
        let second = TestObserver::new();
        let slot = std::sync::Arc::new(parking_lot::Mutex::new(None::<crate::Subscription>));
        let s = slot.clone();
        subject.subscribe(crate::FnObserver::new(move |_: i32| {
            if let Some(h) = s.lock().take() {
                h.release().unwrap();
            }
        }));
        *slot.lock() = Some(subject.subscribe(second.clone()));

        subject.next(1);
        subject.next(2);
        assert_eq!(second.values(), Vec::<i32>::new());
    }

    #[test]
    fn test_subject_as_observer_of_a_source() {
        let subject = Subject::new();
        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        crate::from_iter(vec![1, 2, 3]).subscribe(subject.clone());
        assert_eq!(obs.values(), vec![1, 2, 3]);
        assert!(obs.is_completed());
    }
}
