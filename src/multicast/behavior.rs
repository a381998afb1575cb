//! Subject holding a current value.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::StreamError;

use super::hub::{Hub, Memory, subject_surface};

/// Subject that always has a current value.
///
/// New subscribers immediately receive the current value. After an error,
/// [`get_value`](Self::get_value) returns that error; after release it returns
/// [`StreamError::ObjectUnsubscribed`].
#[derive(Clone)]
pub struct BehaviorSubject<T> {
    hub: Hub<T>,
    current: Arc<Mutex<T>>,
}

impl<T: Clone + Send + 'static> BehaviorSubject<T> {
    /// Creates a subject seeded with `initial`.
    pub fn new(initial: T) -> Self {
        let current = Arc::new(Mutex::new(initial));
        Self {
            hub: Hub::new(Memory::Behavior(Arc::clone(&current))),
            current,
        }
    }

    /// Current value, regardless of terminal state.
    pub fn value(&self) -> T {
        self.current.lock().clone()
    }

    /// Current value, or the reason there is no meaningful one.
    pub fn get_value(&self) -> Result<T, StreamError> {
        if let Some(err) = self.hub.thrown_error() {
            return Err(err);
        }
        if self.hub.is_closed() {
            return Err(StreamError::ObjectUnsubscribed);
        }
        Ok(self.value())
    }
}

subject_surface!(BehaviorSubject);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestObserver;

    #[test]
    fn test_new_subscriber_gets_current_value() {
        let subject = BehaviorSubject::new(0);
        let first = TestObserver::new();
        subject.subscribe(first.clone());
        subject.next(1);

        let second = TestObserver::new();
        subject.subscribe(second.clone());
        subject.next(2);

        assert_eq!(first.values(), vec![0, 1, 2]);
        assert_eq!(second.values(), vec![1, 2]);
        assert_eq!(subject.value(), 2);
    }

    #[test]
    fn test_get_value_reports_error_and_release() {
        let errored = BehaviorSubject::new(1);
        errored.error(StreamError::fail("nope"));
        assert!(matches!(errored.get_value(), Err(StreamError::Fail { .. })));

        let released = BehaviorSubject::new(1);
        released.release();
        assert!(matches!(released.get_value(), Err(StreamError::ObjectUnsubscribed)));
        assert_eq!(released.value(), 1);
    }

    #[test]
    fn test_completed_subject_emits_only_completion() {
        let subject = BehaviorSubject::new(7);
        subject.complete();
        let obs = TestObserver::new();
        subject.subscribe(obs.clone());
        assert!(obs.values().is_empty());
        assert!(obs.is_completed());
    }

    #[test]
    fn test_clones_share_current_value() {
        let subject = BehaviorSubject::new(String::from("seed"));
        let handle = subject.clone();
        subject.next(String::from("live"));
        assert_eq!(handle.value(), "live");
        assert_eq!(handle.get_value().ok().as_deref(), Some("live"));
    }
}
