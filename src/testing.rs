//! # Recording observers for tests.
//!
//! [`TestObserver`] records every notification it receives. Clones share one
//! recording, so a test keeps a handle while the stream owns another. Built from
//! a [`VirtualTimeScheduler`] (see [`VirtualTimeScheduler::observer`]) it stamps
//! each notification with the virtual frame it arrived at.
//!
//! ```
//! use rill::{Notification, VirtualTimeScheduler, interval};
//! use rill::testing::Recorded;
//! use std::time::Duration;
//!
//! let sched = VirtualTimeScheduler::new();
//! let obs = sched.observer();
//! interval(Duration::from_millis(10), sched.clone()).take(2).subscribe(obs.clone());
//! sched.flush();
//! assert_eq!(
//!     obs.recorded(),
//!     vec![
//!         Recorded::new(10, Notification::Next(0)),
//!         Recorded::new(20, Notification::Next(1)),
//!         Recorded::new(20, Notification::Complete),
//!     ]
//! );
//! ```

use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::{Notification, Observer};
use crate::error::StreamError;
use crate::scheduler::VirtualTimeScheduler;

/// One notification and the frame it arrived at.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded<T> {
    /// Virtual frame (0 without a clock).
    pub frame: u64,
    /// What arrived.
    pub notification: Notification<T>,
}

impl<T> Recorded<T> {
    /// Pairs a frame with a notification.
    pub fn new(frame: u64, notification: Notification<T>) -> Self {
        Self {
            frame,
            notification,
        }
    }
}

/// Observer that records what it receives.
pub struct TestObserver<T> {
    log: Arc<Mutex<Vec<Recorded<T>>>>,
    clock: Option<VirtualTimeScheduler>,
}

impl<T> Clone for TestObserver<T> {
    fn clone(&self) -> Self {
        Self {
            log: Arc::clone(&self.log),
            clock: self.clock.clone(),
        }
    }
}

impl<T> Default for TestObserver<T> {
    fn default() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            clock: None,
        }
    }
}

impl<T> TestObserver<T> {
    /// Observer without a clock; every frame is 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer stamping notifications with `clock`'s frame.
    pub fn with_clock(clock: VirtualTimeScheduler) -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
            clock: Some(clock),
        }
    }

    fn push(&self, notification: Notification<T>) {
        let frame = self.clock.as_ref().map_or(0, VirtualTimeScheduler::frame);
        self.log.lock().push(Recorded::new(frame, notification));
    }

    /// Number of terminal notifications received (should never exceed one).
    pub fn terminal_count(&self) -> usize {
        self.log
            .lock()
            .iter()
            .filter(|r| r.notification.is_terminal())
            .count()
    }

    /// True once `complete` arrived.
    pub fn is_completed(&self) -> bool {
        self.log
            .lock()
            .iter()
            .any(|r| matches!(r.notification, Notification::Complete))
    }

    /// The received error, if any.
    pub fn error(&self) -> Option<StreamError> {
        self.log.lock().iter().find_map(|r| match &r.notification {
            Notification::Error(e) => Some(e.clone()),
            _ => None,
        })
    }
}

impl<T: Clone> TestObserver<T> {
    /// Values received so far, in order.
    pub fn values(&self) -> Vec<T> {
        self.log
            .lock()
            .iter()
            .filter_map(|r| match &r.notification {
                Notification::Next(v) => Some(v.clone()),
                _ => None,
            })
            .collect()
    }

    /// Everything received so far, with frames.
    pub fn recorded(&self) -> Vec<Recorded<T>> {
        self.log.lock().clone()
    }
}

impl<T: Send + 'static> Observer<T> for TestObserver<T> {
    fn next(&mut self, value: T) {
        self.push(Notification::Next(value));
    }

    fn error(&mut self, err: StreamError) {
        self.push(Notification::Error(err));
    }

    fn complete(&mut self) {
        self.push(Notification::Complete);
    }
}
