//! Multicasting stages: `publish`, `publish_replay`, `publish_behavior`, `share`.

use crate::core::Source;
use crate::multicast::{BehaviorSubject, ConnectableSource, ReplaySubject, Subject};

impl<T: Clone + Send + 'static> Source<T> {
    /// Shares one upstream execution through a plain [`Subject`] once connected.
    pub fn publish(&self) -> ConnectableSource<T> {
        ConnectableSource::new(self.clone(), Subject::new)
    }

    /// Like [`publish`](Self::publish), replaying the last `size` values to late subscribers.
    pub fn publish_replay(&self, size: usize) -> ConnectableSource<T> {
        ConnectableSource::new(self.clone(), move || ReplaySubject::new(size))
    }

    /// Like [`publish`](Self::publish), starting from `initial`.
    pub fn publish_behavior(&self, initial: T) -> ConnectableSource<T>
    where
        T: Sync,
    {
        ConnectableSource::new(self.clone(), move || BehaviorSubject::new(initial.clone()))
    }

    /// Shares one upstream execution among all current subscribers.
    ///
    /// Connects on the first subscriber, disconnects when the last one leaves,
    /// and starts over on the next subscriber.
    pub fn share(&self) -> Source<T> {
        self.publish().ref_count()
    }
}
