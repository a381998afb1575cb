//! Scheduler-bound stages: `observe_on` and `subscribe_on`.

use std::sync::Arc;
use std::time::Duration;

use crate::core::{Notification, Observer, Source, Subscriber, Teardown};
use crate::error::StreamError;
use crate::scheduler::{Scheduler, SchedulerExt};

/// Re-emits every notification through a scheduler.
struct ObserveOn<T, S> {
    destination: Subscriber<T>,
    scheduler: Arc<S>,
    delay: Duration,
}

impl<T: Send + 'static, S: Scheduler> ObserveOn<T, S> {
    fn forward(&self, notification: Notification<T>) {
        let mut target = self.destination.clone();
        let mut notification = Some(notification);
        let action = self.scheduler.schedule_fn(self.delay, move |_| {
            if let Some(n) = notification.take() {
                n.accept(&mut target);
            }
        });
        self.destination.add(action);
    }
}

impl<T: Send + 'static, S: Scheduler> Observer<T> for ObserveOn<T, S> {
    fn next(&mut self, value: T) {
        self.forward(Notification::Next(value));
    }

    fn error(&mut self, err: StreamError) {
        self.forward(Notification::Error(err));
    }

    fn complete(&mut self) {
        self.forward(Notification::Complete);
    }
}

impl<T: Send + 'static> Source<T> {
    /// Delivers every notification from `scheduler`.
    pub fn observe_on<S: Scheduler>(&self, scheduler: S) -> Source<T> {
        self.observe_on_delayed(scheduler, Duration::ZERO)
    }

    /// Delivers every notification from `scheduler`, `delay` after it arrived.
    pub fn observe_on_delayed<S: Scheduler>(&self, scheduler: S, delay: Duration) -> Source<T> {
        let scheduler = Arc::new(scheduler);
        self.lift(move |destination: Subscriber<T>, _: &Source<T>| {
            let stage = ObserveOn {
                destination: destination.clone(),
                scheduler: Arc::clone(&scheduler),
                delay,
            };
            Subscriber::chained(&destination, stage)
        })
    }

    /// Performs the upstream subscription itself from `scheduler`.
    pub fn subscribe_on<S: Scheduler>(&self, scheduler: S) -> Source<T> {
        let upstream = self.clone();
        let scheduler = Arc::new(scheduler);
        Source::new(move |subscriber| {
            let upstream = upstream.clone();
            let target = subscriber.clone();
            let action = scheduler.schedule_fn(Duration::ZERO, move |_| {
                upstream.subscribe_with(target.clone());
            });
            Ok(Teardown::from(action))
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testing::{Recorded, TestObserver};
    use crate::{AsapScheduler, Notification, VirtualTimeScheduler, from_iter};
    use std::time::Duration;

    #[test]
    fn test_observe_on_defers_delivery() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        from_iter(vec![1, 2])
            .observe_on_delayed(sched.clone(), Duration::from_millis(5))
            .subscribe(obs.clone());
        assert!(obs.values().is_empty());

        sched.flush();
        assert_eq!(
            obs.recorded(),
            vec![
                Recorded::new(5, Notification::Next(1)),
                Recorded::new(5, Notification::Next(2)),
                Recorded::new(5, Notification::Complete),
            ]
        );
    }

    #[test]
    fn test_observe_on_release_cancels_pending_deliveries() {
        let sched = VirtualTimeScheduler::new();
        let obs = TestObserver::new();
        let handle = from_iter(vec![1, 2])
            .observe_on(sched.clone())
            .subscribe(obs.clone());
        handle.release().unwrap();
        sched.flush();
        assert!(obs.values().is_empty());
        assert_eq!(obs.terminal_count(), 0);
    }

    #[test]
    fn test_subscribe_on_defers_subscription() {
        let sched = VirtualTimeScheduler::new();
        let obs = TestObserver::new();
        from_iter(vec![7]).subscribe_on(sched.clone()).subscribe(obs.clone());
        assert!(obs.values().is_empty());
        sched.flush();
        assert_eq!(obs.values(), vec![7]);
        assert!(obs.is_completed());
    }

    #[test]
    fn test_subscribe_on_release_before_run_never_subscribes() {
        let sched = VirtualTimeScheduler::new();
        let obs = TestObserver::new();
        let handle = from_iter(vec![7]).subscribe_on(sched.clone()).subscribe(obs.clone());
        handle.release().unwrap();
        sched.flush();
        assert!(obs.values().is_empty());
    }

    #[tokio::test]
    async fn test_observe_on_asap_delivers_on_next_tick() {
        let obs = TestObserver::new();
        from_iter(vec![1, 2])
            .observe_on(AsapScheduler::current().unwrap())
            .subscribe(obs.clone());
        assert!(obs.values().is_empty());

        for _ in 0..10 {
            tokio::task::yield_now().await;
            if obs.is_completed() {
                break;
            }
        }
        assert_eq!(obs.values(), vec![1, 2]);
        assert!(obs.is_completed());
    }

    #[tokio::test]
    async fn test_observe_on_asap_release_before_flush_drops_batch() {
        let obs = TestObserver::new();
        let handle = from_iter(vec![1, 2])
            .observe_on(AsapScheduler::current().unwrap())
            .subscribe(obs.clone());
        handle.release().unwrap();

        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(obs.values().is_empty());
        assert_eq!(obs.terminal_count(), 0);
    }
}
