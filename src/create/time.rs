//! Time-based sources.

use std::sync::Arc;
use std::time::Duration;

use crate::core::{Source, Teardown};
use crate::scheduler::{Scheduler, SchedulerExt};

/// Emits `0` after `delay` on `scheduler`, then completes.
pub fn timer<S: Scheduler>(delay: Duration, scheduler: S) -> Source<u64> {
    let scheduler = Arc::new(scheduler);
    Source::new(move |s| {
        let target = s.clone();
        let action = scheduler.schedule_fn(delay, move |_| {
            target.next(0);
            target.complete();
        });
        Ok(Teardown::from(action))
    })
}

/// Emits `0, 1, 2, ...` every `period` on `scheduler`, forever.
///
/// One action is rescheduled for the whole run; releasing the subscription
/// cancels it.
pub fn interval<S: Scheduler>(period: Duration, scheduler: S) -> Source<u64> {
    let scheduler = Arc::new(scheduler);
    Source::new(move |s| {
        let target = s.clone();
        let action = scheduler.schedule_with_state(0u64, period, move |action, count| {
            target.next(*count);
            *count += 1;
            action.reschedule(period);
        });
        Ok(Teardown::from(action))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Notification;
    use crate::scheduler::VirtualTimeScheduler;
    use crate::testing::Recorded;

    #[test]
    fn test_timer_fires_at_exact_frame() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        timer(Duration::from_millis(25), sched.clone()).subscribe(obs.clone());
        sched.flush();
        assert_eq!(
            obs.recorded(),
            vec![
                Recorded::new(25, Notification::Next(0)),
                Recorded::new(25, Notification::Complete),
            ]
        );
    }

    #[test]
    fn test_interval_ticks_until_released() {
        let sched = VirtualTimeScheduler::new();
        let obs = sched.observer();
        let handle = interval(Duration::from_millis(10), sched.clone()).subscribe(obs.clone());
        sched.advance_to(35);
        handle.release().unwrap();
        sched.advance_to(100);

        let frames: Vec<u64> = obs.recorded().iter().map(|r| r.frame).collect();
        assert_eq!(frames, vec![10, 20, 30]);
        assert_eq!(obs.values(), vec![0, 1, 2]);
    }

    #[test]
    fn test_interval_action_does_not_pile_up_in_subscription() {
        let sched = VirtualTimeScheduler::new();
        let handle = interval(Duration::from_millis(1), sched.clone()).subscribe(crate::FnObserver::ignore());
        sched.advance_to(50);
        assert!(handle.child_count() <= 2);
    }
}
