//! # Example: virtual_time
//!
//! Tests a time-based pipeline deterministically: nothing sleeps, the clock only
//! moves when the test advances it.
//!
//! ## Run
//! ```bash
//! cargo run --example virtual_time
//! ```

use std::time::Duration;

use rill::{Notification, VirtualTimeScheduler, interval};

fn main() {
    let sched = VirtualTimeScheduler::new();

    // Frames are milliseconds.
    let clicks = sched.create_hot(vec![
        (15, Notification::Next("a")),
        (35, Notification::Next("b")),
        (60, Notification::Complete),
    ]);

    let obs = sched.observer();
    let ticks = sched.clone();
    clicks
        .source()
        .switch_map(move |click, _| {
            interval(Duration::from_millis(10), ticks.clone())
                .take(3)
                .map(move |n| format!("{click}{n}"))
        })
        .subscribe(obs.clone());

    sched.advance_by(Duration::from_millis(40));
    println!("after 40 frames: {:?}", obs.values());

    sched.flush();
    for record in obs.recorded() {
        println!("frame {:>3}: {:?}", record.frame, record.notification);
    }
}
