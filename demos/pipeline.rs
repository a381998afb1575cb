//! # Example: pipeline
//!
//! Runs a small stream pipeline on the tokio-backed schedulers and prints the
//! diagnostics events the engine reports along the way.
//!
//! Shows how to:
//! - Wire [`LogWriter`] through [`Diagnostics`].
//! - Drive stages from [`AsyncScheduler`] timers.
//! - Flatten with `switch_map` and bridge futures with [`from_future`].
//! - Observe an unhandled error being reported instead of lost.
//!
//! ## Flow
//! ```text
//! interval(100ms) ──► take(4) ──► switch_map(timer(150ms)) ──► subscriber
//!                                   └─► each tick cancels the previous inner timer
//! from_future(...) ──► map ──► subscriber
//! throw_error(...) ──► subscriber without error callback ──► Bus ──► LogWriter
//! ```
//!
//! ## Run
//! ```bash
//! cargo run --example pipeline --features logging
//! ```

use std::sync::Arc;
use std::time::Duration;

use rill::{
    AsyncScheduler, Config, Diagnostics, Listen, LogWriter, StreamError, from_future, interval,
    throw_error, timer,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let listeners: Vec<Arc<dyn Listen>> = vec![Arc::new(LogWriter::new())];
    let diagnostics = Diagnostics::builder(Config::default())
        .with_listeners(listeners)
        .build()?;

    let sched = AsyncScheduler::current()?;

    // Only the last tick lives long enough for its inner timer to fire.
    let inner = sched.clone();
    let switched = interval(Duration::from_millis(100), sched.clone())
        .take(4)
        .switch_map(move |tick, _| {
            timer(Duration::from_millis(150), inner.clone()).map(move |_| tick)
        });
    switched.subscribe_all(
        |tick| println!("[pipeline] switch_map delivered tick={tick}"),
        |err| println!("[pipeline] failed: {err}"),
        || println!("[pipeline] switch_map completed"),
    );

    from_future(|| async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok::<_, StreamError>("hello from a future")
    })
    .map(str::to_uppercase)
    .subscribe_fn(|msg| println!("[pipeline] {msg}"));

    throw_error::<u8>(StreamError::fail("nobody handles this")).subscribe_fn(|_| {});

    tokio::time::sleep(Duration::from_millis(700)).await;
    diagnostics.shutdown().await;
    Ok(())
}
