//! # Runtime-backed schedulers.
//!
//! Three schedulers share one core that defers work onto a tokio runtime:
//!
//! ```text
//! schedule(delay, work)
//!   ├─ delay > 0 ─────────────► spawn { select! { token.cancelled(), sleep(delay) } → run }
//!   └─ delay == 0
//!        ├─ AsyncScheduler ───► same timer path (sleep(0))
//!        ├─ AsapScheduler ────► batch ─► one spawned flush per tick
//!        └─ AnimationFrame ───► batch ─► one flush at the next frame boundary
//! ```
//!
//! ## Rules
//! - Each pending timer owns a `CancellationToken`; releasing the action cancels
//!   it, so the spawned task ends without running.
//! - A batch is taken as a snapshot: work queued while flushing lands in the
//!   next batch.
//! - Panicking work is released and reported as [`EventKind::ActionPanicked`].
//! - Constructing from outside a runtime fails with [`RuntimeError::NoRuntime`].
//!
//! [`EventKind::ActionPanicked`]: crate::EventKind::ActionPanicked

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{RuntimeError, StreamError};
use crate::events::report;

use super::{Action, Dispatch, Scheduler, Work, downgrade, wall_clock};

#[derive(Clone, Copy)]
enum Batching {
    None,
    Tick,
    Frame { origin: Instant, interval: Duration },
}

#[derive(Default)]
struct Batch {
    queue: Vec<(Action, u64)>,
    flush_pending: bool,
}

struct Core {
    name: &'static str,
    handle: Handle,
    batching: Batching,
    batch: Mutex<Batch>,
}

impl Core {
    fn new(name: &'static str, handle: Handle, batching: Batching) -> Arc<Self> {
        Arc::new(Self {
            name,
            handle,
            batching,
            batch: Mutex::new(Batch::default()),
        })
    }

    fn run(name: &'static str, action: &Action, generation: u64) {
        if let Err(panic) = action.run(generation) {
            report::action_panicked(name, &StreamError::from_panic(panic));
        }
    }

    fn spawn_timer(&self, action: Action, delay: Duration, generation: u64) {
        let token = CancellationToken::new();
        action.set_timer(token.clone());
        let name = self.name;
        self.handle.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => Core::run(name, &action, generation),
            }
        });
    }

    fn push_batch(self: &Arc<Self>, action: Action, generation: u64) {
        let first = {
            let mut batch = self.batch.lock();
            batch.queue.push((action, generation));
            !std::mem::replace(&mut batch.flush_pending, true)
        };
        if !first {
            return;
        }
        let wait = match self.batching {
            Batching::Frame { origin, interval } => Some(until_next_frame(origin, interval)),
            _ => None,
        };
        let core = Arc::clone(self);
        self.handle.spawn(async move {
            match wait {
                Some(wait) => tokio::time::sleep(wait).await,
                None => tokio::task::yield_now().await,
            }
            core.flush();
        });
    }

    fn flush(&self) {
        let queue = {
            let mut batch = self.batch.lock();
            batch.flush_pending = false;
            std::mem::take(&mut batch.queue)
        };
        for (action, generation) in queue {
            Core::run(self.name, &action, generation);
        }
    }
}

/// Time left until the next multiple of `interval` after `origin`.
fn until_next_frame(origin: Instant, interval: Duration) -> Duration {
    let interval_ns = interval.as_nanos().max(1);
    let elapsed_ns = Instant::now().saturating_duration_since(origin).as_nanos();
    let into_frame = elapsed_ns % interval_ns;
    let left = interval_ns - into_frame;
    Duration::from_nanos(u64::try_from(left).unwrap_or(u64::MAX))
}

struct Shared(Arc<Core>);

impl Dispatch for Shared {
    fn now(&self) -> Duration {
        wall_clock()
    }

    fn enqueue(&self, action: Action, delay: Duration, generation: u64) {
        match self.0.batching {
            Batching::Tick | Batching::Frame { .. } if delay.is_zero() => {
                self.0.push_batch(action, generation)
            }
            _ => self.0.spawn_timer(action, delay, generation),
        }
    }
}

fn current_handle(scheduler: &'static str) -> Result<Handle, RuntimeError> {
    Handle::try_current().map_err(|_| RuntimeError::NoRuntime { scheduler })
}

macro_rules! runtime_scheduler {
    ($(#[$doc:meta])* $name:ident, $label:literal) => {
        $(#[$doc])*
        #[derive(Clone)]
        pub struct $name {
            shared: Arc<Shared>,
        }

        impl $name {
            /// Binds to the runtime the caller is running in.
            pub fn current() -> Result<Self, RuntimeError> {
                Ok(Self::with_handle(current_handle($label)?))
            }
        }

        impl Scheduler for $name {
            fn now(&self) -> Duration {
                wall_clock()
            }

            fn schedule(&self, delay: Duration, work: Work) -> Action {
                let action = Action::new(downgrade(&self.shared), work);
                action.enqueue(delay);
                action
            }
        }
    };
}

runtime_scheduler!(
    /// Timer-deferred scheduler: every action runs from its own tokio task.
    AsyncScheduler,
    "async"
);

runtime_scheduler!(
    /// Zero-delay work runs in one batch on the next runtime tick.
    AsapScheduler,
    "asap"
);

runtime_scheduler!(
    /// Zero-delay work runs in one batch at the next frame boundary.
    ///
    /// The frame interval comes from [`Config::frame_interval`].
    AnimationFrameScheduler,
    "animation_frame"
);

impl AsyncScheduler {
    /// Binds to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared(Core::new("async", handle, Batching::None))),
        }
    }
}

impl AsapScheduler {
    /// Binds to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        Self {
            shared: Arc::new(Shared(Core::new("asap", handle, Batching::Tick))),
        }
    }
}

impl AnimationFrameScheduler {
    /// Binds to an explicit runtime handle.
    pub fn with_handle(handle: Handle) -> Self {
        let interval = Config::current().frame_interval_or_default();
        Self::with_interval(handle, interval)
    }

    /// Binds to `handle` with an explicit frame interval.
    pub fn with_interval(handle: Handle, interval: Duration) -> Self {
        let interval = if interval.is_zero() {
            Config::default().frame_interval
        } else {
            interval
        };
        let batching = Batching::Frame {
            origin: Instant::now(),
            interval,
        };
        Self {
            shared: Arc::new(Shared(Core::new("animation_frame", handle, batching))),
        }
    }
}
