//! # rill
//!
//! **Rill** is a push-based reactive stream engine for Rust.
//!
//! A [`Source`] is a lazy recipe for a stream of values. Subscribing runs it and
//! returns a [`Subscription`]; releasing that subscription tears down everything
//! the run acquired, exactly once, no matter how the stream ended.
//!
//! ## Architecture
//! ### Data and cancellation flow
//! ```text
//!   Source ──lift──► Stage ──lift──► Stage ──subscribe──► Subscriber ──► Observer
//!     │                │               │                      │
//!     │ producer       │ operator      │ operator             │ terminal node
//!     ▼                ▼               ▼                      ▼
//! ┌───────────────────────────────────────────────────────────────────────┐
//! │  Subscription tree (one node per Subscriber, finalizers as children)  │
//! │  release() ──► teardowns run once, children first-added-first-run     │
//! └───────────────────────────────────────────────────────────────────────┘
//!     values flow left to right ─────────►
//!     ◄───────── release flows right to left (and down to every child)
//! ```
//!
//! ### Scheduling
//! ```text
//!   schedule(delay, work) ──► Action (a Subscription) ──► Dispatch
//!                                                          ├─ QueueScheduler         (trampoline on the caller's thread)
//!                                                          ├─ AsyncScheduler         (tokio timers)
//!                                                          ├─ AsapScheduler          (batched tokio tasks)
//!                                                          ├─ AnimationFrameScheduler(frame-aligned batches)
//!                                                          └─ VirtualTimeScheduler   (manual clock, deterministic)
//! ```
//!
//! ### Diagnostics
//! ```text
//!   Subscriber / Subscription / Scheduler
//!              │ unhandled errors, late notifications, failed teardowns, panics
//!              ▼
//!        Bus (broadcast) ──► Diagnostics forward loop ──► ListenerSet ──► Listen impls
//!              └── nobody listening ──► stderr "[rill] ..."
//! ```
//!
//! ## Features
//! | Area             | Description                                                  | Key types / functions                                  |
//! |------------------|--------------------------------------------------------------|--------------------------------------------------------|
//! | **Core**         | Lazy sources, stages, terminal nodes and cancellation.       | [`Source`], [`Subscriber`], [`Subscription`]           |
//! | **Creation**     | Build sources from values, timers, futures and callbacks.    | [`of`], [`from_iter`], [`interval`], [`from_future`]   |
//! | **Stages**       | Transform, schedule and flatten streams.                     | `map`, `filter`, `take`, `merge_map`, `switch_map`     |
//! | **Multicast**    | Hot sources shared by many observers.                        | [`Subject`], [`ReplaySubject`], [`ConnectableSource`]  |
//! | **Schedulers**   | Injectable time and execution contexts.                      | [`Scheduler`], [`QueueScheduler`], [`AsyncScheduler`]  |
//! | **Testing**      | Virtual time and recording observers.                        | [`VirtualTimeScheduler`], [`testing::TestObserver`]    |
//! | **Diagnostics**  | Out-of-band reports delivered to listeners.                  | [`Listen`], [`Diagnostics`], [`Event`]                 |
//!
//! ## Optional features
//! - `logging`: exports a simple built-in [`LogWriter`] _(demo/reference only)_.
//!
//! ## Example
//! ```rust
//! use rill::{QueueScheduler, from_iter};
//!
//! let seen = std::sync::Arc::new(parking_lot::Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! from_iter(1..=5)
//!     .filter(|v| v % 2 == 1)
//!     .map(|v| v * 10)
//!     .observe_on(QueueScheduler::new())
//!     .subscribe_fn(move |v| sink.lock().push(v));
//!
//! assert_eq!(*seen.lock(), vec![10, 30, 50]);
//! ```
mod config;
mod core;
mod create;
mod error;
mod events;
mod listeners;
mod multicast;
mod ops;
mod runtime;
mod scheduler;

pub mod testing;

// ---- Public re-exports ----

pub use config::{Config, DEFAULT_FRAME_INTERVAL};
pub use core::{
    FnObserver, Notification, Observer, Source, Stage, Subscriber, Subscription, Teardown,
};
pub use create::{
    defer, empty, from_future, from_iter, from_listener, from_stream, interval, never, of,
    throw_error, timer,
};
pub use create::host::Handler;
pub use error::{RuntimeError, StreamError};
pub use events::{Bus, Event, EventKind, bus};
pub use listeners::{Listen, ListenerSet};
pub use multicast::{
    AsyncSubject, BehaviorSubject, ConnectableSource, Multicast, ReplaySubject, Subject,
};
pub use ops::flatten::{Mode, flatten};
pub use runtime::{Diagnostics, DiagnosticsBuilder};
pub use scheduler::{
    Action, AnimationFrameScheduler, AsapScheduler, AsyncScheduler, QueueScheduler, Scheduler,
    SchedulerExt, VirtualTimeScheduler, Work,
};

// Optional: expose a simple built-in logger listener (demo/reference).
// Enable with: `--features logging`
#[cfg(feature = "logging")]
pub use listeners::LogWriter;
