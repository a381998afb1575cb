//! # Listener trait.
//!
//! [`Listen`] is the extension point for consuming diagnostics events.
//!
//! Each listener gets:
//! - a dedicated worker task (spawned by [`ListenerSet`](crate::ListenerSet)),
//! - a bounded queue (capacity from [`Listen::queue_capacity`]),
//! - panic isolation (a panic becomes a `ListenerPanicked` event).
//!
//! ## Example
//! ```rust
//! use async_trait::async_trait;
//! use rill::{Event, EventKind, Listen};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! #[derive(Default)]
//! struct Unhandled(AtomicUsize);
//!
//! #[async_trait]
//! impl Listen for Unhandled {
//!     async fn on_event(&self, ev: &Event) {
//!         if ev.kind == EventKind::UnhandledError {
//!             self.0.fetch_add(1, Ordering::Relaxed);
//!         }
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "unhandled-counter"
//!     }
//! }
//! ```

use async_trait::async_trait;

use crate::events::Event;

/// Consumer of diagnostics events.
///
/// `on_event` runs on the listener's own worker task, so a slow listener only
/// delays itself. Events for one listener arrive in publication order.
#[async_trait]
pub trait Listen: Send + Sync + 'static {
    /// Processes a single event.
    async fn on_event(&self, ev: &Event);

    /// Name used in overflow and panic events.
    fn name(&self) -> &'static str;

    /// Capacity of this listener's queue (minimum 1).
    ///
    /// Events that do not fit are dropped for this listener only.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
