//! # Diagnostics listeners.
//!
//! Listeners consume the [`Event`](crate::Event)s the engine publishes on its
//! diagnostics bus: unhandled errors, late notifications, teardown failures and
//! panicking scheduled work.
//!
//! - [`Listen`] is the extension point (`async_trait`).
//! - [`ListenerSet`] fans events out to many listeners without blocking the publisher.
//! - [`LogWriter`] (feature `logging`) prints every event to stdout.
//!
//! Listeners are usually wired through [`Diagnostics`](crate::Diagnostics)
//! rather than driven by hand.

mod listen;
mod set;

#[cfg(feature = "logging")]
mod log;

pub use listen::Listen;
pub use set::ListenerSet;

#[cfg(feature = "logging")]
pub use log::LogWriter;
