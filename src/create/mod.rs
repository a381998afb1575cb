//! # Creation functions.
//!
//! Entry points that turn plain values, time and host primitives into
//! [`Source`](crate::Source)s.
//!
//! - [`basic`]: `of`, `from_iter`, `empty`, `never`, `throw_error`, `defer`;
//! - [`time`]: `timer`, `interval` on any [`Scheduler`](crate::Scheduler);
//! - [`host`]: `from_future`, `from_stream`, `from_listener`, the boundary where
//!   host async primitives are normalized into sources.

pub mod basic;
pub mod host;
pub mod time;

pub use basic::{defer, empty, from_iter, never, of, throw_error};
pub use host::{from_future, from_listener, from_stream};
pub use time::{interval, timer};
