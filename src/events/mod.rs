//! Diagnostic events: types, broadcast bus and out-of-band reporting.
//!
//! This module groups the event **data model**, the **bus** used to
//! publish/subscribe to diagnostic events and the **reporting** helpers the core
//! uses when a failure cannot travel through a stream.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] event classification and payload metadata
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//! - [`bus`] the process-wide bus used by the core
//!
//! ## Quick reference
//! - **Publishers**: `Subscriber` (unhandled / stopped notifications),
//!   `Subscription` owners releasing on terminal, schedulers (panicking work),
//!   `ListenerSet` workers (overflow/panic).
//! - **Consumers**: the listener loop spawned by `Diagnostics::build`, or any
//!   receiver obtained from [`bus`].

mod bus;
mod event;
pub(crate) mod report;

pub use bus::Bus;
pub use event::{Event, EventKind};
pub use report::bus;
