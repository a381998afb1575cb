//! # Diagnostic events emitted by the engine.
//!
//! The [`EventKind`] enum classifies out-of-band reports across three categories:
//! - **Delivery events**: errors nobody handled, notifications after stop
//! - **Resource events**: teardown failures, panicking scheduled work
//! - **Listener events**: listener queue overflow and listener panics
//!
//! The [`Event`] struct carries additional metadata such as timestamps, the
//! component that reported it and a human-readable reason.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use rill::{Event, EventKind, StreamError};
//!
//! let ev = Event::new(EventKind::UnhandledError)
//!     .with_origin("subscriber")
//!     .with_error(&StreamError::fail("boom"));
//!
//! assert_eq!(ev.kind, EventKind::UnhandledError);
//! assert_eq!(ev.origin.as_deref(), Some("subscriber"));
//! assert_eq!(ev.label, Some("stream_failed"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::SystemTime;

use crate::error::StreamError;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of diagnostic events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Delivery events ===
    /// An error reached a destination with no error handler, a destination's
    /// error handler panicked, or an error arrived after the subscriber stopped.
    ///
    /// Sets:
    /// - `origin`: reporting component
    /// - `reason`: error message
    /// - `label`: error label
    UnhandledError,

    /// `complete` arrived at a subscriber that had already stopped.
    ///
    /// Published only when `Config::report_stopped_notifications` is set.
    ///
    /// Sets:
    /// - `origin`: reporting component
    StoppedNotification,

    // === Resource events ===
    /// A release triggered by a terminal notification had failing teardowns.
    ///
    /// Sets:
    /// - `origin`: reporting component
    /// - `reason`: aggregated error message
    TeardownFailed,

    /// Work running on a scheduler panicked; the action was released.
    ///
    /// Sets:
    /// - `origin`: scheduler name
    /// - `reason`: panic message
    ActionPanicked,

    // === Listener events ===
    /// Listener panicked during event processing.
    ///
    /// Sets:
    /// - `origin`: listener name
    /// - `reason`: panic info/message
    ListenerPanicked,

    /// Listener dropped an event (queue full or worker closed).
    ///
    /// Sets:
    /// - `origin`: listener name
    /// - `reason`: reason string ("full", "closed")
    ListenerOverflow,
}

/// Diagnostic event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Component that reported the event.
    pub origin: Option<Arc<str>>,
    /// Human-readable reason (error text, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Stable label of the reported error, if any.
    pub label: Option<&'static str>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            origin: None,
            reason: None,
            label: None,
        }
    }

    /// Attaches the reporting component.
    #[inline]
    pub fn with_origin(mut self, origin: impl Into<Arc<str>>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches the message and label of an error.
    #[inline]
    pub fn with_error(mut self, err: &StreamError) -> Self {
        self.reason = Some(err.to_string().into());
        self.label = Some(err.as_label());
        self
    }

    /// Creates a listener overflow event.
    #[inline]
    pub fn listener_overflow(listener: &'static str, reason: &'static str) -> Self {
        Event::new(EventKind::ListenerOverflow)
            .with_origin(listener)
            .with_reason(reason)
    }

    /// Creates a listener panic event.
    #[inline]
    pub fn listener_panicked(listener: &'static str, info: String) -> Self {
        Event::new(EventKind::ListenerPanicked)
            .with_origin(listener)
            .with_reason(info)
    }

    #[inline]
    pub fn is_listener_overflow(&self) -> bool {
        matches!(self.kind, EventKind::ListenerOverflow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_is_monotonic() {
        let a = Event::new(EventKind::UnhandledError);
        let b = Event::new(EventKind::UnhandledError);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn test_overflow_helper_sets_fields() {
        let ev = Event::listener_overflow("log", "full");
        assert!(ev.is_listener_overflow());
        assert_eq!(ev.origin.as_deref(), Some("log"));
        assert_eq!(ev.reason.as_deref(), Some("full"));
    }
}
