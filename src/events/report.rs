//! # Out-of-band reporting.
//!
//! Some failures cannot be delivered through a stream's error channel: the
//! destination has no error handler, it already stopped, or a teardown failed
//! while the subscription released itself. Those are published here, on the
//! process-wide diagnostics [`Bus`].
//!
//! ## Rules
//! - Reporting never blocks and never panics.
//! - An unhandled error with no bus receiver goes to stderr
//!   (unless `Config::stderr_fallback` is disabled).
//! - Stopped `complete` notifications are published only when
//!   `Config::report_stopped_notifications` is set.

use std::sync::OnceLock;

use crate::config::Config;
use crate::error::StreamError;

use super::{Bus, Event, EventKind};

static BUS: OnceLock<Bus> = OnceLock::new();

/// Returns the process-wide diagnostics bus.
///
/// Created on first use with the capacity of the [`Config`] installed at that
/// moment, or the default one. Anything reported before
/// [`Diagnostics`](crate::Diagnostics) is built fixes the capacity; a later
/// config with a different `bus_capacity` is flagged on stderr by the builder.
pub fn bus() -> &'static Bus {
    BUS.get_or_init(|| Bus::new(Config::current().bus_capacity_clamped()))
}

/// Reports an error nobody could handle.
pub(crate) fn unhandled(origin: &'static str, err: &StreamError) {
    let ev = Event::new(EventKind::UnhandledError)
        .with_origin(origin)
        .with_error(err);
    if !bus().publish(ev) && Config::current().stderr_fallback {
        eprintln!("[rill] unhandled error from {origin}: {err}");
    }
}

/// Reports a `complete` that arrived after the subscriber stopped.
pub(crate) fn stopped_notification(origin: &'static str) {
    if Config::current().report_stopped_notifications {
        bus().publish(Event::new(EventKind::StoppedNotification).with_origin(origin));
    }
}

/// Reports teardown failures nobody asked for (self-release after a terminal).
pub(crate) fn teardown_failed(origin: &'static str, err: &StreamError) {
    let ev = Event::new(EventKind::TeardownFailed)
        .with_origin(origin)
        .with_error(err);
    if !bus().publish(ev) && Config::current().stderr_fallback {
        eprintln!("[rill] teardown failed in {origin}: {err}");
    }
}

/// Reports panicking scheduled work.
pub(crate) fn action_panicked(origin: &'static str, err: &StreamError) {
    let ev = Event::new(EventKind::ActionPanicked)
        .with_origin(origin)
        .with_error(err);
    if !bus().publish(ev) && Config::current().stderr_fallback {
        eprintln!("[rill] scheduled work panicked on {origin}: {err}");
    }
}
