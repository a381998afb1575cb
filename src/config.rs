//! # Process-wide engine configuration.
//!
//! Provides [`Config`], the centralized settings for diagnostics and host-backed
//! schedulers.
//!
//! Config is used in two ways:
//! 1. **Diagnostics wiring**: `Diagnostics::builder(config).build()` installs it.
//! 2. **Scheduler defaults**: `AnimationFrameScheduler::current()` reads the frame interval.
//!
//! Nothing in the core contract requires a config to be installed; every reader
//! falls back to [`Config::default`].
//!
//! ## Sentinel values
//! - `bus_capacity = 0` → clamped to 1 by the bus
//! - `frame_interval = 0s` → default frame interval (16ms)

use std::sync::OnceLock;
use std::time::Duration;

/// Frame interval used when [`Config::frame_interval`] is zero.
pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(16);

static INSTALLED: OnceLock<Config> = OnceLock::new();

/// Global configuration for the engine.
///
/// Defines:
/// - **Diagnostics**: bus capacity and the stderr fallback
/// - **Stopped notifications**: whether late terminal calls are reported
/// - **Scheduler defaults**: frame interval for the frame-synced scheduler
///
/// ## Field semantics
/// - `bus_capacity`: diagnostics bus ring buffer size (min 1; clamped by Bus)
/// - `frame_interval`: frame period for `AnimationFrameScheduler` (`0s` = 16ms)
/// - `stderr_fallback`: print unhandled errors to stderr when nobody listens
/// - `report_stopped_notifications`: publish `StoppedNotification` events
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Capacity of the diagnostics broadcast channel ring buffer.
    ///
    /// Slow listeners that lag behind more than `bus_capacity` events skip the
    /// oldest ones. Minimum value is 1 (enforced by Bus).
    ///
    /// Fixed when the bus is first used; install the config before reporting.
    pub bus_capacity: usize,

    /// Period between frames of the frame-synced scheduler.
    ///
    /// - `Duration::ZERO` = [`DEFAULT_FRAME_INTERVAL`]
    pub frame_interval: Duration,

    /// Print unhandled errors to stderr when the diagnostics bus has no receivers.
    ///
    /// Unhandled errors are never silently dropped unless this is disabled.
    pub stderr_fallback: bool,

    /// Publish an event when `error`/`complete` arrives at an already stopped subscriber.
    ///
    /// A late `error` is always reported as unhandled; this flag only controls the
    /// late `complete` case.
    pub report_stopped_notifications: bool,
}

impl Config {
    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Returns the frame interval, substituting the default for `0s`.
    #[inline]
    pub fn frame_interval_or_default(&self) -> Duration {
        if self.frame_interval == Duration::ZERO {
            DEFAULT_FRAME_INTERVAL
        } else {
            self.frame_interval
        }
    }

    /// Returns the installed process-wide config, or the default one.
    pub fn current() -> Config {
        INSTALLED.get().cloned().unwrap_or_default()
    }

    /// Installs `self` as the process-wide config.
    ///
    /// The first install wins. Returns `false` if a different config was
    /// already installed; installing an equal config again is accepted.
    pub(crate) fn install(self) -> bool {
        match INSTALLED.set(self) {
            Ok(()) => true,
            Err(rejected) => INSTALLED.get() == Some(&rejected),
        }
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `bus_capacity = 1024`
    /// - `frame_interval = 16ms`
    /// - `stderr_fallback = true`
    /// - `report_stopped_notifications = false`
    fn default() -> Self {
        Self {
            bus_capacity: 1024,
            frame_interval: DEFAULT_FRAME_INTERVAL,
            stderr_fallback: true,
            report_stopped_notifications: false,
        }
    }
}
