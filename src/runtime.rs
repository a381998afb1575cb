//! # Diagnostics wiring.
//!
//! [`Diagnostics`] connects the process-wide diagnostics bus to a set of
//! [`Listen`] implementations:
//!
//! ```text
//! Subscriber / Subscription / Scheduler
//!              │ report
//!              ▼
//!        events::bus()  ──►  forward loop  ──►  ListenerSet  ──►  listeners
//!                           (tokio task)      (queue per listener)
//! ```
//!
//! Streams work without it; with no receiver on the bus, unhandled errors
//! fall back to stderr.
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use rill::{Config, Diagnostics, Listen};
//!
//! # async fn run(listener: Arc<dyn Listen>) -> Result<(), rill::RuntimeError> {
//! let diagnostics = Diagnostics::builder(Config::default())
//!     .with_listeners(vec![listener])
//!     .build()?;
//!
//! // ... run streams ...
//!
//! diagnostics.shutdown().await;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::RuntimeError;
use crate::events::bus;
use crate::listeners::{Listen, ListenerSet};

/// Builder for [`Diagnostics`].
pub struct DiagnosticsBuilder {
    cfg: Config,
    listeners: Vec<Arc<dyn Listen>>,
}

impl DiagnosticsBuilder {
    /// Sets the listeners that receive diagnostics events.
    pub fn with_listeners(mut self, listeners: Vec<Arc<dyn Listen>>) -> Self {
        self.listeners = listeners;
        self
    }

    /// Installs the config and starts forwarding bus events to the listeners.
    ///
    /// Must be called inside a tokio runtime. The bus keeps the capacity it was
    /// created with; if anything was reported before this call and the
    /// configured `bus_capacity` differs, a note goes to stderr.
    ///
    /// ### Errors
    /// - [`RuntimeError::NoRuntime`] outside of a tokio runtime.
    /// - [`RuntimeError::AlreadyInstalled`] if a different config was installed before.
    pub fn build(self) -> Result<Diagnostics, RuntimeError> {
        let handle = Handle::try_current().map_err(|_| RuntimeError::NoRuntime {
            scheduler: "diagnostics",
        })?;
        let wanted = self.cfg.bus_capacity_clamped();
        let stderr_fallback = self.cfg.stderr_fallback;
        if !self.cfg.install() {
            return Err(RuntimeError::AlreadyInstalled);
        }

        let bus = bus().clone();
        if stderr_fallback {
            if let Some(note) = capacity_mismatch(bus.capacity(), wanted) {
                eprintln!("[rill] {note}");
            }
        }
        let set = ListenerSet::new(self.listeners, bus.clone());
        let token = CancellationToken::new();
        let mut rx = bus.subscribe();
        let stop = token.clone();

        let forward = handle.spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    received = rx.recv() => match received {
                        Ok(ev) => set.emit(&ev),
                        Err(RecvError::Lagged(skipped)) => {
                            eprintln!("[rill] diagnostics lagged, skipped {skipped} event(s)");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            set
        });

        Ok(Diagnostics { token, forward })
    }
}

/// Describes a bus created before the config that asked for another capacity.
fn capacity_mismatch(actual: usize, wanted: usize) -> Option<String> {
    (actual != wanted).then(|| {
        format!("diagnostics bus was created with capacity {actual} before config install; bus_capacity={wanted} is ignored")
    })
}

/// Running diagnostics pipeline: bus receiver plus listener workers.
///
/// Dropping it leaves the pipeline running for the rest of the process;
/// call [`shutdown`](Self::shutdown) to stop it and drain the listener queues.
pub struct Diagnostics {
    token: CancellationToken,
    forward: JoinHandle<ListenerSet>,
}

impl Diagnostics {
    /// Creates a builder for the given configuration.
    pub fn builder(cfg: Config) -> DiagnosticsBuilder {
        DiagnosticsBuilder {
            cfg,
            listeners: Vec::new(),
        }
    }

    /// Stops forwarding and waits for every listener to process its queue.
    pub async fn shutdown(self) {
        self.token.cancel();
        if let Ok(set) = self.forward.await {
            set.shutdown().await;
        }
    }
}
