//! # LogWriter: simple event printer.
//!
//! A minimal listener that prints incoming [`Event`]s to stdout.
//! Use it for tests or demos.
//!
//! ## Example output
//! ```text
//! [unhandled] origin="subscriber" err="stream failed: boom" label="stream_failed"
//! [stopped-notification] origin="subscriber"
//! [teardown-failed] origin="subscriber" err="..."
//! [action-panicked] scheduler="queue" err="panicked: boom"
//! [listener-overflow] listener="metrics" reason="full"
//! [listener-panicked] listener="metrics" info="panic: boom"
//! ```

use async_trait::async_trait;

use crate::events::{Event, EventKind};

use super::Listen;

/// Event writer listener.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Listen for LogWriter {
    async fn on_event(&self, e: &Event) {
        let origin = e.origin.as_deref().unwrap_or("unknown");
        let reason = e.reason.as_deref().unwrap_or("unknown");
        match e.kind {
            EventKind::UnhandledError => {
                println!(
                    "[unhandled] origin={origin:?} err={reason:?} label={:?}",
                    e.label.unwrap_or("unknown")
                );
            }
            EventKind::StoppedNotification => {
                println!("[stopped-notification] origin={origin:?}");
            }
            EventKind::TeardownFailed => {
                println!("[teardown-failed] origin={origin:?} err={reason:?}");
            }
            EventKind::ActionPanicked => {
                println!("[action-panicked] scheduler={origin:?} err={reason:?}");
            }
            EventKind::ListenerOverflow => {
                println!("[listener-overflow] listener={origin:?} reason={reason:?}");
            }
            EventKind::ListenerPanicked => {
                println!("[listener-panicked] listener={origin:?} info={reason:?}");
            }
        }
    }

    fn name(&self) -> &'static str {
        "log_writer"
    }
}
