//! Error types used by the rill engine.
//!
//! This module defines two main error enums:
//!
//! - [`StreamError`] — errors that travel through the error channel of a stream,
//!   or are raised while releasing resources.
//! - [`RuntimeError`] — errors raised by the runtime plumbing itself (schedulers
//!   that need a host runtime, diagnostics wiring).
//!
//! Both types provide helper methods (`as_label`, `as_message`) for logging/metrics.

use std::any::Any;
use std::sync::Arc;

use thiserror::Error;

/// # Errors carried by streams.
///
/// Every value delivered through [`Observer::error`](crate::Observer::error) is a
/// `StreamError`. It is cheap to clone: multicast sources hand the same error to
/// every subscriber and keep a copy for late subscribers.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum StreamError {
    /// Producer failed with a plain message.
    #[error("stream failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Producer failed with an arbitrary error value.
    #[error("stream failed: {0}")]
    Custom(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A producer, destination or scheduled work panicked; the panic was caught.
    #[error("panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text.
        message: String,
    },

    /// One or more teardown actions failed while releasing a subscription.
    #[error("{} error(s) occurred during unsubscription: {}", .errors.len(), render_all(.errors))]
    Unsubscription {
        /// Every failure, in teardown order.
        errors: Vec<StreamError>,
    },

    /// Mutation API used on a multicast source that was already released.
    #[error("object unsubscribed")]
    ObjectUnsubscribed,

    /// Mutation API used on a multicast source that already emitted its terminal.
    #[error("multicast source already terminated")]
    AlreadyTerminated,
}

fn render_all(errors: &[StreamError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}) {e}", i + 1))
        .collect::<Vec<_>>()
        .join("; ")
}

impl StreamError {
    /// Builds a [`StreamError::Fail`] from any displayable message.
    ///
    /// # Example
    /// ```
    /// use rill::StreamError;
    ///
    /// let err = StreamError::fail("boom");
    /// assert_eq!(err.to_string(), "stream failed: boom");
    /// ```
    pub fn fail(error: impl Into<String>) -> Self {
        StreamError::Fail {
            error: error.into(),
        }
    }

    /// Wraps an arbitrary error value.
    pub fn custom<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StreamError::Custom(Arc::new(error))
    }

    /// Converts a caught panic payload into [`StreamError::Panicked`].
    pub(crate) fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(msg) = payload.downcast_ref::<&'static str>() {
            (*msg).to_string()
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            msg.clone()
        } else {
            "unknown panic".to_string()
        };
        StreamError::Panicked { message }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use rill::StreamError;
    ///
    /// assert_eq!(StreamError::ObjectUnsubscribed.as_label(), "object_unsubscribed");
    /// assert_eq!(StreamError::fail("x").as_label(), "stream_failed");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            StreamError::Fail { .. } => "stream_failed",
            StreamError::Custom(_) => "stream_custom",
            StreamError::Panicked { .. } => "panicked",
            StreamError::Unsubscription { .. } => "unsubscription",
            StreamError::ObjectUnsubscribed => "object_unsubscribed",
            StreamError::AlreadyTerminated => "already_terminated",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            StreamError::Fail { error } => format!("error: {error}"),
            StreamError::Custom(error) => format!("error: {error}"),
            StreamError::Panicked { message } => format!("panic: {message}"),
            StreamError::Unsubscription { errors } => {
                format!("teardown failures={}", errors.len())
            }
            StreamError::ObjectUnsubscribed => "object unsubscribed".to_string(),
            StreamError::AlreadyTerminated => "emission after terminal".to_string(),
        }
    }

    /// Flattens nested [`StreamError::Unsubscription`] values into one list.
    pub(crate) fn flatten_into(self, out: &mut Vec<StreamError>) {
        match self {
            StreamError::Unsubscription { errors } => {
                for e in errors {
                    e.flatten_into(out);
                }
            }
            other => out.push(other),
        }
    }
}

/// # Errors produced by the runtime plumbing.
///
/// These never travel through a stream; they are returned by constructors and
/// wiring helpers.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    /// A host-backed scheduler was built outside of a tokio runtime.
    #[error("no tokio runtime available for {scheduler}")]
    NoRuntime {
        /// Name of the scheduler that needed the runtime.
        scheduler: &'static str,
    },

    /// A different config was already installed for this process.
    #[error("a different config is already installed")]
    AlreadyInstalled,
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::NoRuntime { .. } => "runtime_missing",
            RuntimeError::AlreadyInstalled => "runtime_already_installed",
        }
    }

    /// Returns a human-readable message with details about the error.
    pub fn as_message(&self) -> String {
        match self {
            RuntimeError::NoRuntime { scheduler } => {
                format!("scheduler={scheduler} requires a tokio runtime")
            }
            RuntimeError::AlreadyInstalled => {
                "config installed twice with different values".to_string()
            }
        }
    }
}
