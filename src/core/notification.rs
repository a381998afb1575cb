//! Materialized observer calls.
//!
//! A [`Notification`] is one call on the observer contract turned into a value.
//! Subscribers queue them while a delivery is in progress; the virtual-time test
//! tooling records and replays them.

use crate::error::StreamError;

use super::observer::Observer;

/// One `next`, `error` or `complete` call.
#[derive(Debug, Clone)]
pub enum Notification<T> {
    /// A value.
    Next(T),
    /// Terminal error.
    Error(StreamError),
    /// Terminal completion.
    Complete,
}

impl<T> Notification<T> {
    /// True for `Error` and `Complete`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Notification::Next(_))
    }

    /// Delivers this notification to `observer`.
    pub fn accept<O>(self, observer: &mut O)
    where
        O: Observer<T> + ?Sized,
    {
        match self {
            Notification::Next(v) => observer.next(v),
            Notification::Error(e) => observer.error(e),
            Notification::Complete => observer.complete(),
        }
    }

    /// Short kind tag, used when comparing recordings.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::Next(_) => "next",
            Notification::Error(_) => "error",
            Notification::Complete => "complete",
        }
    }
}

impl<T: PartialEq> PartialEq for Notification<T> {
    /// Errors compare by label and message; `StreamError` itself has no equality.
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Notification::Next(a), Notification::Next(b)) => a == b,
            (Notification::Error(a), Notification::Error(b)) => {
                a.as_label() == b.as_label() && a.to_string() == b.to_string()
            }
            (Notification::Complete, Notification::Complete) => true,
            _ => false,
        }
    }
}
