//! # Hot sources: one execution, many consumers.
//!
//! Subjects are both an [`Observer`](crate::Observer) (feed them from a source
//! or push into them directly) and a source of their own (via `source()` or
//! `subscribe`).
//!
//! | Type                | Late subscriber receives                         |
//! |---------------------|--------------------------------------------------|
//! | [`Subject`]         | live values only                                 |
//! | [`ReplaySubject`]   | buffered values, then live                       |
//! | [`BehaviorSubject`] | current value, then live                         |
//! | [`AsyncSubject`]    | last value, only after completion                |
//!
//! [`ConnectableSource`] puts any of them in front of a cold upstream and
//! controls when that upstream runs.

mod async_subject;
mod behavior;
mod connectable;
mod hub;
mod replay;
mod subject;

pub use async_subject::AsyncSubject;
pub use behavior::BehaviorSubject;
pub use connectable::ConnectableSource;
pub use replay::ReplaySubject;
pub use subject::Subject;

use crate::core::Source;
use crate::error::StreamError;

/// Common surface of the subject family, used by [`ConnectableSource`].
pub trait Multicast<T>: Send + Sync + 'static {
    /// Cold view: each subscription joins the fan-out.
    fn source(&self) -> Source<T>;

    /// Emits a value.
    fn try_next(&self, value: T) -> Result<(), StreamError>;

    /// Emits the terminal error.
    fn try_error(&self, err: StreamError) -> Result<(), StreamError>;

    /// Emits completion.
    fn try_complete(&self) -> Result<(), StreamError>;

    /// Closes the subject.
    fn release(&self);

    /// True once terminated or released.
    fn is_stopped(&self) -> bool;
}
