//! Subject emitting only its final value.

use super::hub::{Hub, Memory, subject_surface};

/// Subject that emits the last value it saw, and only when it completes.
///
/// Errors are forwarded without a value; late subscribers get the same outcome.
#[derive(Clone)]
pub struct AsyncSubject<T> {
    hub: Hub<T>,
}

impl<T: Clone + Send + 'static> Default for AsyncSubject<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + 'static> AsyncSubject<T> {
    /// Creates an empty subject.
    pub fn new() -> Self {
        Self {
            hub: Hub::new(Memory::Last(None)),
        }
    }
}

subject_surface!(AsyncSubject);
