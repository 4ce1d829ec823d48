use std::{error::Error, fmt};

/// An error returned when attempting to enqueue the reserved empty task
/// value.
///
/// The empty value doubles as the internal shutdown signal for worker
/// threads, so it can never be submitted as an ordinary task. The queue is
/// left untouched when this error is returned.
pub struct NilTaskError(());

impl NilTaskError {
    pub(crate) fn new() -> Self {
        Self(())
    }
}

impl Error for NilTaskError {}

impl fmt::Debug for NilTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NilTaskError")
    }
}

impl fmt::Display for NilTaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("the empty task value is reserved as the shutdown signal")
    }
}
