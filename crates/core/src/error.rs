use std::time::Duration;

use crate::item::Sequence;

/// Error returned when a [`ReorderBuffer`](crate::ReorderBuffer) cannot be built.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    /// A buffer needs at least one slot.
    #[error("reorder buffer capacity must be greater than zero")]
    ZeroCapacity,
}

/// Error returned by the bounded variants of `take_next`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TakeError {
    /// The expected item did not arrive in time. The cursor is left untouched.
    #[error("sequence {sequence} was not inserted within {waited:?}")]
    TimedOut { sequence: Sequence, waited: Duration },
}
