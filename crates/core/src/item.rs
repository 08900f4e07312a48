use std::fmt;

use serde::{Deserialize, Serialize};

/// Position of an item in the intended output order.
///
/// 64 bits are wide enough that a producer assigning one number per
/// nanosecond would need centuries to wrap.
pub type Sequence = u64;

/// An immutable value tagged with its sequence number.
///
/// The payload is opaque to the reorder buffer; only [`Item::sequence`]
/// decides where the item is stored and when it is delivered.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item<T = ()> {
    sequence: Sequence,
    payload: T,
}

impl Item<()> {
    /// An item carrying no payload.
    pub fn bare(sequence: Sequence) -> Self {
        Self {
            sequence,
            payload: (),
        }
    }
}

impl<T> Item<T> {
    pub fn new(sequence: Sequence, payload: T) -> Self {
        Self { sequence, payload }
    }

    pub fn sequence(&self) -> Sequence {
        self.sequence
    }

    pub fn payload(&self) -> &T {
        &self.payload
    }

    pub fn into_payload(self) -> T {
        self.payload
    }
}

impl<T> fmt::Display for Item<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "item #{}", self.sequence)
    }
}
