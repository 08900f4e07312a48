//! Resequencing of out-of-order items through a fixed-capacity ring.
//!
//! A producer [`insert`](ReorderBuffer::insert)s items tagged with sequence
//! numbers in whatever order they arrive; a consumer calls
//! [`take_next`](ReorderBuffer::take_next) and receives them strictly in
//! sequence, blocking until the next one shows up.
//!
//! ```
//! use std::sync::Arc;
//! use std::thread;
//!
//! use resequencer::{Item, ReorderBuffer};
//!
//! let buffer = Arc::new(ReorderBuffer::new(4).unwrap());
//! let producer = {
//!     let buffer = Arc::clone(&buffer);
//!     thread::spawn(move || {
//!         for seq in [2, 0, 3, 1] {
//!             buffer.insert(Item::new(seq, format!("payload {seq}")));
//!         }
//!     })
//! };
//!
//! let taken: Vec<_> = (0..4).map(|_| buffer.take_next().sequence()).collect();
//! assert_eq!(taken, [0, 1, 2, 3]);
//! producer.join().unwrap();
//! ```

/// The reorder buffer itself.
mod buffer;
pub use buffer::{BufferStats, ReorderBuffer};

/// Buffer and harness configuration, command line arguments and logger setup.
pub mod config;

mod error;
pub use error::{BufferError, TakeError};

/// Demo producer/consumer loops.
pub mod harness;

mod item;
pub use item::{Item, Sequence};

/// Tracing and logging infrastructure.
pub mod tracing;
