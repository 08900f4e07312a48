//! Blocking reorder buffer.
//!
//! Items arrive from a producer in arbitrary order and are handed to a single
//! consumer strictly by sequence number. Storage is a fixed ring of slots:
//! an item with sequence `s` lives at position `s % capacity` and is tagged
//! with generation `s / capacity`, so aliased sequence numbers sharing a
//! position are never confused for one another.
//!
//! # Key Properties
//!
//! - **Overwrite on insert**: a position holds a single generation; a newer
//!   insert silently replaces whatever was there, delivered or not
//! - **Blocking hand-off**: [`ReorderBuffer::take_next`] parks the consumer
//!   until the producer inserts exactly the awaited sequence
//! - **Stable cursor**: the expected sequence cannot move while a take is in
//!   flight, so a wakeup always refers to the sequence being waited on
//!
//! # Locking
//!
//! Two locks, always acquired in this order:
//!
//! 1. the cursor lock, guarding `expected`; held by `take_next` for the whole
//!    call and by `set_expected`
//! 2. the slot table lock, guarding every slot read and write plus the
//!    sequence a blocked consumer is waiting for; paired with `slot_filled`
//!
//! `insert` only ever takes the slot table lock, so it cannot deadlock with a
//! consumer parked while holding the cursor lock.
//!
//! # Capacity
//!
//! Nothing stops the producer from running a full lap ahead of the consumer.
//! When it does, the unread item is lost and the consumer waits for it
//! forever. Size the buffer above the worst producer/consumer skew.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::config::BufferConfig;
use crate::error::{BufferError, TakeError};
use crate::item::{Item, Sequence};

struct Slot<T> {
    item: Item<T>,
    generation: u64,
    delivered: bool,
}

struct SlotTable<T> {
    /// `None` marks a position that was never written; it matches no sequence.
    slots: Box<[Option<Slot<T>>]>,
    /// Sequence the consumer is parked on, if any.
    awaited: Option<Sequence>,
}

impl<T> SlotTable<T> {
    fn matching(&mut self, position: usize, generation: u64) -> Option<&mut Slot<T>> {
        self.slots[position]
            .as_mut()
            .filter(|slot| slot.generation == generation)
    }
}

/// Counters describing the traffic seen by a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    /// Items handed to [`ReorderBuffer::insert`].
    pub inserted: u64,
    /// Items returned to the consumer.
    pub delivered: u64,
    /// Inserts that replaced an item the consumer had not taken yet.
    pub overwritten: u64,
}

/// Fixed-capacity buffer resequencing items for one producer and one consumer.
///
/// Share it between the two sides with an `Arc`.
pub struct ReorderBuffer<T = ()> {
    capacity: usize,
    expected: Mutex<Sequence>,
    table: Mutex<SlotTable<T>>,
    slot_filled: Condvar,
    inserted: AtomicU64,
    delivered: AtomicU64,
    overwritten: AtomicU64,
}

impl<T: Clone> ReorderBuffer<T> {
    /// Creates a buffer with `capacity` empty slots, expecting sequence 0 first.
    pub fn new(capacity: usize) -> Result<Self, BufferError> {
        if capacity == 0 {
            return Err(BufferError::ZeroCapacity);
        }
        let slots: Vec<Option<Slot<T>>> = (0..capacity).map(|_| None).collect();
        Ok(Self {
            capacity,
            expected: Mutex::new(0),
            table: Mutex::new(SlotTable {
                slots: slots.into_boxed_slice(),
                awaited: None,
            }),
            slot_filled: Condvar::new(),
            inserted: AtomicU64::new(0),
            delivered: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        })
    }

    /// Creates a buffer with `config.capacity` slots whose cursor starts at
    /// `config.initial_expected`.
    pub fn from_config(config: &BufferConfig) -> Result<Self, BufferError> {
        let buffer = Self::new(config.capacity)?;
        *buffer.expected.lock() = config.initial_expected;
        Ok(buffer)
    }

    /// Stores `item` at its position, replacing whatever was there.
    ///
    /// Wakes the consumer if it is parked on exactly this sequence. Never
    /// blocks beyond the slot table critical section.
    pub fn insert(&self, item: Item<T>) {
        let sequence = item.sequence();
        let (position, generation) = self.locate(sequence);

        let mut table = self.table.lock();
        let previous = table.slots[position].replace(Slot {
            item,
            generation,
            delivered: false,
        });
        self.inserted.fetch_add(1, Ordering::Relaxed);

        if let Some(previous) = previous {
            let lost = previous.item.sequence();
            if lost != sequence && !previous.delivered {
                self.overwritten.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(sequence, lost, position, "Overwrote undelivered item");
            }
        }
        tracing::trace!(sequence, position, generation, "Inserted item");

        if table.awaited == Some(sequence) {
            tracing::debug!(sequence, "Waking consumer");
            self.slot_filled.notify_one();
        }
    }

    /// Returns the item for the expected sequence and advances the cursor by one.
    ///
    /// The cursor wraps to 0 after delivering `u64::MAX`.
    ///
    /// Blocks until the matching insert arrives, with no timeout. While this
    /// call is in flight `set_expected` and `expected` wait for it to finish.
    pub fn take_next(&self) -> Item<T> {
        let mut expected = self.expected.lock();
        let sequence = *expected;
        let (position, generation) = self.locate(sequence);

        let mut table = self.table.lock();
        loop {
            if let Some(slot) = table.matching(position, generation) {
                slot.delivered = true;
                let item = slot.item.clone();
                table.awaited = None;
                return self.advance(&mut expected, item);
            }
            table.awaited = Some(sequence);
            tracing::debug!(sequence, position, generation, "Waiting for item");
            self.slot_filled.wait(&mut table);
        }
    }

    /// Like [`take_next`](Self::take_next), but gives up after `timeout`.
    ///
    /// On timeout the cursor still points at the awaited sequence. A timeout
    /// too large to be represented as a deadline waits without one.
    pub fn take_next_timeout(&self, timeout: Duration) -> Result<Item<T>, TakeError> {
        let started = Instant::now();
        let deadline = started.checked_add(timeout);
        let mut expected = self.expected.lock();
        let sequence = *expected;
        let (position, generation) = self.locate(sequence);

        let mut table = self.table.lock();
        let mut timed_out = false;
        loop {
            if let Some(slot) = table.matching(position, generation) {
                slot.delivered = true;
                let item = slot.item.clone();
                table.awaited = None;
                return Ok(self.advance(&mut expected, item));
            }
            if timed_out {
                table.awaited = None;
                tracing::debug!(sequence, "Gave up waiting for item");
                return Err(TakeError::TimedOut {
                    sequence,
                    waited: started.elapsed(),
                });
            }
            table.awaited = Some(sequence);
            match deadline {
                Some(deadline) => {
                    timed_out = self.slot_filled.wait_until(&mut table, deadline).timed_out();
                }
                None => self.slot_filled.wait(&mut table),
            }
        }
    }

    /// Returns the expected item only if it is already resident.
    pub fn try_take_next(&self) -> Option<Item<T>> {
        let mut expected = self.expected.lock();
        let (position, generation) = self.locate(*expected);
        let item = {
            let mut table = self.table.lock();
            let slot = table.matching(position, generation)?;
            slot.delivered = true;
            slot.item.clone()
        };
        Some(self.advance(&mut expected, item))
    }
}

impl<T> ReorderBuffer<T> {
    /// Moves the cursor to `sequence`, e.g. to skip ahead.
    pub fn set_expected(&self, sequence: Sequence) {
        let mut expected = self.expected.lock();
        if *expected != sequence {
            tracing::debug!(from = *expected, to = sequence, "Moved expected cursor");
        }
        *expected = sequence;
    }

    /// Next sequence the consumer will receive.
    pub fn expected(&self) -> Sequence {
        *self.expected.lock()
    }

    /// Number of slots, fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Slot index that `sequence` maps to.
    pub fn position_of(&self, sequence: Sequence) -> usize {
        self.locate(sequence).0
    }

    /// Lap around the ring that `sequence` belongs to.
    pub fn generation_of(&self, sequence: Sequence) -> u64 {
        self.locate(sequence).1
    }

    /// Returns true if the item for `sequence` is currently stored.
    pub fn contains(&self, sequence: Sequence) -> bool {
        let (position, generation) = self.locate(sequence);
        self.table.lock().matching(position, generation).is_some()
    }

    /// Snapshot of the traffic counters. Each counter is read independently.
    pub fn stats(&self) -> BufferStats {
        BufferStats {
            inserted: self.inserted.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            overwritten: self.overwritten.load(Ordering::Relaxed),
        }
    }

    fn locate(&self, sequence: Sequence) -> (usize, u64) {
        let capacity = self.capacity as u64;
        ((sequence % capacity) as usize, sequence / capacity)
    }

    fn advance(&self, expected: &mut Sequence, item: Item<T>) -> Item<T> {
        *expected = expected.wrapping_add(1);
        self.delivered.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(sequence = item.sequence(), next = *expected, "Delivered item");
        item
    }
}

impl<T> fmt::Debug for ReorderBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // The cursor is locked for the whole of a blocked take; don't wait on it.
        let expected = self.expected.try_lock().map(|guard| *guard);
        f.debug_struct("ReorderBuffer")
            .field("capacity", &self.capacity)
            .field("expected", &expected)
            .field("stats", &self.stats())
            .finish()
    }
}
