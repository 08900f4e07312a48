//! Demo producer and consumer driving a shared [`ReorderBuffer`].
//!
//! The producer inserts items with random sequence numbers drawn from one lap
//! of the buffer on a fixed interval; the consumer pulls them back out in
//! order until it sees the final sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::buffer::{BufferStats, ReorderBuffer};
use crate::config::HarnessConfig;
use crate::item::{Item, Sequence};

/// Outcome of a harness run.
#[derive(Debug, Clone)]
pub struct HarnessReport {
    /// Sequences in the order the consumer received them.
    pub delivered: Vec<Sequence>,
    /// Number of inserts the producer performed.
    pub produced: u64,
    pub stats: BufferStats,
    pub elapsed: Duration,
}

/// A running producer thread.
pub struct ProducerHandle {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<u64>,
}

impl ProducerHandle {
    /// Starts inserting random sequences from `range_start..range_start + buffer.capacity()`.
    pub fn spawn(
        buffer: Arc<ReorderBuffer<Bytes>>,
        range_start: Sequence,
        interval: Duration,
        seed: Option<u64>,
    ) -> anyhow::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("producer".into())
                .spawn(move || produce(&buffer, range_start, interval, seed, &stop))?
        };
        Ok(Self { stop, thread })
    }

    /// Signals the producer and waits for it, returning how many items it inserted.
    pub fn stop(self) -> anyhow::Result<u64> {
        self.stop.store(true, Ordering::Release);
        self.thread.thread().unpark();
        self.thread
            .join()
            .map_err(|_| anyhow::anyhow!("producer thread panicked"))
    }
}

fn produce(
    buffer: &ReorderBuffer<Bytes>,
    range_start: Sequence,
    interval: Duration,
    seed: Option<u64>,
    stop: &AtomicBool,
) -> u64 {
    let mut rng = match seed {
        Some(seed) => SmallRng::seed_from_u64(seed),
        None => SmallRng::from_entropy(),
    };
    let lap = buffer.capacity() as Sequence;
    let mut produced = 0;

    while !stop.load(Ordering::Acquire) {
        let sequence = range_start.saturating_add(rng.gen_range(0..lap));
        buffer.insert(Item::new(sequence, Bytes::from(format!("block {sequence}"))));
        produced += 1;
        tracing::debug!(sequence, "Produced");
        // Woken early by `ProducerHandle::stop`.
        thread::park_timeout(interval);
    }
    produced
}

/// Takes items in order until `final_sequence` has been delivered.
pub fn consume_until<T: Clone>(
    buffer: &ReorderBuffer<T>,
    final_sequence: Sequence,
) -> Vec<Sequence> {
    let mut delivered = Vec::new();
    loop {
        let item = buffer.take_next();
        let sequence = item.sequence();
        tracing::info!(sequence, "Out");
        delivered.push(sequence);
        if sequence == final_sequence {
            return delivered;
        }
    }
}

/// Runs a producer thread against a consumer on the calling thread.
///
/// Blocks until the final sequence is delivered. If the buffer is too small
/// for the producer's lead the run may never finish.
pub fn run(config: &HarnessConfig) -> anyhow::Result<HarnessReport> {
    let started = Instant::now();
    let buffer = Arc::new(ReorderBuffer::from_config(&config.buffer)?);
    let final_sequence = config.final_sequence();
    tracing::info!(
        capacity = config.buffer.capacity,
        first = config.buffer.initial_expected,
        last = final_sequence,
        "Starting harness"
    );

    let producer = ProducerHandle::spawn(
        Arc::clone(&buffer),
        config.buffer.initial_expected,
        config.producer_interval,
        config.seed,
    )?;
    let delivered = consume_until(&buffer, final_sequence);
    let produced = producer.stop()?;

    Ok(HarnessReport {
        delivered,
        produced,
        stats: buffer.stats(),
        elapsed: started.elapsed(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BufferConfig;

    #[test]
    fn test_consume_until_stops_at_final() {
        let buffer = ReorderBuffer::<()>::new(8).unwrap();
        for seq in [3, 1, 0, 2, 4] {
            buffer.insert(Item::bare(seq));
        }
        assert_eq!(consume_until(&buffer, 2), vec![0, 1, 2]);
        assert_eq!(buffer.expected(), 3);
    }

    #[test]
    fn test_producer_stays_within_one_lap() {
        let buffer = Arc::new(ReorderBuffer::<Bytes>::new(4).unwrap());
        buffer.set_expected(100);
        let producer =
            ProducerHandle::spawn(Arc::clone(&buffer), 100, Duration::ZERO, Some(7)).unwrap();
        thread::sleep(Duration::from_millis(20));
        let produced = producer.stop().unwrap();
        assert!(produced > 0);
        assert_eq!(buffer.stats().inserted, produced);
        // Sequences outside 100..104 are never produced.
        assert!((100..104).any(|seq| buffer.contains(seq)));
        assert!(!(0..100).any(|seq| buffer.contains(seq)));
    }

    #[test]
    fn test_run_small_buffer() {
        let config = HarnessConfig {
            producer_interval: Duration::from_micros(200),
            final_sequence: None,
            seed: Some(1),
            buffer: BufferConfig {
                capacity: 6,
                initial_expected: 0,
            },
        };
        let report = run(&config).unwrap();
        assert_eq!(report.delivered, vec![0, 1, 2, 3, 4, 5]);
        assert_eq!(report.stats.delivered, 6);
        assert!(report.produced >= 6);
    }
}
