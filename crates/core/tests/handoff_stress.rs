//! Producer/consumer threads hammering one shared buffer.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use resequencer::config::{BufferConfig, HarnessConfig};
use resequencer::{harness, Item, ReorderBuffer};
use testresult::TestResult;

use common::join_promptly;

const CAPACITY: usize = 64;
const WINDOW: u64 = 16;
const TOTAL: u64 = 20_000;

#[test_log::test]
fn long_run_delivers_strictly_increasing_stream() -> TestResult {
    let buffer = Arc::new(ReorderBuffer::<Bytes>::new(CAPACITY)?);
    // Mirrors the consumer's cursor; the producer must not read `expected()`
    // itself because that blocks while the consumer waits.
    let consumed = Arc::new(AtomicU64::new(0));

    let producer = {
        let buffer = Arc::clone(&buffer);
        let consumed = Arc::clone(&consumed);
        thread::spawn(move || {
            let mut rng = SmallRng::seed_from_u64(TOTAL);
            for start in (0..TOTAL).step_by(WINDOW as usize) {
                // Stay well inside one lap of the consumer.
                while start + WINDOW > consumed.load(Ordering::Acquire) + CAPACITY as u64 {
                    thread::yield_now();
                }
                let mut window: Vec<u64> = (start..start + WINDOW).collect();
                window.shuffle(&mut rng);
                for seq in window {
                    buffer.insert(Item::new(seq, Bytes::from(seq.to_be_bytes().to_vec())));
                }
            }
        })
    };

    for expected in 0..TOTAL {
        let item = buffer.take_next();
        assert_eq!(item.sequence(), expected);
        assert_eq!(&item.payload()[..], expected.to_be_bytes());
        consumed.store(expected + 1, Ordering::Release);
    }
    join_promptly(producer);

    let stats = buffer.stats();
    assert_eq!(stats.inserted, TOTAL);
    assert_eq!(stats.delivered, TOTAL);
    assert_eq!(stats.overwritten, 0);
    Ok(())
}

#[test_log::test]
fn skipping_ahead_between_takes() -> TestResult {
    let buffer = Arc::new(ReorderBuffer::<()>::new(8)?);
    let producer = {
        let buffer = Arc::clone(&buffer);
        thread::spawn(move || {
            for seq in (0..40).rev() {
                buffer.insert(Item::bare(seq));
                thread::sleep(Duration::from_micros(50));
            }
        })
    };
    join_promptly(producer);

    // Only the last lap (0..8) survived the reverse-order inserts.
    let mut taken = Vec::new();
    for start in [0, 4] {
        buffer.set_expected(start);
        for _ in 0..2 {
            taken.push(buffer.take_next().sequence());
        }
    }
    assert_eq!(taken, vec![0, 1, 4, 5]);
    assert!(buffer.stats().overwritten > 0);
    Ok(())
}

#[test_log::test]
fn harness_run_reaches_final_sequence() -> TestResult {
    let config = HarnessConfig {
        producer_interval: Duration::from_micros(100),
        final_sequence: Some(19),
        seed: Some(99),
        buffer: BufferConfig {
            capacity: 10,
            initial_expected: 10,
        },
    };
    let report = harness::run(&config)?;
    assert_eq!(report.delivered, (10..20).collect::<Vec<_>>());
    assert_eq!(report.stats.delivered, 10);
    Ok(())
}
