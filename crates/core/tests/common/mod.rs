//! Common test utilities shared across integration tests.
//!
//! These utilities are shared across tests and may not all be used in every test file.
#![allow(dead_code)]

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use resequencer::{Item, ReorderBuffer, Sequence};

/// Long enough for a consumer thread to reach its wait under normal load.
pub const SETTLE: Duration = Duration::from_millis(50);

/// Upper bound for anything that is supposed to happen "promptly".
pub const PROMPT: Duration = Duration::from_secs(5);

/// Runs `take_next` on a dedicated consumer thread.
pub fn spawn_take<T>(buffer: &Arc<ReorderBuffer<T>>) -> JoinHandle<Item<T>>
where
    T: Clone + Send + 'static,
{
    let buffer = Arc::clone(buffer);
    thread::Builder::new()
        .name("consumer".into())
        .spawn(move || buffer.take_next())
        .expect("spawn consumer")
}

/// Joins `handle`, failing the test if it has not finished within [`PROMPT`].
pub fn join_promptly<R>(handle: JoinHandle<R>) -> R {
    let started = Instant::now();
    while !handle.is_finished() {
        assert!(started.elapsed() < PROMPT, "thread did not finish in time");
        thread::sleep(Duration::from_millis(1));
    }
    handle.join().expect("thread panicked")
}

pub fn sequences<T>(items: &[Item<T>]) -> Vec<Sequence> {
    items.iter().map(Item::sequence).collect()
}
