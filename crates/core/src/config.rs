use std::{
    path::{Path, PathBuf},
    sync::atomic::AtomicBool,
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::level_filters::LevelFilter;

use crate::item::Sequence;

/// Default number of slots in the reorder buffer.
pub const DEFAULT_CAPACITY: usize = 100;
/// Default pause between two producer inserts.
pub const DEFAULT_PRODUCER_INTERVAL: Duration = Duration::from_millis(100);

/// Shape of a [`ReorderBuffer`](crate::ReorderBuffer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Number of slots. Must exceed how far the producer can run ahead of
    /// the consumer, otherwise unread items get overwritten.
    pub capacity: usize,
    /// Sequence the consumer expects first.
    pub initial_expected: Sequence,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            initial_expected: 0,
        }
    }
}

/// Settings for the demo producer/consumer pair.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    #[serde(rename = "producer_interval_ms")]
    pub producer_interval: Duration,
    /// The consumer stops once it has received this sequence.
    /// Defaults to the last position of the first lap.
    pub final_sequence: Option<Sequence>,
    /// Seed for the producer's random sequence numbers.
    pub seed: Option<u64>,
    pub buffer: BufferConfig,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            producer_interval: DEFAULT_PRODUCER_INTERVAL,
            final_sequence: None,
            seed: None,
            buffer: BufferConfig::default(),
        }
    }
}

impl HarnessConfig {
    pub fn final_sequence(&self) -> Sequence {
        self.final_sequence.unwrap_or_else(|| {
            let lap = (self.buffer.capacity as Sequence).saturating_sub(1);
            self.buffer.initial_expected.saturating_add(lap)
        })
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).context("invalid harness configuration")
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "Found configuration file");
        Self::from_toml_str(&content)
    }

    fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            self.buffer.capacity > 0,
            "buffer capacity must be greater than zero"
        );
        anyhow::ensure!(
            self.final_sequence() >= self.buffer.initial_expected,
            "final sequence {} precedes the initial expected sequence {}",
            self.final_sequence(),
            self.buffer.initial_expected
        );
        // The producer never draws past one lap beyond the initial sequence.
        let last_produced = self
            .buffer
            .initial_expected
            .saturating_add(self.buffer.capacity as Sequence - 1);
        anyhow::ensure!(
            self.final_sequence() <= last_produced,
            "final sequence {} is never produced; the producer stops at {}",
            self.final_sequence(),
            last_produced
        );
        Ok(())
    }
}

/// Command line arguments. Anything given here overrides the config file.
#[derive(clap::Parser, Debug, Clone, Default)]
#[command(name = "resequencer")]
#[command(about = "Feed randomly ordered items through a reorder buffer and print them in order")]
pub struct ConfigArgs {
    /// TOML file holding a `HarnessConfig`.
    #[arg(long, env = "RESEQUENCER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Number of slots in the reorder buffer.
    #[arg(long, env = "RESEQUENCER_CAPACITY")]
    pub capacity: Option<usize>,

    /// Sequence the consumer expects first.
    #[arg(long)]
    pub initial_expected: Option<Sequence>,

    /// Milliseconds between producer inserts.
    #[arg(long, env = "RESEQUENCER_INTERVAL_MS")]
    pub interval_ms: Option<u64>,

    /// Stop after this sequence has been delivered.
    #[arg(long)]
    pub final_sequence: Option<Sequence>,

    /// Seed the producer for reproducible runs.
    #[arg(long, env = "RESEQUENCER_SEED")]
    pub seed: Option<u64>,

    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<LevelFilter>,
}

impl ConfigArgs {
    pub fn build(self) -> anyhow::Result<HarnessConfig> {
        let mut config = match self.config.as_deref() {
            Some(path) => HarnessConfig::load(path)?,
            None => HarnessConfig::default(),
        };

        if let Some(capacity) = self.capacity {
            config.buffer.capacity = capacity;
        }
        if let Some(initial_expected) = self.initial_expected {
            config.buffer.initial_expected = initial_expected;
        }
        if let Some(interval_ms) = self.interval_ms {
            config.producer_interval = Duration::from_millis(interval_ms);
        }
        if self.final_sequence.is_some() {
            config.final_sequence = self.final_sequence;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }

        config.validate()?;
        Ok(config)
    }
}

pub fn set_logger(level: Option<LevelFilter>) {
    #[cfg(feature = "trace")]
    {
        static LOGGER_SET: AtomicBool = AtomicBool::new(false);
        if LOGGER_SET
            .compare_exchange(
                false,
                true,
                std::sync::atomic::Ordering::Release,
                std::sync::atomic::Ordering::SeqCst,
            )
            .is_err()
        {
            return;
        }

        if let Err(err) = crate::tracing::tracer::init_tracer(level) {
            eprintln!("failed tracing initialization: {err}");
        }
    }
    #[cfg(not(feature = "trace"))]
    let _ = level;
}
