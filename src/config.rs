use crate::batch_sizer::BatchSizerConfig;
use crate::checkpoint::DEFAULT_CHECKPOINT_FILE;
use crate::oracle::MAX_ROUNDS;
use crate::state::IndexRange;
use crate::ExpeditionError;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_ROUNDS: u32 = 25;

/// Settings for one expedition run.
#[derive(Debug, Clone)]
pub struct ExpeditionConfig {
    pub range: IndexRange,
    /// Pool size; `None` uses the available parallelism.
    pub workers: Option<usize>,
    pub checkpoint_path: PathBuf,
    pub resume: bool,
    /// Optional markdown table of worker assignments per answer.
    pub log_path: Option<PathBuf>,
    pub sizer: BatchSizerConfig,
    pub rounds: u32,
    /// How long the orchestrator waits for a result before re-checking the stop signal.
    pub poll_interval: Duration,
    /// How long an idle worker waits for a task before re-checking the stop flag.
    pub worker_poll_interval: Duration,
    pub progress_interval: Duration,
}

impl Default for ExpeditionConfig {
    fn default() -> Self {
        Self {
            range: IndexRange::new(1, 1),
            workers: None,
            checkpoint_path: PathBuf::from(DEFAULT_CHECKPOINT_FILE),
            resume: false,
            log_path: None,
            sizer: BatchSizerConfig::default(),
            rounds: DEFAULT_ROUNDS,
            poll_interval: Duration::from_millis(500),
            worker_poll_interval: Duration::from_secs(2),
            progress_interval: Duration::from_secs(10),
        }
    }
}

impl ExpeditionConfig {
    pub fn new(range: IndexRange) -> Self {
        Self {
            range,
            ..Self::default()
        }
    }

    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
    }

    pub fn validate(&self) -> Result<(), ExpeditionError> {
        if self.range.is_empty() {
            return Err(ExpeditionError::Config(format!(
                "empty index range: first {} is after last {}",
                self.range.first_index, self.range.last_index
            )));
        }
        if self.range.checked_len().is_none() {
            return Err(ExpeditionError::Config(format!("index range {} is too large", self.range)));
        }
        if self.rounds == 0 || self.rounds > MAX_ROUNDS {
            return Err(ExpeditionError::Config(format!(
                "rounds must be within 1..={}, got {}",
                MAX_ROUNDS, self.rounds
            )));
        }
        if self.workers == Some(0) {
            return Err(ExpeditionError::Config("at least one worker is required".into()));
        }
        if self.poll_interval.is_zero() || self.worker_poll_interval.is_zero() {
            return Err(ExpeditionError::Config("poll intervals must be positive".into()));
        }
        self.sizer.validate()
    }
}
