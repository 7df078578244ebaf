use crate::ExpeditionError;
use std::collections::VecDeque;
use std::time::Duration;

pub const GROW_FACTOR: f64 = 1.5;
pub const SHRINK_FACTOR: f64 = 0.7;

/// Samples required before the width is adjusted.
const MIN_SAMPLES: usize = 3;

/// Bounds and target for adaptive batch sizing.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSizerConfig {
    pub initial_width: u64,
    pub min_width: u64,
    pub max_width: u64,
    pub target: Duration,
    pub window: usize,
}

impl Default for BatchSizerConfig {
    fn default() -> Self {
        Self {
            initial_width: 100,
            min_width: 10,
            max_width: 5000,
            target: Duration::from_secs(5),
            window: 20,
        }
    }
}

impl BatchSizerConfig {
    pub fn validate(&self) -> Result<(), ExpeditionError> {
        if self.min_width == 0 {
            return Err(ExpeditionError::Config("min batch width must be at least 1".into()));
        }
        if self.min_width > self.max_width {
            return Err(ExpeditionError::Config(format!(
                "min batch width {} exceeds max batch width {}",
                self.min_width, self.max_width
            )));
        }
        if self.target.is_zero() {
            return Err(ExpeditionError::Config("target batch time must be positive".into()));
        }
        if self.window < MIN_SAMPLES {
            return Err(ExpeditionError::Config(format!(
                "timing window must hold at least {} samples",
                MIN_SAMPLES
            )));
        }
        Ok(())
    }
}

/// Proposes the next batch width from a moving average of time per offset.
///
/// The width is compared through the *expected* time at the current width,
/// so samples from batches issued before a size change still count.
#[derive(Debug, Clone)]
pub struct BatchSizer {
    config: BatchSizerConfig,
    current_width: u64,
    samples: VecDeque<f64>,
}

impl BatchSizer {
    pub fn new(config: BatchSizerConfig) -> Self {
        let current_width = config.initial_width.clamp(config.min_width, config.max_width);
        let samples = VecDeque::with_capacity(config.window);
        Self {
            config,
            current_width,
            samples,
        }
    }

    /// Rebuild from a checkpointed width and timing window.
    pub fn restore(config: BatchSizerConfig, width: u64, samples: &[f64]) -> Self {
        let mut sizer = Self::new(config);
        sizer.current_width = width.clamp(sizer.config.min_width, sizer.config.max_width);
        let skip = samples.len().saturating_sub(sizer.config.window);
        sizer.samples.extend(samples.iter().skip(skip).copied());
        sizer
    }

    pub fn width(&self) -> u64 {
        self.current_width
    }

    pub fn samples(&self) -> Vec<f64> {
        self.samples.iter().copied().collect()
    }

    pub fn config(&self) -> &BatchSizerConfig {
        &self.config
    }

    /// Average seconds per offset over the window, if any samples exist.
    pub fn average_time_per_offset(&self) -> Option<f64> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.iter().sum::<f64>() / self.samples.len() as f64)
        }
    }

    /// Feed one finished batch of `width` offsets that took `elapsed`.
    pub fn record_sample(&mut self, elapsed: Duration, width: u64) {
        let per_offset = elapsed.as_secs_f64() / width.max(1) as f64;
        if self.samples.len() == self.config.window {
            self.samples.pop_front();
        }
        self.samples.push_back(per_offset);

        if self.samples.len() < MIN_SAMPLES {
            return;
        }
        let Some(average) = self.average_time_per_offset() else {
            return;
        };

        let expected = average * self.current_width as f64;
        let target = self.config.target.as_secs_f64();

        if expected < target * 0.5 {
            let grown = ((self.current_width as f64 * GROW_FACTOR) as u64).max(self.current_width + 1);
            self.current_width = grown.min(self.config.max_width);
        } else if expected > target * 1.5 {
            let shrunk = (self.current_width as f64 * SHRINK_FACTOR) as u64;
            self.current_width = shrunk.max(self.config.min_width);
        }
    }
}
