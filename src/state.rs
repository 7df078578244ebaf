use crate::batch_sizer::BatchSizer;
use crate::search_state::SearchState;
use crate::ExpeditionError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Inclusive range of search indices handled by one expedition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub first_index: u64,
    pub last_index: u64,
}

impl IndexRange {
    pub fn new(first_index: u64, last_index: u64) -> Self {
        Self {
            first_index,
            last_index,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.first_index > self.last_index
    }

    /// Number of indices, or `None` when the count does not fit in `usize`.
    pub fn checked_len(&self) -> Option<usize> {
        if self.is_empty() {
            return Some(0);
        }
        (self.last_index - self.first_index)
            .checked_add(1)
            .and_then(|count| usize::try_from(count).ok())
    }

    pub fn len(&self) -> usize {
        self.checked_len().unwrap_or(usize::MAX)
    }

    pub fn contains(&self, index: u64) -> bool {
        index >= self.first_index && index <= self.last_index
    }

    pub fn indices(&self) -> std::ops::RangeInclusive<u64> {
        self.first_index..=self.last_index
    }
}

impl fmt::Display for IndexRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "F({})..F({})", self.first_index, self.last_index)
    }
}

/// Everything needed to resume an expedition. Persisted in full after every result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpeditionState {
    pub range: IndexRange,
    /// index -> smallest qualifying offset
    pub answers: BTreeMap<u64, u64>,
    /// index -> cumulative seconds when the answer was confirmed
    pub answer_times: BTreeMap<u64, f64>,
    /// Active searches only; an index leaves this map when it completes.
    pub searches: BTreeMap<u64, SearchState>,
    pub recent_batch_timings: Vec<f64>,
    pub current_batch_width: u64,
    pub total_elapsed_seconds: f64,
}

impl ExpeditionState {
    /// Fresh state with one search per index, starting at `lower_bound(index)`.
    pub fn fresh<F>(range: IndexRange, initial_width: u64, lower_bound: F) -> Self
    where
        F: Fn(u64) -> u64,
    {
        let searches = range
            .indices()
            .map(|index| (index, SearchState::new(lower_bound(index))))
            .collect();
        Self {
            range,
            answers: BTreeMap::new(),
            answer_times: BTreeMap::new(),
            searches,
            recent_batch_timings: Vec::new(),
            current_batch_width: initial_width,
            total_elapsed_seconds: 0.0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.answers.len() >= self.range.len()
    }

    pub fn remaining(&self) -> usize {
        self.range.len().saturating_sub(self.answers.len())
    }

    /// Copy the sizer's window and width into the persisted fields.
    pub fn capture_sizer(&mut self, sizer: &BatchSizer) {
        self.recent_batch_timings = sizer.samples();
        self.current_batch_width = sizer.width();
    }

    /// Cross-check the maps against each other and the range. Used on
    /// state read back from disk.
    pub fn validate(&self) -> Result<(), ExpeditionError> {
        if self.range.checked_len().is_none() {
            return Err(ExpeditionError::Checkpoint(format!("index range {} is too large", self.range)));
        }
        if let Some(index) = self
            .answers
            .keys()
            .chain(self.answer_times.keys())
            .chain(self.searches.keys())
            .find(|&&index| !self.range.contains(index))
        {
            return Err(ExpeditionError::Checkpoint(format!(
                "index {} lies outside {}",
                index, self.range
            )));
        }
        if let Some((index, _)) = self.searches.iter().find(|(_, search)| !search.is_consistent()) {
            return Err(ExpeditionError::Checkpoint(format!(
                "inconsistent search state for index {}",
                index
            )));
        }
        if let Some(index) = self.searches.keys().find(|index| self.answers.contains_key(index)) {
            return Err(ExpeditionError::Checkpoint(format!(
                "index {} is both active and answered",
                index
            )));
        }
        Ok(())
    }

    /// Record a confirmed answer and drop the index from active bookkeeping.
    pub fn finalize(&mut self, index: u64, answer: u64, elapsed_seconds: f64) {
        self.searches.remove(&index);
        self.answers.insert(index, answer);
        self.answer_times.insert(index, elapsed_seconds);
    }
}
