use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open interval of offsets `[start, end)` dispatched as one unit of work.
///
/// Serialized as a two-element array `[start, end]` in checkpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "(u64, u64)", into = "(u64, u64)")]
pub struct OffsetRange {
    pub start: u64,
    pub end: u64,
}

impl OffsetRange {
    pub fn new(start: u64, end: u64) -> Self {
        debug_assert!(start <= end, "range start {} beyond end {}", start, end);
        Self { start, end }
    }

    /// Number of offsets covered.
    pub fn width(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0
    }

    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.start && offset < self.end
    }

    pub fn offsets(&self) -> std::ops::Range<u64> {
        self.start..self.end
    }
}

impl From<(u64, u64)> for OffsetRange {
    fn from((start, end): (u64, u64)) -> Self {
        Self { start, end }
    }
}

impl From<OffsetRange> for (u64, u64) {
    fn from(range: OffsetRange) -> Self {
        (range.start, range.end)
    }
}

impl fmt::Display for OffsetRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}
