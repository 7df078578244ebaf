use crate::range::OffsetRange;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// In-flight ranges for one index. Rarely more than one per worker.
pub type PendingRanges = SmallVec<[OffsetRange; 8]>;

/// What happened when a batch result was applied to a search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The range was not pending (duplicate dispatch or already finished search).
    Stale,
    /// Bookkeeping updated, search still open.
    Pending,
    /// Every offset below `answer` is confirmed non-qualifying.
    Completed { answer: u64 },
}

/// Search bookkeeping for a single index.
///
/// Holds `lower_start <= completed_boundary <= next_offset` at all times.
/// Ranges are reserved contiguously from `next_offset`, so every offset in
/// `[lower_start, next_offset)` is either resolved or inside a pending range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchState {
    lower_start: u64,
    next_offset: u64,
    completed_boundary: u64,
    pending_ranges: PendingRanges,
    best_candidate: Option<u64>,
    completed: bool,
}

impl SearchState {
    pub fn new(lower_start: u64) -> Self {
        Self {
            lower_start,
            next_offset: lower_start,
            completed_boundary: lower_start,
            pending_ranges: PendingRanges::new(),
            best_candidate: None,
            completed: false,
        }
    }

    pub fn lower_start(&self) -> u64 {
        self.lower_start
    }

    pub fn next_offset(&self) -> u64 {
        self.next_offset
    }

    pub fn completed_boundary(&self) -> u64 {
        self.completed_boundary
    }

    pub fn pending_ranges(&self) -> &[OffsetRange] {
        &self.pending_ranges
    }

    pub fn best_candidate(&self) -> Option<u64> {
        self.best_candidate
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    /// True while fresh offsets below the best candidate remain unassigned.
    pub fn needs_fresh_range(&self) -> bool {
        !self.completed && self.best_candidate.map_or(true, |best| self.next_offset < best)
    }

    /// True while there is anything left to dispatch or resolve.
    pub fn needs_work(&self) -> bool {
        self.needs_fresh_range() || (!self.completed && !self.pending_ranges.is_empty())
    }

    /// Structural check used when reading state back from disk.
    pub fn is_consistent(&self) -> bool {
        let ordered = self.lower_start <= self.completed_boundary
            && self.completed_boundary <= self.next_offset;
        let ranges_inside = self.pending_ranges.iter().all(|range| {
            range.start <= range.end
                && range.start >= self.completed_boundary
                && range.end <= self.next_offset
        });
        // A finished search always has an answer, and an open one cannot
        // have its best candidate already confirmed.
        let completion_agrees = match self.best_candidate {
            None => !self.completed,
            Some(best) => self.completed || self.completed_boundary < best,
        };
        ordered && ranges_inside && completion_agrees
    }

    /// Reserve the next `width` offsets starting at `next_offset`.
    ///
    /// Returns `None` once the search is completed or every offset below the
    /// best candidate has been handed out. The reserved range is clipped at
    /// the best candidate since nothing past it can improve the answer.
    pub fn reserve_range(&mut self, width: u64) -> Option<OffsetRange> {
        if !self.needs_fresh_range() {
            return None;
        }

        let start = self.next_offset;
        let mut end = start.saturating_add(width.max(1));
        if let Some(best) = self.best_candidate {
            end = end.min(best);
        }

        let range = OffsetRange::new(start, end);
        self.next_offset = end;
        self.pending_ranges.push(range);
        Some(range)
    }

    /// Lowest pending range for which `is_claimed` returns false.
    pub fn first_unclaimed<F>(&self, is_claimed: F) -> Option<OffsetRange>
    where
        F: Fn(&OffsetRange) -> bool,
    {
        if self.completed {
            return None;
        }
        self.pending_ranges
            .iter()
            .filter(|range| !is_claimed(range))
            .min_by_key(|range| range.start)
            .copied()
    }

    /// Apply the outcome of testing `range`.
    ///
    /// A result for a range that is no longer pending is ignored so that
    /// re-dispatched ranges can never corrupt the bookkeeping.
    pub fn record_result(&mut self, range: OffsetRange, found: Option<u64>) -> RecordOutcome {
        if self.completed {
            return RecordOutcome::Stale;
        }
        let Some(position) = self.pending_ranges.iter().position(|pending| *pending == range) else {
            return RecordOutcome::Stale;
        };
        self.pending_ranges.remove(position);

        if let Some(offset) = found {
            debug_assert!(range.contains(offset), "offset {} outside {}", offset, range);
            if self.best_candidate.map_or(true, |best| offset < best) {
                self.best_candidate = Some(offset);
            }
        }

        // Anything below the earliest unresolved range is confirmed.
        let boundary = self
            .pending_ranges
            .iter()
            .map(|pending| pending.start)
            .min()
            .unwrap_or(self.next_offset);
        debug_assert!(boundary >= self.completed_boundary);
        self.completed_boundary = boundary;

        match self.best_candidate {
            Some(best) if self.completed_boundary >= best => {
                self.completed = true;
                self.pending_ranges.clear();
                self.completed_boundary = self.next_offset;
                RecordOutcome::Completed { answer: best }
            }
            _ => RecordOutcome::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn reserve_all(state: &mut SearchState, widths: &[u64]) -> Vec<OffsetRange> {
        widths
            .iter()
            .map(|&w| state.reserve_range(w).unwrap())
            .collect()
    }

    #[test]
    fn test_reserve_advances_frontier() {
        let mut state = SearchState::new(2);
        let a = state.reserve_range(3).unwrap();
        let b = state.reserve_range(4).unwrap();
        assert_eq!(a, OffsetRange::new(2, 5));
        assert_eq!(b, OffsetRange::new(5, 9));
        assert_eq!(state.next_offset(), 9);
        assert_eq!(state.pending_ranges(), &[a, b]);
        assert_eq!(state.completed_boundary(), 2);
    }

    #[test]
    fn test_zero_width_reserves_one_offset() {
        let mut state = SearchState::new(7);
        assert_eq!(state.reserve_range(0), Some(OffsetRange::new(7, 8)));
    }

    #[test]
    fn test_out_of_order_completion_waits_for_gap() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[10, 10, 10]);

        // Later range finds a candidate first.
        assert_eq!(state.record_result(ranges[1], Some(14)), RecordOutcome::Pending);
        assert_eq!(state.best_candidate(), Some(14));
        assert_eq!(state.completed_boundary(), 0);
        assert!(!state.is_completed());

        // Range beyond the candidate resolves; still blocked by [0, 10).
        assert_eq!(state.record_result(ranges[2], None), RecordOutcome::Pending);
        assert_eq!(state.completed_boundary(), 0);

        assert_eq!(
            state.record_result(ranges[0], None),
            RecordOutcome::Completed { answer: 14 }
        );
        assert!(state.is_completed());
        assert!(state.pending_ranges().is_empty());
        assert_eq!(state.completed_boundary(), state.next_offset());
    }

    #[test]
    fn test_smaller_candidate_replaces_best() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[5, 5]);
        state.record_result(ranges[1], Some(7));
        let outcome = state.record_result(ranges[0], Some(3));
        assert_eq!(outcome, RecordOutcome::Completed { answer: 3 });
    }

    #[test]
    fn test_no_completion_while_lower_range_pending() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[4, 4, 4]);
        state.record_result(ranges[2], Some(9));
        state.record_result(ranges[1], None);
        assert!(!state.is_completed());
        assert!(state.pending_ranges().iter().any(|r| r.start < 9));
    }

    #[test]
    fn test_reserve_clipped_by_best_candidate() {
        let mut state = SearchState::new(0);
        let first = state.reserve_range(4).unwrap();
        let second = state.reserve_range(4).unwrap();
        state.record_result(second, Some(5));

        // Frontier is already past the candidate: nothing fresh to hand out.
        assert!(!state.needs_fresh_range());
        assert_eq!(state.reserve_range(4), None);
        assert!(state.needs_work());

        assert_eq!(state.record_result(first, None), RecordOutcome::Completed { answer: 5 });
        assert!(!state.needs_work());
    }

    #[test]
    fn test_candidate_found_before_frontier_reaches_it_clips_next_reserve() {
        let mut state = SearchState::new(0);
        let a = state.reserve_range(10).unwrap();
        let b = state.reserve_range(10).unwrap();
        // Candidate at 12 found while [0,10) still running.
        state.record_result(b, Some(12));
        // Frontier (20) is beyond the candidate already.
        assert_eq!(state.reserve_range(10), None);
        assert_eq!(state.record_result(a, None), RecordOutcome::Completed { answer: 12 });
    }

    #[test]
    fn test_duplicate_result_is_noop() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[3, 3]);
        state.record_result(ranges[0], None);
        let snapshot = state.clone();
        assert_eq!(state.record_result(ranges[0], None), RecordOutcome::Stale);
        assert_eq!(state.record_result(ranges[0], Some(1)), RecordOutcome::Stale);
        assert_eq!(state, snapshot);
    }

    #[test]
    fn test_result_after_completion_is_stale() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[3, 3]);
        state.record_result(ranges[0], Some(1));
        assert!(state.is_completed());
        assert_eq!(state.record_result(ranges[1], Some(4)), RecordOutcome::Stale);
        assert_eq!(state.best_candidate(), Some(1));
    }

    #[test]
    fn test_first_unclaimed_skips_claimed() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[2, 2, 2]);
        let orphan = state.first_unclaimed(|r| *r == ranges[0]);
        assert_eq!(orphan, Some(ranges[1]));
        assert_eq!(state.first_unclaimed(|_| true), None);
    }

    #[test]
    fn test_boundary_is_monotonic() {
        let mut state = SearchState::new(0);
        let ranges = reserve_all(&mut state, &[3, 3, 3, 3]);
        let mut last = state.completed_boundary();
        for &i in &[2, 0, 3, 1] {
            state.record_result(ranges[i], None);
            assert!(state.completed_boundary() >= last);
            last = state.completed_boundary();
            if i == 3 {
                // Ranges beyond the boundary may be reserved mid-flight.
                state.reserve_range(3);
            }
        }
    }

    #[test]
    fn test_any_arrival_order_converges_to_same_answer() {
        let widths = [4, 4, 4, 4, 4];
        // Qualifying offsets at 6 and 13; the answer must be 6.
        let found = |range: &OffsetRange| [6u64, 13].into_iter().find(|m| range.contains(*m));

        let mut expected = None;
        for order in (0..widths.len()).permutations(widths.len()) {
            let mut state = SearchState::new(2);
            let ranges = reserve_all(&mut state, &widths);
            let mut outcome = RecordOutcome::Pending;
            for i in order {
                let result = state.record_result(ranges[i], found(&ranges[i]));
                if result != RecordOutcome::Stale {
                    outcome = result;
                }
            }
            let summary = (outcome, state.best_candidate(), state.completed_boundary());
            match &expected {
                None => expected = Some(summary),
                Some(first) => assert_eq!(*first, summary),
            }
        }
        assert_eq!(expected.unwrap().0, RecordOutcome::Completed { answer: 6 });
    }

    #[test]
    fn test_reachable_states_stay_consistent() {
        let mut state = SearchState::new(2);
        assert!(state.is_consistent());
        let ranges = reserve_all(&mut state, &[3, 3, 3]);
        state.record_result(ranges[1], Some(6));
        assert!(state.is_consistent());
        state.record_result(ranges[2], Some(9));
        assert!(state.is_consistent());
        state.record_result(ranges[0], None);
        assert!(state.is_completed());
        assert!(state.is_consistent());
    }
}
