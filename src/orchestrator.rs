use crate::batch_sizer::BatchSizer;
use crate::checkpoint::{CheckpointLoad, CheckpointStore};
use crate::config::ExpeditionConfig;
use crate::oracle::{Oracle, SearchSpace};
use crate::progress::{
    AnswerEvent, ExpeditionObserver, FinishEvent, LogObserver, ProgressEvent, WorkerLog,
};
use crate::range::OffsetRange;
use crate::search_state::{RecordOutcome, SearchState};
use crate::state::ExpeditionState;
use crate::worker::{BatchResult, WorkerPool, WorkerTask};
use crate::ExpeditionError;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Cooperative cancellation flag checked once per loop iteration.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives every search in the configured index range to completion.
///
/// Owns the whole `ExpeditionState` and the worker-slot table. Only the
/// control thread touches them; workers see tasks and return results.
pub struct Expedition {
    config: ExpeditionConfig,
    state: ExpeditionState,
    sizer: BatchSizer,
    store: CheckpointStore,
    slots: Vec<Option<WorkerTask>>,
    observers: Vec<Box<dyn ExpeditionObserver>>,
    stop: StopSignal,
    session_start: Instant,
    baseline_elapsed: f64,
    last_progress: Instant,
    resumed: bool,
}

impl Expedition {
    /// Build the expedition, restoring from the checkpoint when asked to
    /// resume and the stored range matches.
    pub fn new(
        config: ExpeditionConfig,
        space: &dyn SearchSpace,
        stop: StopSignal,
    ) -> Result<Self, ExpeditionError> {
        config.validate()?;
        let store = CheckpointStore::new(config.checkpoint_path.clone());
        let workers = config.worker_count();

        let restored = if config.resume {
            match store.load() {
                CheckpointLoad::Loaded(state) if state.range == config.range => Some(state),
                CheckpointLoad::Loaded(state) => {
                    warn!(
                        checkpoint = %state.range,
                        requested = %config.range,
                        "checkpoint range mismatch, starting fresh"
                    );
                    None
                }
                CheckpointLoad::Corrupt(reason) => {
                    warn!(path = %store.path().display(), "checkpoint unusable ({}), starting fresh", reason);
                    None
                }
                CheckpointLoad::Missing => {
                    info!(path = %store.path().display(), "no checkpoint found, starting fresh");
                    None
                }
            }
        } else {
            None
        };

        let resumed = restored.is_some();
        let (mut state, sizer) = match restored {
            Some(state) => {
                let sizer = BatchSizer::restore(
                    config.sizer.clone(),
                    state.current_batch_width,
                    &state.recent_batch_timings,
                );
                (state, sizer)
            }
            None => {
                let sizer = BatchSizer::new(config.sizer.clone());
                let state = ExpeditionState::fresh(config.range, sizer.width(), |index| {
                    space.lower_bound_for(index)
                });
                (state, sizer)
            }
        };
        reconcile(&mut state, space);

        if resumed {
            let orphans: usize = state.searches.values().map(|s| s.pending_ranges().len()).sum();
            info!(
                answers = state.answers.len(),
                active = state.searches.len(),
                orphans,
                batch_width = sizer.width(),
                "resumed from checkpoint"
            );
        }

        let mut observers: Vec<Box<dyn ExpeditionObserver>> = vec![Box::new(LogObserver)];
        if let Some(log_path) = &config.log_path {
            observers.push(Box::new(WorkerLog::open(log_path, config.range, workers, resumed)?));
        }

        let baseline_elapsed = state.total_elapsed_seconds;
        Ok(Self {
            config,
            state,
            sizer,
            store,
            slots: vec![None; workers],
            observers,
            stop,
            session_start: Instant::now(),
            baseline_elapsed,
            last_progress: Instant::now(),
            resumed,
        })
    }

    pub fn resumed(&self) -> bool {
        self.resumed
    }

    pub fn state(&self) -> &ExpeditionState {
        &self.state
    }

    pub fn slots(&self) -> &[Option<WorkerTask>] {
        &self.slots
    }

    pub fn batch_width(&self) -> u64 {
        self.sizer.width()
    }

    pub fn add_observer(&mut self, observer: Box<dyn ExpeditionObserver>) {
        self.observers.push(observer);
    }

    /// Cumulative seconds across every session of this expedition.
    pub fn elapsed_seconds(&self) -> f64 {
        self.baseline_elapsed + self.session_start.elapsed().as_secs_f64()
    }

    /// Fill every idle slot with the next task, returning what was assigned.
    pub fn assign_idle_slots(&mut self) -> Vec<WorkerTask> {
        let mut assigned = Vec::new();
        for slot in 0..self.slots.len() {
            if self.slots[slot].is_some() {
                continue;
            }
            let Some((index, range)) = self.next_task() else {
                break;
            };
            let task = WorkerTask::new(slot, index, range);
            self.slots[slot] = Some(task.clone());
            assigned.push(task);
        }
        assigned
    }

    /// Orphaned pending ranges go first, lowest index first. Otherwise a
    /// fresh range is reserved from the lowest index that still has room.
    fn next_task(&mut self) -> Option<(u64, OffsetRange)> {
        let slots = &self.slots;
        let orphan = self.state.searches.iter().find_map(|(&index, search)| {
            search
                .first_unclaimed(|range| {
                    slots
                        .iter()
                        .flatten()
                        .any(|task| task.index == index && task.range == *range)
                })
                .map(|range| (index, range))
        });
        if orphan.is_some() {
            return orphan;
        }

        let width = self.sizer.width();
        self.state
            .searches
            .iter_mut()
            .find_map(|(&index, search)| search.reserve_range(width).map(|range| (index, range)))
    }

    /// Apply one worker result: resize, free the slot, update the search,
    /// finalize on completion, then checkpoint.
    pub fn process_result(&mut self, result: BatchResult) -> RecordOutcome {
        self.sizer.record_sample(result.elapsed, result.range.width());

        if let Some(slot) = self.slots.get_mut(result.worker_id) {
            let matches = slot
                .as_ref()
                .is_some_and(|task| task.index == result.index && task.range == result.range);
            if matches {
                *slot = None;
            }
        }

        let outcome = match self.state.searches.get_mut(&result.index) {
            Some(search) => search.record_result(result.range, result.found),
            None => RecordOutcome::Stale,
        };

        match outcome {
            RecordOutcome::Completed { answer } => {
                let elapsed = self.elapsed_seconds();
                self.state.finalize(result.index, answer, elapsed);
                self.persist();

                let event = AnswerEvent {
                    index: result.index,
                    answer,
                    elapsed_seconds: elapsed,
                    batch_width: self.sizer.width(),
                    remaining: self.state.remaining(),
                    finished_worker: Some(result.worker_id),
                    assignments: self
                        .slots
                        .iter()
                        .map(|slot| slot.as_ref().map(|task| (task.index, task.range.start)))
                        .collect(),
                };
                for observer in &mut self.observers {
                    observer.on_answer(&event);
                }
            }
            RecordOutcome::Pending => self.persist(),
            RecordOutcome::Stale => {
                debug!(index = result.index, range = %result.range, "ignoring stale result");
                self.persist();
            }
        }

        self.maybe_emit_progress();
        outcome
    }

    /// Write the checkpoint. Failures are logged; the next result retries.
    fn persist(&mut self) {
        if let Err(e) = self.checkpoint() {
            error!(path = %self.store.path().display(), "checkpoint save failed: {}", e);
        }
    }

    fn checkpoint(&mut self) -> Result<(), ExpeditionError> {
        self.state.capture_sizer(&self.sizer);
        self.state.total_elapsed_seconds = self.elapsed_seconds();
        self.store.save(&self.state)
    }

    fn maybe_emit_progress(&mut self) {
        if self.last_progress.elapsed() < self.config.progress_interval {
            return;
        }
        self.last_progress = Instant::now();

        let elapsed_seconds = self.elapsed_seconds();
        let batch_width = self.sizer.width();
        let events: Vec<ProgressEvent> = self
            .state
            .searches
            .iter()
            .map(|(&index, search)| progress_event(index, search, batch_width, elapsed_seconds))
            .collect();
        for observer in &mut self.observers {
            for event in &events {
                observer.on_progress(event);
            }
        }
    }

    /// Run until every index is answered or the stop signal is raised.
    ///
    /// Returns the answers known so far. On a stop the checkpoint keeps every
    /// in-flight range pending so a resumed run re-dispatches it.
    #[tracing::instrument(skip_all, fields(range = %self.config.range))]
    pub fn run(
        &mut self,
        space: Arc<dyn SearchSpace>,
        oracle: Arc<dyn Oracle>,
    ) -> Result<BTreeMap<u64, u64>, ExpeditionError> {
        info!(
            workers = self.slots.len(),
            oracle = oracle.name(),
            error_bound = oracle.error_bound(),
            batch_width = self.sizer.width(),
            resumed = self.resumed,
            "starting expedition"
        );

        self.session_start = Instant::now();
        self.last_progress = self.session_start;

        let mut pool = WorkerPool::spawn(
            self.slots.len(),
            space,
            oracle,
            self.config.worker_poll_interval,
        )?;
        let driven = self.drive(&pool);
        pool.shutdown();
        self.slots.iter_mut().for_each(|slot| *slot = None);

        let complete = self.state.is_complete();
        let saved = if complete {
            self.store.remove()
        } else {
            self.checkpoint()
        };

        let total_elapsed_seconds = self.elapsed_seconds();
        let finish = FinishEvent {
            answers: &self.state.answers,
            total_elapsed_seconds,
            complete,
        };
        for observer in &mut self.observers {
            observer.on_finish(&finish);
        }

        driven?;
        saved?;
        Ok(self.state.answers.clone())
    }

    fn drive(&mut self, pool: &WorkerPool) -> Result<(), ExpeditionError> {
        while !self.state.is_complete() {
            if self.stop.is_stopped() {
                info!(remaining = self.state.remaining(), "stop requested, pausing expedition");
                return Ok(());
            }

            for task in self.assign_idle_slots() {
                debug!(worker = task.worker_id, index = task.index, range = %task.range, "dispatch");
                pool.submit(task)?;
            }

            match pool.recv_timeout(self.config.poll_interval)? {
                Some(result) => {
                    self.process_result(result);
                }
                None if self.slots.iter().all(Option::is_none) => {
                    return Err(ExpeditionError::Other(format!(
                        "no dispatchable work but {} indices unanswered",
                        self.state.remaining()
                    )));
                }
                None => {}
            }
        }
        Ok(())
    }
}

/// Add searches for indices that are neither answered nor active, and
/// finalize any search stored as completed but missing its answer.
fn reconcile(state: &mut ExpeditionState, space: &dyn SearchSpace) {
    for index in state.range.indices() {
        if !state.answers.contains_key(&index) && !state.searches.contains_key(&index) {
            state
                .searches
                .insert(index, SearchState::new(space.lower_bound_for(index)));
        }
    }

    let finished: Vec<(u64, u64)> = state
        .searches
        .iter()
        .filter(|(_, search)| search.is_completed())
        .filter_map(|(&index, search)| search.best_candidate().map(|best| (index, best)))
        .collect();
    let elapsed = state.total_elapsed_seconds;
    for (index, answer) in finished {
        state.finalize(index, answer, elapsed);
    }
}

fn progress_event(index: u64, search: &SearchState, batch_width: u64, elapsed_seconds: f64) -> ProgressEvent {
    ProgressEvent {
        index,
        completed_boundary: search.completed_boundary(),
        best_candidate: search.best_candidate(),
        batch_width,
        elapsed_seconds,
    }
}
