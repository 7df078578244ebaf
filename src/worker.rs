use crate::oracle::{Oracle, SearchSpace};
use crate::range::OffsetRange;
use crate::ExpeditionError;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use num_bigint::BigUint;
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Cached bases per worker before old indices are dropped.
const BASE_CACHE_LIMIT: usize = 8;

/// A range handed to a worker slot. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerTask {
    pub worker_id: usize,
    pub index: u64,
    pub range: OffsetRange,
    pub assigned_at: Instant,
}

impl WorkerTask {
    pub fn new(worker_id: usize, index: u64, range: OffsetRange) -> Self {
        Self {
            worker_id,
            index,
            range,
            assigned_at: Instant::now(),
        }
    }
}

/// Outcome of testing one task's range.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResult {
    pub worker_id: usize,
    pub index: u64,
    pub range: OffsetRange,
    /// First qualifying offset in the range, if any.
    pub found: Option<u64>,
    pub elapsed: Duration,
}

pub enum WorkerMessage {
    Task(WorkerTask),
    Stop,
}

/// Test offsets of `range` in ascending order, stopping at the first hit.
pub fn evaluate_range(oracle: &dyn Oracle, base: &BigUint, range: OffsetRange) -> Option<u64> {
    range.offsets().find(|&offset| oracle.is_qualifying(base, offset))
}

/// Fixed set of worker threads fed through a shared task channel.
pub struct WorkerPool {
    task_tx: Sender<WorkerMessage>,
    result_rx: Receiver<BatchResult>,
    handles: Vec<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl WorkerPool {
    pub fn spawn(
        size: usize,
        space: Arc<dyn SearchSpace>,
        oracle: Arc<dyn Oracle>,
        poll_interval: Duration,
    ) -> Result<Self, ExpeditionError> {
        if size == 0 {
            return Err(ExpeditionError::Config("worker pool needs at least one worker".into()));
        }

        let (task_tx, task_rx) = crossbeam_channel::unbounded::<WorkerMessage>();
        let (result_tx, result_rx) = crossbeam_channel::unbounded::<BatchResult>();
        let stop = Arc::new(AtomicBool::new(false));

        let mut handles = Vec::with_capacity(size);
        for id in 0..size {
            let tasks = task_rx.clone();
            let results = result_tx.clone();
            let space = Arc::clone(&space);
            let oracle = Arc::clone(&oracle);
            let stop = Arc::clone(&stop);
            let handle = thread::Builder::new()
                .name(format!("fortunate-worker-{}", id))
                .spawn(move || {
                    worker_loop(id, tasks, results, space, oracle, stop, poll_interval)
                })?;
            handles.push(handle);
        }

        tracing::debug!(workers = size, "worker pool started");
        Ok(Self {
            task_tx,
            result_rx,
            handles,
            stop,
        })
    }

    pub fn size(&self) -> usize {
        self.handles.len()
    }

    pub fn submit(&self, task: WorkerTask) -> Result<(), ExpeditionError> {
        self.task_tx
            .send(WorkerMessage::Task(task))
            .map_err(|_| ExpeditionError::Worker("task channel closed".into()))
    }

    /// Wait up to `timeout` for the next result. `Ok(None)` on timeout.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Option<BatchResult>, ExpeditionError> {
        match self.result_rx.recv_timeout(timeout) {
            Ok(result) => Ok(Some(result)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(ExpeditionError::Worker("all workers have exited".into()))
            }
        }
    }

    /// Stop and join every worker. Workers finish the batch they hold.
    pub fn shutdown(&mut self) {
        if self.handles.is_empty() {
            return;
        }
        self.stop.store(true, Ordering::SeqCst);
        for _ in 0..self.handles.len() {
            let _ = self.task_tx.send(WorkerMessage::Stop);
        }
        for handle in self.handles.drain(..) {
            if handle.join().is_err() {
                tracing::error!("worker thread panicked");
            }
        }
        tracing::debug!("worker pool stopped");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn worker_loop(
    id: usize,
    tasks: Receiver<WorkerMessage>,
    results: Sender<BatchResult>,
    space: Arc<dyn SearchSpace>,
    oracle: Arc<dyn Oracle>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
) {
    let mut bases: FxHashMap<u64, BigUint> = FxHashMap::default();

    loop {
        let task = match tasks.recv_timeout(poll_interval) {
            Ok(WorkerMessage::Task(task)) => task,
            Ok(WorkerMessage::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                if stop.load(Ordering::SeqCst) {
                    break;
                }
                continue;
            }
        };
        if stop.load(Ordering::SeqCst) {
            break;
        }

        if !bases.contains_key(&task.index) && bases.len() >= BASE_CACHE_LIMIT {
            // Dispatch favours low indices, so older entries are finished.
            bases.retain(|&index, _| index > task.index);
            if bases.len() >= BASE_CACHE_LIMIT {
                bases.clear();
            }
        }
        let base = bases
            .entry(task.index)
            .or_insert_with(|| space.base_for(task.index));

        let started = Instant::now();
        let found = evaluate_range(oracle.as_ref(), base, task.range);
        let result = BatchResult {
            worker_id: task.worker_id,
            index: task.index,
            range: task.range,
            found,
            elapsed: started.elapsed(),
        };

        if results.send(result).is_err() {
            break;
        }
    }

    tracing::trace!(worker = id, "worker exiting");
}
