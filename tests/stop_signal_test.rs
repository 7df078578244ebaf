use fortunate::checkpoint::{CheckpointLoad, CheckpointStore};
use fortunate::config::ExpeditionConfig;
use fortunate::oracle::{Oracle, SearchSpace};
use fortunate::orchestrator::{Expedition, StopSignal};
use fortunate::state::IndexRange;
use num_bigint::BigUint;
use num_traits::ToPrimitive;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

struct OffsetSpace;

impl SearchSpace for OffsetSpace {
    fn lower_bound_for(&self, _index: u64) -> u64 {
        1
    }
    fn base_for(&self, index: u64) -> BigUint {
        BigUint::from(index)
    }
}

/// Qualifies at `offset == 20 + index`, spending `latency` on every call.
struct SlowOracle {
    latency: Duration,
}

impl Oracle for SlowOracle {
    fn is_qualifying(&self, base: &BigUint, offset: u64) -> bool {
        thread::sleep(self.latency);
        offset == 20 + base.to_u64().unwrap_or(0)
    }
    fn name(&self) -> &str {
        "slow"
    }
}

fn test_config(dir: &Path, range: IndexRange) -> ExpeditionConfig {
    let mut config = ExpeditionConfig::new(range);
    config.workers = Some(2);
    config.checkpoint_path = dir.join("checkpoint.json");
    config.poll_interval = Duration::from_millis(10);
    config.worker_poll_interval = Duration::from_millis(10);
    config.sizer.initial_width = 4;
    config.sizer.min_width = 1;
    config.sizer.max_width = 4;
    config
}

/// A stop raised before the run leaves a resumable checkpoint and no answers.
#[test]
fn test_stop_before_run_saves_checkpoint() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config = test_config(temp_dir.path(), IndexRange::new(1, 3));
    let stop = StopSignal::new();
    stop.stop();

    let mut expedition = Expedition::new(config, &OffsetSpace, stop).unwrap();
    let answers = expedition
        .run(Arc::new(OffsetSpace), Arc::new(SlowOracle { latency: Duration::ZERO }))
        .unwrap();
    assert!(answers.is_empty());

    match CheckpointStore::new(temp_dir.path().join("checkpoint.json")).load() {
        CheckpointLoad::Loaded(state) => {
            assert_eq!(state.range, IndexRange::new(1, 3));
            assert_eq!(state.searches.len(), 3);
        }
        other => panic!("expected a checkpoint, got {:?}", other),
    }
}

/// Stopping mid-run returns within a batch or two, and resuming finishes
/// with the answers an uninterrupted run would give.
#[test]
fn test_stop_mid_run_then_resume() {
    let temp_dir = tempfile::tempdir().unwrap();
    let range = IndexRange::new(1, 4);
    let oracle = Arc::new(SlowOracle {
        latency: Duration::from_millis(3),
    });

    let stop = StopSignal::new();
    let stopper = stop.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(40));
        stopper.stop();
    });

    let started = Instant::now();
    let mut expedition = Expedition::new(test_config(temp_dir.path(), range), &OffsetSpace, stop).unwrap();
    let partial = expedition.run(Arc::new(OffsetSpace), oracle.clone()).unwrap();
    handle.join().unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
    for (index, answer) in &partial {
        assert_eq!(*answer, 20 + index);
    }

    let mut config = test_config(temp_dir.path(), range);
    config.resume = true;
    let mut expedition = Expedition::new(config, &OffsetSpace, StopSignal::new()).unwrap();
    let answers = expedition.run(Arc::new(OffsetSpace), oracle).unwrap();

    let expected: Vec<(u64, u64)> = range.indices().map(|index| (index, 20 + index)).collect();
    assert_eq!(answers.into_iter().collect::<Vec<_>>(), expected);
}
