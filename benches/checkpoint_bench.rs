use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use fortunate::checkpoint::CheckpointStore;
use fortunate::state::{ExpeditionState, IndexRange};
use tempfile::TempDir;

/// 500 answered indices and 500 active ones with a few ranges in flight.
fn large_state() -> ExpeditionState {
    let mut state = ExpeditionState::fresh(IndexRange::new(1, 1000), 100, |n| n + 2);
    for index in 1..=500 {
        state.finalize(index, index * 3 + 1, index as f64 * 0.5);
    }
    for search in state.searches.values_mut() {
        for _ in 0..4 {
            search.reserve_range(250);
        }
    }
    state.recent_batch_timings = vec![0.0004; 20];
    state
}

fn bench_save(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = CheckpointStore::with_base_dir(temp_dir.path());
    let state = large_state();

    c.bench_function("checkpoint_save_1000", |b| {
        b.iter(|| store.save(black_box(&state)).unwrap())
    });
}

fn bench_load(c: &mut Criterion) {
    let temp_dir = TempDir::new().unwrap();
    let store = CheckpointStore::with_base_dir(temp_dir.path());
    store.save(&large_state()).unwrap();

    c.bench_function("checkpoint_load_1000", |b| b.iter(|| black_box(store.load())));
}

fn bench_save_fresh_dir(c: &mut Criterion) {
    let state = large_state();

    c.bench_function("checkpoint_save_fresh_dir", |b| {
        b.iter_batched(
            || TempDir::new().unwrap(),
            |temp_dir| {
                let store = CheckpointStore::new(temp_dir.path().join("nested/state.json"));
                store.save(&state).unwrap();
                temp_dir
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(benches, bench_save, bench_load, bench_save_fresh_dir);
criterion_main!(benches);
