use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};
use cuboid::merge::KWayMerge;
use cuboid::record::{Record, RecordLayout};
use cuboid::run_cursor::RunMergeCursor;
use cuboid::run_dir::RunDirectory;
use cuboid::run_flusher::RunFlusher;
use tempfile::TempDir;

fn sorted_runs(runs: u64, per_run: u64) -> Vec<Vec<Record>> {
    (0..runs)
        .map(|run| {
            (0..per_run)
                .map(|i| Record::pair(run, i, i * 3 + run % 3))
                .collect::<Vec<_>>()
        })
        .map(|mut run| {
            run.sort();
            run
        })
        .collect()
}

fn bench_in_memory_merge(c: &mut Criterion) {
    let runs = sorted_runs(16, 10_000);
    c.bench_function("kway_merge_16x10k", |b| {
        b.iter_batched(
            || runs.clone(),
            |runs| {
                KWayMerge::new(runs.into_iter().map(Vec::into_iter).collect())
                    .map(|r| black_box(r.g()))
                    .count()
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_flush(c: &mut Criterion) {
    let runs = sorted_runs(8, 20_000);
    c.bench_function("flush_8x20k", |b| {
        b.iter_batched(
            || (TempDir::new().unwrap(), runs.clone()),
            |(dir, runs)| {
                let run_dir = RunDirectory::new(dir.path(), "Cuboid", RecordLayout::Pair);
                RunFlusher::new(run_dir).write_run(runs).unwrap()
            },
            BatchSize::LargeInput,
        )
    });
}

fn bench_cursor(c: &mut Criterion) {
    let dir = TempDir::new().unwrap();
    let run_dir = RunDirectory::new(dir.path(), "Cuboid", RecordLayout::Pair);
    let mut flusher = RunFlusher::new(run_dir.clone());
    for run in sorted_runs(8, 20_000) {
        flusher.write_run(vec![run]).unwrap();
    }

    c.bench_function("cursor_8_runs", |b| {
        b.iter(|| RunMergeCursor::open(black_box(&run_dir)).unwrap().count())
    });
}

criterion_group!(benches, bench_in_memory_merge, bench_flush, bench_cursor);
criterion_main!(benches);
