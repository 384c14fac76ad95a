use cuboid::cancel::CancellationToken;
use cuboid::coordinator::FlushCoordinator;
use cuboid::generator::{chunk_range, CandidateGenerator, EdgeBounds};
use cuboid::pool::WorkerPool;
use cuboid::record::{Record, RecordLayout};
use cuboid::run_cursor::RunMergeCursor;
use cuboid::run_dir::RunDirectory;
use rustc_hash::FxHashSet;

fn reference(generator: &CandidateGenerator) -> FxHashSet<Record> {
    let mut expected = FxHashSet::default();
    for m in generator.m_range() {
        generator
            .generate_m(m, &mut |record| {
                expected.insert(record);
                Ok(())
            })
            .unwrap();
    }
    expected
}

/// Many workers and a tiny flush threshold: nothing may be lost between
/// inserts and the flushes that race with them.
#[test]
fn test_tiny_threshold_loses_no_records() {
    for (threads, threshold) in [(1, 5), (4, 7), (8, 3)] {
        let tmp = tempfile::tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let generator = CandidateGenerator::new(10, 4000, EdgeBounds::default());
        let coordinator = FlushCoordinator::new(dir.clone(), threads, threshold);
        let cancel = CancellationToken::new();
        let pool = WorkerPool::new(threads, threads * 2, cancel.clone());

        pool.run(chunk_range(generator.m_range(), 3), |worker, ms| {
            generator
                .generate_range(ms, worker, &coordinator, &cancel)
                .map(|_| ())
        })
        .unwrap();
        coordinator.flush_all().unwrap();

        let expected = reference(&generator);
        let recovered: Vec<Record> = RunMergeCursor::open(&dir).unwrap().collect();
        let recovered_set: FxHashSet<Record> = recovered.iter().copied().collect();

        assert_eq!(recovered.len(), recovered_set.len());
        assert_eq!(recovered_set, expected, "threads {} threshold {}", threads, threshold);

        let stats = coordinator.stats();
        assert!(stats.runs > 1);
        assert!(stats.written >= expected.len() as u64);
        assert_eq!(coordinator.pending(), 0);
    }
}

#[test]
fn test_concurrent_duplicate_inserts_collapse() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
    let coordinator = FlushCoordinator::new(dir.clone(), 4, 3);
    let pool = WorkerPool::new(4, 4, CancellationToken::new());

    // Every worker inserts the same 50 records.
    pool.run(0..4, |worker, _| {
        for g in 1..=50u64 {
            coordinator.insert(worker, Record::pair(1, 2, g))?;
        }
        Ok(())
    })
    .unwrap();
    coordinator.flush_all().unwrap();

    let recovered: Vec<Record> = RunMergeCursor::open(&dir).unwrap().collect();
    assert_eq!(recovered.len(), 50);
    assert_eq!(coordinator.stats().produced, 200);
}
