use crate::progress::ProgressSink;
use crate::record::Record;
use crate::run_buffer::SortedRunBuffer;
use crate::run_dir::RunDirectory;
use crate::run_flusher::{FlushOutcome, RunFlusher};
use crate::CuboidError;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FlushStats {
    /// Insert calls, duplicates included.
    pub produced: u64,
    /// Records written across all run files.
    pub written: u64,
    /// Candidates rejected by the generation filters.
    pub filtered: u64,
    pub runs: u64,
}

/// Shared state of one generation phase: the per-worker buffers, the pending
/// record count that gates flushing, and the flush lock.
pub struct FlushCoordinator {
    buffers: Vec<SortedRunBuffer>,
    threshold: usize,
    pending: AtomicUsize,
    produced: AtomicU64,
    written: AtomicU64,
    filtered: AtomicU64,
    runs: AtomicU64,
    flusher: Mutex<RunFlusher>,
    progress: Arc<ProgressSink>,
}

impl FlushCoordinator {
    pub fn new(dir: RunDirectory, workers: usize, threshold: usize) -> Self {
        Self::with_flusher(RunFlusher::new(dir), workers, threshold)
    }

    pub fn with_flusher(flusher: RunFlusher, workers: usize, threshold: usize) -> Self {
        Self {
            buffers: (0..workers.max(1)).map(|_| SortedRunBuffer::new()).collect(),
            threshold: threshold.max(1),
            pending: AtomicUsize::new(0),
            produced: AtomicU64::new(0),
            written: AtomicU64::new(0),
            filtered: AtomicU64::new(0),
            runs: AtomicU64::new(0),
            flusher: Mutex::new(flusher),
            progress: Arc::new(ProgressSink::discard()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Buffers `record` for `worker`, flushing first if the pending count has
    /// reached the threshold. Returns whether the record was new to that buffer.
    pub fn insert(&self, worker: usize, record: Record) -> Result<bool, CuboidError> {
        if self.pending.load(Ordering::Acquire) >= self.threshold {
            self.flush_if_needed()?;
        }

        let buffer = self.buffers.get(worker).ok_or_else(|| {
            CuboidError::Other(format!(
                "worker {} has no buffer ({} buffers)",
                worker,
                self.buffers.len()
            ))
        })?;
        let inserted = buffer.insert(record);
        self.produced.fetch_add(1, Ordering::Relaxed);
        if inserted {
            self.pending.fetch_add(1, Ordering::AcqRel);
        }
        Ok(inserted)
    }

    pub fn record_filtered(&self, count: u64) {
        if count > 0 {
            self.filtered.fetch_add(count, Ordering::Relaxed);
        }
    }

    /// Flushes if the threshold is still crossed once the flush lock is held.
    /// Threads that lose the race find the count already reset and return.
    pub fn flush_if_needed(&self) -> Result<Option<FlushOutcome>, CuboidError> {
        let mut flusher = self.flusher.lock().unwrap_or_else(PoisonError::into_inner);
        if self.pending.load(Ordering::Acquire) < self.threshold {
            return Ok(None);
        }
        self.flush_locked(&mut flusher)
    }

    /// Unconditional flush of whatever is buffered. Used at the end of a phase.
    pub fn flush_all(&self) -> Result<Option<FlushOutcome>, CuboidError> {
        let mut flusher = self.flusher.lock().unwrap_or_else(PoisonError::into_inner);
        self.flush_locked(&mut flusher)
    }

    fn flush_locked(&self, flusher: &mut RunFlusher) -> Result<Option<FlushOutcome>, CuboidError> {
        // Inserts racing with the drain land either in this run or the next one.
        self.pending.store(0, Ordering::Release);
        let drained: Vec<Vec<Record>> = self.buffers.iter().map(SortedRunBuffer::drain_all).collect();

        let outcome = flusher.write_run(drained)?;
        if let Some(outcome) = &outcome {
            let total = self.written.fetch_add(outcome.written, Ordering::AcqRel) + outcome.written;
            self.runs.fetch_add(1, Ordering::AcqRel);
            self.progress.line(format!(
                "[flush] run {} written: {} records ({} duplicates dropped), {} total",
                outcome.index, outcome.written, outcome.duplicates, total
            ));
        }
        Ok(outcome)
    }

    pub fn stats(&self) -> FlushStats {
        FlushStats {
            produced: self.produced.load(Ordering::Acquire),
            written: self.written.load(Ordering::Acquire),
            filtered: self.filtered.load(Ordering::Acquire),
            runs: self.runs.load(Ordering::Acquire),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordLayout;
    use tempfile::tempdir;

    #[test]
    fn test_threshold_triggers_flush() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let coordinator = FlushCoordinator::new(dir.clone(), 2, 3);

        for g in 1..=3 {
            coordinator.insert(0, Record::pair(1, 2, g)).unwrap();
        }
        assert_eq!(coordinator.pending(), 3);
        assert!(dir.list_runs().unwrap().is_empty());

        // The fourth insert sees the crossed threshold and flushes first.
        coordinator.insert(1, Record::pair(1, 2, 4)).unwrap();
        assert_eq!(dir.list_runs().unwrap().len(), 1);
        assert_eq!(coordinator.pending(), 1);

        coordinator.flush_all().unwrap();
        let stats = coordinator.stats();
        assert_eq!(stats.runs, 2);
        assert_eq!(stats.written, 4);
        assert_eq!(stats.produced, 4);
        assert_eq!(coordinator.pending(), 0);
    }

    #[test]
    fn test_duplicate_inserts_count_as_produced_only() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let coordinator = FlushCoordinator::new(dir, 1, 100);

        assert!(coordinator.insert(0, Record::pair(3, 4, 5)).unwrap());
        assert!(!coordinator.insert(0, Record::pair(4, 3, 5)).unwrap());
        assert_eq!(coordinator.pending(), 1);
        assert_eq!(coordinator.stats().produced, 2);
    }

    #[test]
    fn test_flush_if_needed_is_noop_below_threshold() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let coordinator = FlushCoordinator::new(dir.clone(), 1, 10);
        coordinator.insert(0, Record::pair(3, 4, 5)).unwrap();
        assert!(coordinator.flush_if_needed().unwrap().is_none());
        assert!(dir.list_runs().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_worker_is_an_error() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let coordinator = FlushCoordinator::new(dir, 2, 10);
        assert!(coordinator.insert(2, Record::pair(3, 4, 5)).is_err());
    }

    #[test]
    fn test_flush_reports_progress() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let (sink, handle) = ProgressSink::memory();
        let coordinator = FlushCoordinator::new(dir, 1, 10).with_progress(Arc::new(sink));
        coordinator.insert(0, Record::pair(3, 4, 5)).unwrap();
        coordinator.flush_all().unwrap();
        assert!(handle.contents().contains("[flush] run 1 written: 1 records"));
    }
}
