use crate::record::Record;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Per-worker ordered, deduplicating record buffer.
///
/// Inserts come from the owning worker only; the flush routine drains it from
/// another thread. Both take the same lock, so an insert never interleaves
/// with a drain.
#[derive(Debug, Default)]
pub struct SortedRunBuffer {
    records: Mutex<BTreeSet<Record>>,
}

impl SortedRunBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the record unless already present. Returns whether it was new.
    pub fn insert(&self, record: Record) -> bool {
        self.lock().insert(record)
    }

    /// Removes and returns every record in ascending order.
    pub fn drain_all(&self) -> Vec<Record> {
        let taken = std::mem::take(&mut *self.lock());
        taken.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeSet<Record>> {
        // A worker that panicked mid-insert leaves the set itself intact.
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
