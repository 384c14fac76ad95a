use crate::record::Record;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

#[derive(Eq, PartialEq)]
struct HeapItem {
    record: Record,
    source: usize,
}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse for min-heap
        other
            .record
            .cmp(&self.record)
            .then_with(|| other.source.cmp(&self.source))
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// K-way merge of ascending record sources with exact-duplicate suppression.
///
/// Each source must be ascending on its own. A record equal to the last one
/// emitted, from any source, is skipped; since the output is ascending that is
/// enough to drop every duplicate across all sources.
pub struct KWayMerge<S> {
    sources: Vec<S>,
    heap: BinaryHeap<HeapItem>,
    last: Option<Record>,
    duplicates: u64,
}

impl<S: Iterator<Item = Record>> KWayMerge<S> {
    pub fn new(sources: Vec<S>) -> Self {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            last: None,
            duplicates: 0,
        };
        for source in 0..merge.sources.len() {
            merge.refill(source);
        }
        merge
    }

    /// Duplicates suppressed so far.
    pub fn duplicates_skipped(&self) -> u64 {
        self.duplicates
    }

    /// Sources still holding at least one record.
    pub fn active_sources(&self) -> usize {
        self.heap.len()
    }

    fn refill(&mut self, source: usize) {
        if let Some(record) = self.sources[source].next() {
            self.heap.push(HeapItem { record, source });
        }
    }
}

impl<S: Iterator<Item = Record>> Iterator for KWayMerge<S> {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        while let Some(item) = self.heap.pop() {
            self.refill(item.source);
            if self.last == Some(item.record) {
                self.duplicates += 1;
                continue;
            }
            self.last = Some(item.record);
            return Some(item.record);
        }
        None
    }
}
