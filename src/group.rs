use crate::record::Record;
use serde::Serialize;
use std::iter::Peekable;

/// All records of the merged stream that share one G, in stream order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Group {
    g: u64,
    members: Vec<Record>,
}

impl Group {
    pub fn new(g: u64, members: Vec<Record>) -> Self {
        Self { g, members }
    }

    pub fn g(&self) -> u64 {
        self.g
    }

    pub fn members(&self) -> &[Record] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GroupStats {
    /// Groups handed out for detection.
    pub scanned: u64,
    pub skipped_small: u64,
    pub skipped_low: u64,
    /// Records in skipped groups.
    pub records_skipped: u64,
    /// Records in retained groups.
    pub records_scanned: u64,
    pub largest: usize,
}

/// Splits an ascending record stream into maximal same-G groups and yields the
/// ones with at least `min_size` members and `G >= low_water`.
pub struct GroupReader<I: Iterator<Item = Record>> {
    records: Peekable<I>,
    min_size: usize,
    low_water: u64,
    stats: GroupStats,
}

impl<I: Iterator<Item = Record>> GroupReader<I> {
    pub fn new(records: I, min_size: usize, low_water: u64) -> Self {
        Self {
            records: records.peekable(),
            min_size: min_size.max(1),
            low_water,
            stats: GroupStats::default(),
        }
    }

    pub fn stats(&self) -> GroupStats {
        self.stats
    }

    /// Next maximal group, retained or not.
    fn next_raw(&mut self) -> Option<Group> {
        let first = self.records.next()?;
        let g = first.g();
        let mut members = vec![first];
        while let Some(record) = self.records.next_if(|r| r.g() == g) {
            members.push(record);
        }
        Some(Group::new(g, members))
    }
}

impl<I: Iterator<Item = Record>> Iterator for GroupReader<I> {
    type Item = Group;

    fn next(&mut self) -> Option<Group> {
        loop {
            let group = self.next_raw()?;
            let size = group.len();
            self.stats.largest = self.stats.largest.max(size);

            if size < self.min_size {
                self.stats.skipped_small += 1;
                self.stats.records_skipped += size as u64;
                continue;
            }
            if group.g() < self.low_water {
                self.stats.skipped_low += 1;
                self.stats.records_skipped += size as u64;
                continue;
            }

            self.stats.scanned += 1;
            self.stats.records_scanned += size as u64;
            return Some(group);
        }
    }
}
