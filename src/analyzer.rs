use crate::cancel::CancellationToken;
use crate::detector::{self, Finding, Findings};
use crate::group::Group;
use crate::pool::WorkerPool;
use crate::progress::ProgressSink;
use crate::record::{Record, RecordLayout};
use crate::CuboidError;
use itertools::Itertools;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Groups dispatched between two progress lines.
pub const PROGRESS_EVERY_GROUPS: u64 = 1 << 20;

/// Runs detection over a stream of groups, fanned out in batches across a
/// worker pool. Findings are collected under a lock and returned sorted.
pub struct GroupAnalyzer {
    layout: RecordLayout,
    pool: WorkerPool,
    batch_size: usize,
    cancel: CancellationToken,
    progress: Arc<ProgressSink>,
    detected: AtomicU64,
}

impl GroupAnalyzer {
    pub fn new(
        layout: RecordLayout,
        pool: WorkerPool,
        batch_size: usize,
        cancel: CancellationToken,
        progress: Arc<ProgressSink>,
    ) -> Self {
        Self {
            layout,
            pool,
            batch_size: batch_size.max(1),
            cancel,
            progress,
            detected: AtomicU64::new(0),
        }
    }

    /// Groups that went through detection so far.
    pub fn detected(&self) -> u64 {
        self.detected.load(Ordering::Acquire)
    }

    pub fn detect(&self, members: &[Record]) -> Findings {
        match self.layout {
            RecordLayout::Pair => detector::detect_pair_group(members),
            RecordLayout::Quadruple => detector::detect_quadruple_group(members),
        }
    }

    pub fn analyze(&self, groups: impl Iterator<Item = Group>) -> Result<Vec<Finding>, CuboidError> {
        let sink: Mutex<Vec<Finding>> = Mutex::new(Vec::new());
        let mut dispatched = 0u64;
        let mut last_g = 0u64;

        let batches = groups.chunks(self.batch_size);
        let jobs = batches.into_iter().map(|batch| {
            let batch: Vec<Group> = batch.collect();
            let before = dispatched;
            dispatched += batch.len() as u64;
            last_g = batch.last().map_or(last_g, Group::g);
            if before / PROGRESS_EVERY_GROUPS != dispatched / PROGRESS_EVERY_GROUPS {
                self.progress.line(format!(
                    "[analyze] {} groups dispatched, G={}",
                    dispatched, last_g
                ));
            }
            batch
        });

        self.pool.run(jobs, |_, batch| {
            for group in &batch {
                self.cancel.check()?;
                let findings = self.detect(group.members());
                self.detected.fetch_add(1, Ordering::Relaxed);
                if findings.is_empty() {
                    continue;
                }
                let mut sink = sink.lock().unwrap_or_else(PoisonError::into_inner);
                for finding in findings {
                    self.progress.line(format!("[found] {}", finding));
                    sink.push(finding);
                }
            }
            Ok(())
        })?;

        self.progress.line(format!(
            "[analyze] done: {} groups dispatched, {} detected, G={}",
            dispatched,
            self.detected(),
            last_g
        ));

        let mut findings = sink.into_inner().unwrap_or_else(PoisonError::into_inner);
        findings.sort();
        Ok(findings)
    }
}
