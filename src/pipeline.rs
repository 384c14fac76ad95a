use crate::analyzer::GroupAnalyzer;
use crate::cancel::CancellationToken;
use crate::config::SearchConfig;
use crate::coordinator::{FlushCoordinator, FlushStats};
use crate::detector::Finding;
use crate::generator::{self, CandidateGenerator, QuadrupleGenerator, RangeProgress};
use crate::group::{GroupReader, GroupStats};
use crate::pool::WorkerPool;
use crate::progress::ProgressSink;
use crate::record::RecordLayout;
use crate::run_cursor::RunMergeCursor;
use crate::run_flusher::RunFlusher;
use crate::CuboidError;
use itertools::Itertools;
use serde::Serialize;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct GenerationReport {
    /// Run files were already present, nothing was generated.
    pub skipped: bool,
    /// The reused runs were left by a generation that never finished.
    pub incomplete: bool,
    pub fixture: bool,
    pub produced: u64,
    pub written: u64,
    pub filtered: u64,
    pub runs: u64,
}

impl GenerationReport {
    fn from_stats(stats: FlushStats, fixture: bool) -> Self {
        Self {
            skipped: false,
            incomplete: false,
            fixture,
            produced: stats.produced,
            written: stats.written,
            filtered: stats.filtered,
            runs: stats.runs,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct AnalysisReport {
    pub run_files: usize,
    /// Records present in more than one run file.
    pub cross_run_duplicates: u64,
    pub groups: GroupStats,
    pub findings: Vec<Finding>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SearchSummary {
    pub low: u64,
    pub high: u64,
    pub layout: RecordLayout,
    pub generation: Option<GenerationReport>,
    pub analysis: Option<AnalysisReport>,
    pub elapsed_secs: u64,
}

impl SearchSummary {
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec![format!(
            "[summary] G in ({}, {}], layout {}, {}s",
            self.low, self.high, self.layout, self.elapsed_secs
        )];
        if let Some(generation) = &self.generation {
            if generation.skipped && generation.incomplete {
                lines.push(
                    "[summary] generation skipped, reused runs from an unfinished generation"
                        .to_string(),
                );
            } else if generation.skipped {
                lines.push("[summary] generation skipped, existing runs reused".to_string());
            } else {
                lines.push(format!(
                    "[summary] produced {}, written {} in {} runs, filtered {}",
                    generation.produced, generation.written, generation.runs, generation.filtered
                ));
            }
        }
        if let Some(analysis) = &self.analysis {
            let groups = &analysis.groups;
            lines.push(format!(
                "[summary] {} run files, {} groups scanned ({} records), {} too small, {} below low, {} records skipped, largest group {}",
                analysis.run_files,
                groups.scanned,
                groups.records_scanned,
                groups.skipped_small,
                groups.skipped_low,
                groups.records_skipped,
                groups.largest
            ));
            lines.push(format!("[summary] findings: {}", analysis.findings.len()));
            for finding in &analysis.findings {
                lines.push(format!("[summary] {}", finding));
            }
        }
        lines
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DumpReport {
    pub groups: u64,
    pub records: u64,
    pub largest: usize,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MergeReport {
    pub path: PathBuf,
    pub run_files: usize,
    pub written: u64,
    /// The merged file was already there.
    pub skipped: bool,
}

/// One configured search over a working directory.
pub struct Search {
    config: SearchConfig,
    cancel: CancellationToken,
    progress: Arc<ProgressSink>,
}

impl Search {
    pub fn new(config: SearchConfig) -> Result<Self, CuboidError> {
        config.validate()?;
        Ok(Self {
            config,
            cancel: CancellationToken::new(),
            progress: Arc::new(ProgressSink::discard()),
        })
    }

    pub fn with_progress(mut self, progress: Arc<ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    fn pool(&self) -> WorkerPool {
        WorkerPool::new(
            self.config.threads,
            self.config.queue_depth(),
            self.cancel.clone(),
        )
    }

    /// Deletes existing run files and the merged file of the configured layout.
    pub fn remove_runs(&self) -> Result<usize, CuboidError> {
        let removed = self.config.run_directory().remove_runs()?;
        if removed > 0 {
            self.progress
                .line(format!("[generate] removed {} existing run files", removed));
        }
        Ok(removed)
    }

    /// Writes run files for the configured range. Skipped when runs exist.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn generate(&self, fixture: bool) -> Result<GenerationReport, CuboidError> {
        let dir = self.config.run_directory();
        dir.ensure_exists()?;

        let existing = dir.list_runs()?.len();
        if existing > 0 {
            self.progress.line(format!(
                "[generate] {} run files already in {}, skipping generation",
                existing,
                dir.workdir().display()
            ));
            let incomplete = !dir.is_complete();
            if incomplete {
                tracing::warn!(
                    "[generate] runs in {} were not marked complete",
                    dir.workdir().display()
                );
                self.progress.line(format!(
                    "[generate] warning: runs in {} come from an unfinished generation and may be incomplete, rerun with --fresh",
                    dir.workdir().display()
                ));
            }
            return Ok(GenerationReport {
                skipped: true,
                incomplete,
                fixture,
                ..GenerationReport::default()
            });
        }

        let report = if fixture {
            self.generate_fixture()?
        } else {
            match self.config.layout {
                RecordLayout::Pair => self.generate_pairs()?,
                RecordLayout::Quadruple => self.generate_quadruples()?,
            }
        };
        dir.mark_complete(report.runs)?;

        self.progress.line(format!(
            "[generate] done: produced {}, written {} in {} runs, filtered {}",
            report.produced, report.written, report.runs, report.filtered
        ));
        Ok(report)
    }

    fn coordinator(&self, workers: usize, threshold: usize) -> FlushCoordinator {
        FlushCoordinator::new(self.config.run_directory(), workers, threshold)
            .with_progress(Arc::clone(&self.progress))
    }

    fn generate_pairs(&self) -> Result<GenerationReport, CuboidError> {
        let generator = CandidateGenerator::new(
            self.config.low,
            self.config.high,
            self.config.edge_bounds(),
        );
        let coordinator = self.coordinator(self.config.threads, self.config.run_size);
        let m_range = generator.m_range();
        self.progress.line(format!(
            "[generate] m in [{}, {}), {} threads, run size {}",
            m_range.start, m_range.end, self.config.threads, self.config.run_size
        ));

        let tracker = RangeProgress::new(Arc::clone(&self.progress), &m_range);
        let jobs = generator::chunk_range(m_range, self.config.m_chunk)
            .inspect(|chunk| tracker.dispatched(chunk));
        self.pool().run(jobs, |worker, ms| {
            generator.generate_range(ms, worker, &coordinator, &self.cancel)
        })?;

        coordinator.flush_all()?;
        Ok(GenerationReport::from_stats(coordinator.stats(), false))
    }

    fn generate_quadruples(&self) -> Result<GenerationReport, CuboidError> {
        let generator = QuadrupleGenerator::new(self.config.low, self.config.high);
        let coordinator = self.coordinator(self.config.threads, self.config.run_size);
        let a_range = generator.a_range();
        self.progress.line(format!(
            "[generate] A in [{}, {}), {} threads, run size {}",
            a_range.start, a_range.end, self.config.threads, self.config.run_size
        ));

        let tracker = RangeProgress::new(Arc::clone(&self.progress), &a_range);
        let jobs = generator::chunk_range(a_range, self.config.m_chunk)
            .inspect(|chunk| tracker.dispatched(chunk));
        self.pool().run(jobs, |worker, a_values| {
            generator.generate_range(a_values, worker, &coordinator, &self.cancel)
        })?;

        coordinator.flush_all()?;
        Ok(GenerationReport::from_stats(coordinator.stats(), false))
    }

    fn generate_fixture(&self) -> Result<GenerationReport, CuboidError> {
        if self.config.layout != RecordLayout::Pair {
            return Err(CuboidError::Config(
                "fixture data uses the pair layout".to_string(),
            ));
        }
        let coordinator = self.coordinator(2, usize::MAX);
        for flush in generator::fixture_flushes() {
            for (buffer, records) in flush.into_iter().enumerate() {
                for record in records {
                    coordinator.insert(buffer, record)?;
                }
            }
            coordinator.flush_all()?;
        }
        Ok(GenerationReport::from_stats(coordinator.stats(), true))
    }

    /// Merges every run file, groups by G and runs detection.
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn analyze(&self) -> Result<AnalysisReport, CuboidError> {
        let dir = self.config.run_directory();
        let mut cursor = RunMergeCursor::open(&dir)?;
        if cursor.file_count() == 0 {
            tracing::warn!(
                "[analyze] no {} run files in {}",
                dir.layout(),
                dir.workdir().display()
            );
        }
        self.progress.line(format!(
            "[analyze] {} run files, minimum group size {}, G >= {}",
            cursor.file_count(),
            self.config.effective_min_group_size(),
            self.config.low
        ));

        let analyzer = GroupAnalyzer::new(
            self.config.layout,
            self.pool(),
            self.config.group_batch,
            self.cancel.clone(),
            Arc::clone(&self.progress),
        );
        let mut groups = GroupReader::new(
            cursor.by_ref(),
            self.config.effective_min_group_size(),
            self.config.low,
        );
        let findings = analyzer.analyze(groups.by_ref())?;
        let stats = groups.stats();

        Ok(AnalysisReport {
            run_files: cursor.file_count(),
            cross_run_duplicates: cursor.duplicates_skipped(),
            groups: stats,
            findings,
        })
    }

    /// Generates (unless runs exist) and then analyzes.
    pub fn check(&self, fixture: bool) -> Result<SearchSummary, CuboidError> {
        let started = Instant::now();
        let generation = self.generate(fixture)?;
        let analysis = self.analyze()?;
        Ok(self.summary(Some(generation), Some(analysis), started))
    }

    pub fn summary(
        &self,
        generation: Option<GenerationReport>,
        analysis: Option<AnalysisReport>,
        started: Instant,
    ) -> SearchSummary {
        SearchSummary {
            low: self.config.low,
            high: self.config.high,
            layout: self.config.layout,
            generation,
            analysis,
            elapsed_secs: started.elapsed().as_secs(),
        }
    }

    /// Writes every group of the merged stream as one text line.
    pub fn dump(&self, out: &mut dyn Write) -> Result<DumpReport, CuboidError> {
        let dir = self.config.run_directory();
        let cursor = RunMergeCursor::open(&dir)?;
        let layout = dir.layout();
        let mut report = DumpReport::default();

        for group in GroupReader::new(cursor, 1, 0) {
            self.cancel.check()?;
            let members = group
                .members()
                .iter()
                .map(|r| match layout {
                    RecordLayout::Pair => format!("{},{}", r.a(), r.b()),
                    RecordLayout::Quadruple => format!("{},{},{}", r.a(), r.b(), r.c()),
                })
                .join("; ");
            writeln!(out, "G={} n={}: {}", group.g(), group.len(), members)?;

            report.groups += 1;
            report.records += group.len() as u64;
            report.largest = report.largest.max(group.len());
        }
        out.flush()?;

        self.progress.line(format!(
            "[dump] {} groups, {} records, largest group {}",
            report.groups, report.records, report.largest
        ));
        Ok(report)
    }

    /// Persists the merged stream of all runs as `<prefix>.merged.<ext>`.
    pub fn merge(&self) -> Result<MergeReport, CuboidError> {
        let dir = self.config.run_directory();
        let path = dir.merged_path();
        if path.exists() {
            self.progress.line(format!(
                "[merge] {} already exists, skipping",
                path.display()
            ));
            return Ok(MergeReport {
                path,
                run_files: 0,
                written: 0,
                skipped: true,
            });
        }

        let cursor = RunMergeCursor::open(&dir)?;
        let run_files = cursor.file_count();
        let mut flusher = RunFlusher::new(dir);
        let written = flusher.write_sorted_to(&path, cursor)?;
        self.progress.line(format!(
            "[merge] {} run files merged into {} ({} records)",
            run_files,
            path.display(),
            written
        ));
        Ok(MergeReport {
            path,
            run_files,
            written,
            skipped: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use tempfile::tempdir;

    fn config(workdir: &std::path::Path) -> SearchConfig {
        SearchConfig {
            threads: 2,
            low: 1,
            high: 300,
            workdir: workdir.to_path_buf(),
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let tmp = tempdir().unwrap();
        let bad = SearchConfig {
            high: 0,
            ..config(tmp.path())
        };
        assert!(matches!(Search::new(bad), Err(CuboidError::Config(_))));
    }

    #[test]
    fn test_generation_is_skipped_when_runs_exist() {
        let tmp = tempdir().unwrap();
        let search = Search::new(config(tmp.path())).unwrap();
        let first = search.generate(false).unwrap();
        assert!(!first.skipped);
        assert!(first.runs >= 1);

        let second = search.generate(false).unwrap();
        assert!(second.skipped);
        assert_eq!(second.written, 0);

        assert_eq!(search.remove_runs().unwrap(), first.runs as usize);
        assert!(!search.generate(false).unwrap().skipped);
    }

    #[test]
    fn test_reused_partial_runs_are_flagged() {
        let tmp = tempdir().unwrap();
        let search = Search::new(config(tmp.path())).unwrap();
        let dir = search.config().run_directory();
        dir.ensure_exists().unwrap();
        let coordinator = FlushCoordinator::new(dir.clone(), 1, usize::MAX);
        coordinator.insert(0, Record::pair(3, 4, 5)).unwrap();
        coordinator.flush_all().unwrap();

        let (sink, handle) = ProgressSink::memory();
        let search = search.with_progress(Arc::new(sink));
        let report = search.generate(false).unwrap();
        assert!(report.skipped);
        assert!(report.incomplete);
        assert!(handle.contents().contains("may be incomplete"));

        let started = Instant::now();
        let lines = search.summary(Some(report), None, started).lines();
        assert!(lines[1].contains("unfinished generation"));
    }

    #[test]
    fn test_finished_generation_is_reused_silently() {
        let tmp = tempdir().unwrap();
        let search = Search::new(config(tmp.path())).unwrap();
        search.generate(false).unwrap();
        assert!(search.config().run_directory().is_complete());

        let (sink, handle) = ProgressSink::memory();
        let search = search.with_progress(Arc::new(sink));
        let report = search.generate(false).unwrap();
        assert!(report.skipped);
        assert!(!report.incomplete);
        assert!(!handle.contents().contains("may be incomplete"));
    }

    #[test]
    fn test_cancelled_generation_writes_nothing() {
        let tmp = tempdir().unwrap();
        let search = Search::new(config(tmp.path())).unwrap();
        search.cancellation().cancel();
        assert!(matches!(search.generate(false), Err(CuboidError::Cancelled)));
        let dir = search.config().run_directory();
        assert!(dir.list_runs().unwrap().is_empty());
        assert!(!dir.is_complete());
    }

    #[test]
    fn test_fixture_needs_pair_layout() {
        let tmp = tempdir().unwrap();
        let search = Search::new(SearchConfig {
            layout: RecordLayout::Quadruple,
            ..config(tmp.path())
        })
        .unwrap();
        assert!(matches!(search.generate(true), Err(CuboidError::Config(_))));
    }

    #[test]
    fn test_summary_lines() {
        let tmp = tempdir().unwrap();
        let search = Search::new(config(tmp.path())).unwrap();
        let summary = search.check(true).unwrap();
        let analysis = summary.analysis.as_ref().unwrap();
        assert_eq!(analysis.cross_run_duplicates, 1);
        assert_eq!(analysis.run_files, 2);
        let lines = summary.lines();
        assert!(lines[0].starts_with("[summary] G in (1, 300], layout pair"));
        assert!(lines.iter().any(|l| l == "[summary] findings: 2"));

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["analysis"]["findings"][0]["g"], 270);
        assert_eq!(json["layout"], "pair");
    }
}
