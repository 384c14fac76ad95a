use crate::generator::EdgeBounds;
use crate::record::RecordLayout;
use crate::run_dir::RunDirectory;
use crate::CuboidError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for one search. G bounds are `low < G <= high`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub threads: usize,
    /// Unflushed records across all buffers that trigger a run file.
    pub run_size: usize,
    pub min_odd: u64,
    pub min_even: u64,
    pub low: u64,
    pub high: u64,
    pub min_group_size: usize,
    pub group_batch: usize,
    /// Generation work unit, in values of m (or of A for quadruples).
    pub m_chunk: u64,
    pub workdir: PathBuf,
    pub prefix: String,
    pub layout: RecordLayout,
    /// Bounded work queue capacity. Zero means twice the thread count.
    pub queue_depth: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        Self {
            threads,
            run_size: 10_000_000,
            min_odd: 0,
            min_even: 0,
            low: 1,
            high: 1_000,
            min_group_size: 3,
            group_batch: 1000,
            m_chunk: 10,
            workdir: PathBuf::from("Working"),
            prefix: "Cuboid".to_string(),
            layout: RecordLayout::Pair,
            queue_depth: 0,
        }
    }
}

impl SearchConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, CuboidError> {
        let text = fs::read_to_string(path).map_err(|e| {
            CuboidError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        serde_json::from_str(&text)
            .map_err(|e| CuboidError::Config(format!("invalid config {}: {}", path.display(), e)))
    }

    pub fn validate(&self) -> Result<(), CuboidError> {
        if self.threads == 0 {
            return Err(CuboidError::Config("threads must be at least 1".to_string()));
        }
        if self.run_size == 0 {
            return Err(CuboidError::Config("run_size must be at least 1".to_string()));
        }
        if self.group_batch == 0 {
            return Err(CuboidError::Config("group_batch must be at least 1".to_string()));
        }
        if self.m_chunk == 0 {
            return Err(CuboidError::Config("m_chunk must be at least 1".to_string()));
        }
        if self.low == 0 {
            return Err(CuboidError::Config("low must be at least 1".to_string()));
        }
        if self.high <= self.low {
            return Err(CuboidError::Config(format!(
                "high ({}) must be greater than low ({})",
                self.high, self.low
            )));
        }
        if self.layout == RecordLayout::Pair && self.min_group_size < 3 {
            return Err(CuboidError::Config(format!(
                "min_group_size must be at least 3 for pair records, got {}",
                self.min_group_size
            )));
        }
        if self.prefix.is_empty() || self.prefix.contains(['/', '\\']) {
            return Err(CuboidError::Config(format!(
                "prefix {:?} is not a plain file name",
                self.prefix
            )));
        }
        Ok(())
    }

    pub fn queue_depth(&self) -> usize {
        if self.queue_depth == 0 {
            self.threads * 2
        } else {
            self.queue_depth
        }
    }

    /// Quadruple records are checked one by one, so every group qualifies.
    pub fn effective_min_group_size(&self) -> usize {
        match self.layout {
            RecordLayout::Pair => self.min_group_size,
            RecordLayout::Quadruple => 1,
        }
    }

    pub fn edge_bounds(&self) -> EdgeBounds {
        EdgeBounds {
            min_odd: self.min_odd,
            min_even: self.min_even,
        }
    }

    pub fn run_directory(&self) -> RunDirectory {
        RunDirectory::new(&self.workdir, &self.prefix, self.layout)
    }

    pub fn summary_path(&self) -> PathBuf {
        self.workdir
            .join(format!("cuboid_summary_{}-{}.txt", self.low, self.high))
    }
}
