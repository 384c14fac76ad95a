use crate::merge::KWayMerge;
use crate::record::{Record, RecordLayout};
use crate::run_dir::RunDirectory;
use crate::CuboidError;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Records accumulated in memory before one write call.
pub const RECORDS_PER_CHUNK: usize = 1 << 20;

/// Sequential run writer that batches encoded records into large chunks.
pub struct RunWriter<'a> {
    file: File,
    layout: RecordLayout,
    chunk: &'a mut Vec<u8>,
    chunk_bytes: usize,
    written: u64,
}

impl<'a> RunWriter<'a> {
    /// Creates the file (which must not exist) and writes through `chunk`.
    pub fn create(
        path: &Path,
        layout: RecordLayout,
        chunk: &'a mut Vec<u8>,
        chunk_records: usize,
    ) -> Result<Self, CuboidError> {
        let file = RunDirectory::create_new(path)?;
        let chunk_bytes = chunk_records.max(1) * layout.record_size();
        chunk.clear();
        chunk.reserve(chunk_bytes + layout.record_size());
        Ok(Self {
            file,
            layout,
            chunk,
            chunk_bytes,
            written: 0,
        })
    }

    pub fn push(&mut self, record: &Record) -> Result<(), CuboidError> {
        let start = self.chunk.len();
        self.chunk.resize(start + self.layout.record_size(), 0);
        record.encode_into(self.layout, &mut self.chunk[start..])?;
        self.written += 1;
        if self.chunk.len() >= self.chunk_bytes {
            self.write_chunk()?;
        }
        Ok(())
    }

    /// Writes the final partial chunk and syncs. Returns the record count.
    pub fn finish(mut self) -> Result<u64, CuboidError> {
        self.write_chunk()?;
        self.file.sync_all().map_err(CuboidError::Io)?;
        Ok(self.written)
    }

    fn write_chunk(&mut self) -> Result<(), CuboidError> {
        if self.chunk.is_empty() {
            return Ok(());
        }
        self.file.write_all(self.chunk).map_err(CuboidError::Io)?;
        self.chunk.clear();
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlushOutcome {
    pub index: u64,
    pub path: PathBuf,
    pub written: u64,
    pub duplicates: u64,
}

/// Merges drained buffers into the next numbered run file.
pub struct RunFlusher {
    dir: RunDirectory,
    next_index: u64,
    chunk_records: usize,
    chunk: Vec<u8>,
}

impl RunFlusher {
    /// Run indices start at 1 for every invocation.
    pub fn new(dir: RunDirectory) -> Self {
        Self::with_chunk_records(dir, RECORDS_PER_CHUNK)
    }

    pub fn with_chunk_records(dir: RunDirectory, chunk_records: usize) -> Self {
        Self {
            dir,
            next_index: 1,
            chunk_records,
            chunk: Vec::new(),
        }
    }

    pub fn next_index(&self) -> u64 {
        self.next_index
    }

    /// K-way merges the ascending `sources`, drops duplicates across them and
    /// writes one new run file. Nothing is written when every source is empty.
    pub fn write_run(&mut self, sources: Vec<Vec<Record>>) -> Result<Option<FlushOutcome>, CuboidError> {
        if sources.iter().all(Vec::is_empty) {
            return Ok(None);
        }
        self.dir.ensure_exists()?;

        let index = self.next_index;
        let path = self.dir.run_path(index);
        let layout = self.dir.layout();

        let mut merge = KWayMerge::new(sources.into_iter().map(Vec::into_iter).collect());
        let mut writer = RunWriter::create(&path, layout, &mut self.chunk, self.chunk_records)?;
        for record in merge.by_ref() {
            writer.push(&record)?;
        }
        let written = writer.finish()?;
        self.next_index += 1;

        tracing::debug!(
            "[flush] wrote {} records to {} ({} duplicates dropped)",
            written,
            path.display(),
            merge.duplicates_skipped()
        );

        Ok(Some(FlushOutcome {
            index,
            path,
            written,
            duplicates: merge.duplicates_skipped(),
        }))
    }

    /// Streams an already ordered record sequence into the named file,
    /// dropping adjacent duplicates.
    pub fn write_sorted_to(
        &mut self,
        path: &Path,
        records: impl Iterator<Item = Record>,
    ) -> Result<u64, CuboidError> {
        self.dir.ensure_exists()?;
        let layout = self.dir.layout();
        let mut writer = RunWriter::create(path, layout, &mut self.chunk, self.chunk_records)?;
        let mut last = None;
        for record in records {
            if last == Some(record) {
                continue;
            }
            writer.push(&record)?;
            last = Some(record);
        }
        writer.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn read_pairs(path: &Path) -> Vec<Record> {
        let bytes = fs::read(path).unwrap();
        bytes
            .chunks_exact(24)
            .map(|chunk| Record::decode(RecordLayout::Pair, chunk).unwrap())
            .collect()
    }

    #[test]
    fn test_write_run_merges_and_dedups_across_buffers() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let mut flusher = RunFlusher::new(dir);

        let outcome = flusher
            .write_run(vec![
                vec![Record::pair(44, 267, 271), Record::pair(125, 240, 271)],
                vec![Record::pair(117, 244, 271), Record::pair(125, 240, 271)],
            ])
            .unwrap()
            .unwrap();

        assert_eq!(outcome.index, 1);
        assert_eq!(outcome.written, 3);
        assert_eq!(outcome.duplicates, 1);
        assert_eq!(
            read_pairs(&outcome.path),
            vec![
                Record::pair(44, 267, 271),
                Record::pair(117, 244, 271),
                Record::pair(125, 240, 271)
            ]
        );
        assert_eq!(fs::metadata(&outcome.path).unwrap().len(), 72);
        assert_eq!(flusher.next_index(), 2);
    }

    #[test]
    fn test_small_chunks_flush_in_pieces() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let mut flusher = RunFlusher::with_chunk_records(dir, 3);

        let records: Vec<Record> = (1..=10).map(|g| Record::pair(1, 2, g)).collect();
        let outcome = flusher.write_run(vec![records.clone()]).unwrap().unwrap();
        assert_eq!(outcome.written, 10);
        assert_eq!(read_pairs(&outcome.path), records);
    }

    #[test]
    fn test_empty_sources_write_nothing() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let mut flusher = RunFlusher::new(dir.clone());
        assert!(flusher.write_run(vec![Vec::new(), Vec::new()]).unwrap().is_none());
        assert!(dir.list_runs().unwrap().is_empty());
        assert_eq!(flusher.next_index(), 1);
    }

    #[test]
    fn test_existing_run_file_is_fatal() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        fs::write(dir.run_path(1), b"stale").unwrap();

        let mut flusher = RunFlusher::new(dir.clone());
        let err = flusher
            .write_run(vec![vec![Record::pair(3, 4, 5)]])
            .unwrap_err();
        assert!(matches!(err, CuboidError::RunExists(ref p) if *p == dir.run_path(1)));
        assert_eq!(fs::read(dir.run_path(1)).unwrap(), b"stale");
    }

    #[test]
    fn test_quadruple_layout_uses_32_byte_slots() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Quadruple);
        let mut flusher = RunFlusher::new(dir);
        let outcome = flusher
            .write_run(vec![vec![Record::quadruple(1, 2, 2, 3), Record::quadruple(2, 3, 6, 7)]])
            .unwrap()
            .unwrap();
        assert_eq!(fs::metadata(&outcome.path).unwrap().len(), 64);
        assert!(outcome.path.to_string_lossy().ends_with("Cuboid.1.npt4"));
    }
}
