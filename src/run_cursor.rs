use crate::merge::KWayMerge;
use crate::record::{Record, RecordLayout};
use crate::run_dir::RunDirectory;
use crate::CuboidError;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::{Path, PathBuf};

const READ_BUFFER_BYTES: usize = 1 << 20;

/// Sequential reader over one run file.
///
/// End of file ends the stream. A partial trailing record, an I/O error or an
/// undecodable record retires the reader with a warning instead of failing.
pub struct RunReader {
    reader: BufReader<File>,
    path: PathBuf,
    layout: RecordLayout,
    slot: [u8; 32],
    records: u64,
    done: bool,
}

impl RunReader {
    pub fn open(path: &Path, layout: RecordLayout) -> Result<Self, CuboidError> {
        let file = File::open(path).map_err(CuboidError::Io)?;
        let len = file.metadata().map_err(CuboidError::Io)?.len();
        let tail = len % layout.record_size() as u64;
        if tail != 0 {
            tracing::warn!(
                "[cursor] {} ends with a partial record; ignoring the last {} bytes",
                path.display(),
                tail
            );
        }

        Ok(Self {
            reader: BufReader::with_capacity(READ_BUFFER_BYTES, file),
            path: path.to_path_buf(),
            layout,
            slot: [0u8; 32],
            records: 0,
            done: false,
        })
    }

    /// Records read so far.
    pub fn records(&self) -> u64 {
        self.records
    }

    fn retire(&mut self, reason: impl std::fmt::Display) {
        tracing::warn!(
            "[cursor] retiring {} after {} records: {}",
            self.path.display(),
            self.records,
            reason
        );
        self.done = true;
    }
}

impl Iterator for RunReader {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        if self.done {
            return None;
        }

        let size = self.layout.record_size();
        match self.reader.read_exact(&mut self.slot[..size]) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.retire(e);
                return None;
            }
        }

        match Record::decode(self.layout, &self.slot[..size]) {
            Ok(record) => {
                self.records += 1;
                Some(record)
            }
            Err(e) => {
                self.retire(e);
                None
            }
        }
    }
}

/// Forward-only cursor over every run file of a directory, yielding records in
/// global ascending order with duplicates across files removed.
pub struct RunMergeCursor {
    merge: KWayMerge<RunReader>,
    files: usize,
}

impl RunMergeCursor {
    /// Discovers the run files once; files created later are not seen.
    pub fn open(dir: &RunDirectory) -> Result<Self, CuboidError> {
        let paths: Vec<PathBuf> = dir.list_runs()?.into_iter().map(|(_, path)| path).collect();
        Self::from_paths(&paths, dir.layout())
    }

    pub fn from_paths(paths: &[PathBuf], layout: RecordLayout) -> Result<Self, CuboidError> {
        let readers = paths
            .iter()
            .map(|path| RunReader::open(path, layout))
            .collect::<Result<Vec<_>, _>>()?;
        tracing::debug!("[cursor] merging {} run files", readers.len());
        Ok(Self {
            files: readers.len(),
            merge: KWayMerge::new(readers),
        })
    }

    pub fn file_count(&self) -> usize {
        self.files
    }

    /// Cross-file duplicates skipped so far.
    pub fn duplicates_skipped(&self) -> u64 {
        self.merge.duplicates_skipped()
    }
}

impl Iterator for RunMergeCursor {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        self.merge.next()
    }
}
