use crate::record::RecordLayout;
use crate::CuboidError;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

/// Where run files live and how they are named: `<workdir>/<prefix>.<index>.<ext>`.
#[derive(Clone, Debug)]
pub struct RunDirectory {
    workdir: PathBuf,
    prefix: String,
    layout: RecordLayout,
}

impl RunDirectory {
    pub fn new(workdir: impl Into<PathBuf>, prefix: impl Into<String>, layout: RecordLayout) -> Self {
        Self {
            workdir: workdir.into(),
            prefix: prefix.into(),
            layout,
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn layout(&self) -> RecordLayout {
        self.layout
    }

    pub fn ensure_exists(&self) -> Result<(), CuboidError> {
        fs::create_dir_all(&self.workdir).map_err(CuboidError::Io)
    }

    pub fn run_path(&self, index: u64) -> PathBuf {
        self.workdir
            .join(format!("{}.{}.{}", self.prefix, index, self.layout.extension()))
    }

    pub fn merged_path(&self) -> PathBuf {
        self.workdir
            .join(format!("{}.merged.{}", self.prefix, self.layout.extension()))
    }

    /// Written once generation finished; its absence means the runs may be
    /// a partial set.
    pub fn complete_path(&self) -> PathBuf {
        self.workdir
            .join(format!("{}.complete.{}", self.prefix, self.layout.extension()))
    }

    pub fn mark_complete(&self, runs: u64) -> Result<(), CuboidError> {
        fs::write(self.complete_path(), format!("{}\n", runs)).map_err(CuboidError::Io)
    }

    pub fn is_complete(&self) -> bool {
        self.complete_path().is_file()
    }

    /// Creates a new run file. An existing file at that path is a hard failure:
    /// indices are never reused within a working directory.
    pub fn create_new(path: &Path) -> Result<File, CuboidError> {
        OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => CuboidError::RunExists(path.to_path_buf()),
                _ => CuboidError::Io(e),
            })
    }

    /// Numbered run files of this layout, sorted by index. The merged file is
    /// not included.
    pub fn list_runs(&self) -> Result<Vec<(u64, PathBuf)>, CuboidError> {
        let mut runs = Vec::new();
        if !self.workdir.is_dir() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.workdir).map_err(CuboidError::Io)? {
            let entry = entry.map_err(CuboidError::Io)?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            if let Some(index) = path
                .file_name()
                .and_then(|name| name.to_str())
                .and_then(|name| self.parse_index(name))
            {
                runs.push((index, path));
            }
        }

        runs.sort_by_key(|(index, _)| *index);
        Ok(runs)
    }

    /// Deletes every numbered run file, the merged file and the completion
    /// marker of this layout.
    pub fn remove_runs(&self) -> Result<usize, CuboidError> {
        let runs = self.list_runs()?;
        let removed = runs.len();
        for (_, path) in runs {
            fs::remove_file(&path).map_err(CuboidError::Io)?;
        }
        for extra in [self.merged_path(), self.complete_path()] {
            if extra.exists() {
                fs::remove_file(&extra).map_err(CuboidError::Io)?;
            }
        }
        Ok(removed)
    }

    fn parse_index(&self, file_name: &str) -> Option<u64> {
        file_name
            .strip_prefix(self.prefix.as_str())?
            .strip_prefix('.')?
            .strip_suffix(self.layout.extension())?
            .strip_suffix('.')?
            .parse()
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_run_path_pattern() {
        let dir = RunDirectory::new("Working", "Cuboid", RecordLayout::Pair);
        assert_eq!(dir.run_path(7), PathBuf::from("Working/Cuboid.7.nptf"));
        assert_eq!(dir.merged_path(), PathBuf::from("Working/Cuboid.merged.nptf"));
    }

    #[test]
    fn test_list_runs_sorted_numerically() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        for index in [10, 2, 1] {
            fs::write(dir.run_path(index), b"").unwrap();
        }
        fs::write(dir.merged_path(), b"").unwrap();
        fs::write(tmp.path().join("Cuboid.3.npt4"), b"").unwrap();
        fs::write(tmp.path().join("Other.4.nptf"), b"").unwrap();

        let indices: Vec<u64> = dir.list_runs().unwrap().into_iter().map(|(i, _)| i).collect();
        assert_eq!(indices, vec![1, 2, 10]);
    }

    #[test]
    fn test_create_new_refuses_existing() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        let path = dir.run_path(1);
        RunDirectory::create_new(&path).unwrap();
        match RunDirectory::create_new(&path) {
            Err(CuboidError::RunExists(p)) => assert_eq!(p, path),
            other => panic!("expected RunExists, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_missing_workdir_has_no_runs() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path().join("absent"), "Cuboid", RecordLayout::Pair);
        assert!(dir.list_runs().unwrap().is_empty());
    }

    #[test]
    fn test_remove_runs() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        fs::write(dir.run_path(1), b"").unwrap();
        fs::write(dir.run_path(2), b"").unwrap();
        fs::write(dir.merged_path(), b"").unwrap();
        dir.mark_complete(2).unwrap();
        assert!(dir.is_complete());
        assert_eq!(dir.remove_runs().unwrap(), 2);
        assert!(dir.list_runs().unwrap().is_empty());
        assert!(!dir.merged_path().exists());
        assert!(!dir.is_complete());
    }

    #[test]
    fn test_completion_marker_is_not_a_run() {
        let tmp = tempdir().unwrap();
        let dir = RunDirectory::new(tmp.path(), "Cuboid", RecordLayout::Pair);
        assert!(!dir.is_complete());
        dir.mark_complete(0).unwrap();
        assert!(dir.is_complete());
        assert_eq!(dir.complete_path(), tmp.path().join("Cuboid.complete.nptf"));
        assert!(dir.list_runs().unwrap().is_empty());
    }
}
