use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

/// Write-only channel for human-readable progress and summary lines.
///
/// Each line is prefixed with a unix timestamp. Write failures are logged and
/// otherwise ignored; nothing here feeds back into the search.
pub struct ProgressSink {
    out: Mutex<Box<dyn Write + Send>>,
    echo_stdout: bool,
}

impl ProgressSink {
    pub fn new(out: Box<dyn Write + Send>) -> Self {
        Self {
            out: Mutex::new(out),
            echo_stdout: false,
        }
    }

    pub fn stdout() -> Self {
        Self::new(Box::new(io::stdout()))
    }

    /// Appends to a summary file and mirrors every line to stdout.
    pub fn file(path: &Path) -> io::Result<Self> {
        let file: File = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            out: Mutex::new(Box::new(file)),
            echo_stdout: true,
        })
    }

    /// In-memory sink plus a handle to read back what was written.
    pub fn memory() -> (Self, MemorySink) {
        let handle = MemorySink::default();
        (Self::new(Box::new(handle.clone())), handle)
    }

    pub fn discard() -> Self {
        Self::new(Box::new(io::sink()))
    }

    pub fn line(&self, text: impl AsRef<str>) {
        let text = text.as_ref();
        tracing::debug!("{}", text);

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        if self.echo_stdout {
            println!("{} {}", timestamp, text);
        }

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{} {}", timestamp, text).and_then(|_| out.flush()) {
            tracing::warn!("[progress] failed to write progress line: {}", e);
        }
    }
}

/// Shared in-memory buffer used as a progress target.
#[derive(Clone, Default)]
pub struct MemorySink {
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl MemorySink {
    pub fn contents(&self) -> String {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).into_owned()
    }
}

impl Write for MemorySink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_collects_lines() {
        let (sink, handle) = ProgressSink::memory();
        sink.line("first");
        sink.line(format!("second {}", 2));
        let text = handle.contents();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with(" first"));
        assert!(lines[1].ends_with(" second 2"));
    }

    #[test]
    fn test_file_sink_appends() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("summary.txt");
        {
            let sink = ProgressSink::file(&path).unwrap();
            sink.line("one");
        }
        {
            let sink = ProgressSink::file(&path).unwrap();
            sink.line("two");
        }
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
    }
}
