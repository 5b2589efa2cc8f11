//! Log writer module
//!
//! Provides the thread-safe sink behind the tracing subscriber: stdout by
//! default, or a log file opened in append mode.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use tracing_subscriber::fmt::MakeWriter;

/// Log output target
#[derive(Clone)]
enum LogTarget {
    /// Write to stdout
    Stdout,
    /// Write to file
    File(Arc<Mutex<File>>),
}

/// Cloneable writer factory handed to the fmt layer
#[derive(Clone)]
pub struct LogWriter {
    target: LogTarget,
}

impl LogWriter {
    /// Create a writer for the optional log file path (stdout if `None`)
    pub fn open(log_file: Option<&str>) -> io::Result<Self> {
        let target = match log_file {
            Some(path) => LogTarget::File(Arc::new(Mutex::new(open_log_file(path)?))),
            None => LogTarget::Stdout,
        };
        Ok(Self { target })
    }

    pub const fn is_file(&self) -> bool {
        matches!(self.target, LogTarget::File(_))
    }
}

/// Per-event handle produced by [`LogWriter`]
pub enum LogHandle {
    Stdout(io::Stdout),
    File(Arc<Mutex<File>>),
}

impl Write for LogHandle {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Stdout(out) => out.write(buf),
            Self::File(file) => file
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Stdout(out) => out.flush(),
            Self::File(file) => file.lock().unwrap_or_else(PoisonError::into_inner).flush(),
        }
    }
}

impl<'a> MakeWriter<'a> for LogWriter {
    type Writer = LogHandle;

    fn make_writer(&'a self) -> Self::Writer {
        match &self.target {
            LogTarget::Stdout => LogHandle::Stdout(io::stdout()),
            LogTarget::File(file) => LogHandle::File(Arc::clone(file)),
        }
    }
}

/// Open or create a log file for appending
fn open_log_file(path: &str) -> io::Result<File> {
    // Create parent directories if they don't exist
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    OpenOptions::new().create(true).append(true).open(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_target_creates_parents_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/logs/server.log");
        let path_str = path.to_str().unwrap();

        let writer = LogWriter::open(Some(path_str)).unwrap();
        assert!(writer.is_file());
        writer.make_writer().write_all(b"first\n").unwrap();

        // Reopening appends instead of truncating
        let writer = LogWriter::open(Some(path_str)).unwrap();
        writer.make_writer().write_all(b"second\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "first\nsecond\n");
    }

    #[test]
    fn test_stdout_target() {
        let writer = LogWriter::open(None).unwrap();
        assert!(!writer.is_file());
        assert!(matches!(writer.make_writer(), LogHandle::Stdout(_)));
    }
}
