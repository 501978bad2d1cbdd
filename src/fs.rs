//! File-system capability consumed by the registry and options validation.

use chrono::{DateTime, Utc};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Append-only stream to one log file.
pub trait LogStream: Write + Send {
    /// Current length of the underlying file in bytes.
    fn len(&self) -> io::Result<u64>;
}

pub trait FileSystem: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    fn file_exists(&self, path: &Path) -> bool;

    fn dir_exists(&self, path: &Path) -> bool;

    /// Open or create `path` for appending, leaving it readable by others.
    fn open_append(&self, path: &Path) -> io::Result<Box<dyn LogStream>>;

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    fn remove_file(&self, path: &Path) -> io::Result<()>;

    /// Files directly inside `dir` whose name matches `pattern`.
    fn list_files(&self, dir: &Path, pattern: &glob::Pattern) -> io::Result<Vec<PathBuf>>;

    fn created_utc(&self, path: &Path) -> io::Result<DateTime<Utc>>;
}

/// True when `err` means another process holds the file.
pub fn is_lock_error(err: &io::Error) -> bool {
    // ERROR_SHARING_VIOLATION / ERROR_LOCK_VIOLATION
    if cfg!(windows) && matches!(err.raw_os_error(), Some(32) | Some(33)) {
        return true;
    }
    matches!(
        err.kind(),
        io::ErrorKind::PermissionDenied | io::ErrorKind::WouldBlock
    )
}

/// [`FileSystem`] backed by `std::fs`.
#[derive(Clone, Copy, Debug, Default)]
pub struct StdFileSystem;

struct FileStream {
    file: File,
}

impl Write for FileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl LogStream for FileStream {
    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }
}

impl FileSystem for StdFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn LogStream>> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Box::new(FileStream { file }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path)
    }

    fn list_files(&self, dir: &Path, pattern: &glob::Pattern) -> io::Result<Vec<PathBuf>> {
        let mut matches = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let name = entry.file_name();
            if pattern.matches(&name.to_string_lossy()) {
                matches.push(entry.path());
            }
        }
        matches.sort();
        Ok(matches)
    }

    fn created_utc(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        let metadata = fs::metadata(path)?;
        // Not every file system records birth time.
        let time = metadata.created().or_else(|_| metadata.modified())?;
        Ok(DateTime::<Utc>::from(time))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn append_stream_reports_length_and_appends() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.log");
        let fs = StdFileSystem;

        let mut stream = fs.open_append(&path).unwrap();
        stream.write_all(b"one\n").unwrap();
        stream.flush().unwrap();
        drop(stream);

        let mut stream = fs.open_append(&path).unwrap();
        assert_eq!(stream.len().unwrap(), 4);
        stream.write_all(b"two\n").unwrap();
        drop(stream);

        assert_eq!(std::fs::read(&path).unwrap(), b"one\ntwo\n");
    }

    #[test]
    fn list_files_filters_by_glob() {
        let dir = TempDir::new().unwrap();
        for name in ["App.20240101.log", "App.20240101.1.log", "Other.log"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("App.dir.log")).unwrap();

        let pattern = glob::Pattern::new("App.*.*log").unwrap();
        let files = StdFileSystem.list_files(dir.path(), &pattern).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();

        assert_eq!(names, vec!["App.20240101.1.log", "App.20240101.log"]);
    }

    #[test]
    fn lock_errors_are_recognized() {
        assert!(is_lock_error(&io::Error::from(io::ErrorKind::PermissionDenied)));
        assert!(!is_lock_error(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
