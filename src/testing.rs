//! In-memory clock and file system used by the unit tests.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc, Weekday,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::fs::{FileSystem, LogStream};

#[derive(Debug, Clone, Copy)]
enum Zone {
    Fixed(FixedOffset),
    /// US Pacific with the post-2007 daylight-saving rules.
    Pacific,
}

/// Settable clock with a configurable local zone.
pub(crate) struct ManualClock {
    utc: Mutex<DateTime<Utc>>,
    zone: Zone,
}

impl ManualClock {
    pub(crate) fn utc(now: DateTime<Utc>) -> Self {
        Self::fixed(now, FixedOffset::east_opt(0).unwrap())
    }

    pub(crate) fn fixed(now: DateTime<Utc>, offset: FixedOffset) -> Self {
        Self {
            utc: Mutex::new(now),
            zone: Zone::Fixed(offset),
        }
    }

    pub(crate) fn fixed_local(local: NaiveDateTime, offset: FixedOffset) -> Self {
        let clock = Self::fixed(Utc::now(), offset);
        let utc = clock.to_utc(local);
        clock.set(utc);
        clock
    }

    pub(crate) fn pacific_local(local: NaiveDateTime) -> Self {
        let clock = Self {
            utc: Mutex::new(Utc::now()),
            zone: Zone::Pacific,
        };
        let utc = clock.to_utc(local);
        clock.set(utc);
        clock
    }

    pub(crate) fn set(&self, now: DateTime<Utc>) {
        *self.utc.lock() = now;
    }

    pub(crate) fn advance(&self, by: Duration) {
        *self.utc.lock() += by;
    }
}

fn pacific_dst_bounds_local(year: i32) -> (NaiveDateTime, NaiveDateTime) {
    let start = NaiveDate::from_weekday_of_month_opt(year, 3, Weekday::Sun, 2)
        .unwrap()
        .and_hms_opt(2, 0, 0)
        .unwrap();
    let end = NaiveDate::from_weekday_of_month_opt(year, 11, Weekday::Sun, 1)
        .unwrap()
        .and_hms_opt(2, 0, 0)
        .unwrap();
    (start, end)
}

impl Clock for ManualClock {
    fn utc_now(&self) -> DateTime<Utc> {
        *self.utc.lock()
    }

    fn to_local(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        match self.zone {
            Zone::Fixed(offset) => utc.with_timezone(&offset).naive_local(),
            Zone::Pacific => {
                let naive = utc.naive_utc();
                let (start, end) = pacific_dst_bounds_local(naive.year());
                // start is in PST (-8), end is in PDT (-7)
                let start_utc = start + Duration::hours(8);
                let end_utc = end + Duration::hours(7);
                let offset = if naive >= start_utc && naive < end_utc { 7 } else { 8 };
                naive - Duration::hours(offset)
            }
        }
    }

    fn to_utc(&self, local: NaiveDateTime) -> DateTime<Utc> {
        match self.zone {
            Zone::Fixed(offset) => offset
                .from_local_datetime(&local)
                .single()
                .unwrap()
                .with_timezone(&Utc),
            Zone::Pacific => {
                let (start, end) = pacific_dst_bounds_local(local.year());
                if local >= start && local < start + Duration::hours(1) {
                    // skipped hour: first valid instant after the gap
                    return (local + Duration::hours(8)).and_utc();
                }
                let offset = if local >= start && local < end { 7 } else { 8 };
                (local + Duration::hours(offset)).and_utc()
            }
        }
    }
}

struct MemFile {
    data: Arc<Mutex<Vec<u8>>>,
    created: DateTime<Utc>,
    write_fault: Arc<AtomicBool>,
}

#[derive(Default)]
struct MemState {
    files: BTreeMap<PathBuf, MemFile>,
    dirs: BTreeSet<PathBuf>,
    locked: BTreeSet<PathBuf>,
    broken: BTreeSet<PathBuf>,
    locked_moves: BTreeSet<PathBuf>,
    fail_listing: bool,
    renames: usize,
    removes: usize,
}

/// Thread-safe in-memory [`FileSystem`]; new files take the clock's time as
/// their creation time.
pub(crate) struct MemoryFileSystem {
    clock: Arc<dyn Clock>,
    state: Mutex<MemState>,
}

struct MemStream {
    data: Arc<Mutex<Vec<u8>>>,
    write_fault: Arc<AtomicBool>,
}

impl Write for MemStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.write_fault.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        self.data.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.write_fault.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::Other, "no space left on device"));
        }
        Ok(())
    }
}

impl LogStream for MemStream {
    fn len(&self) -> io::Result<u64> {
        Ok(self.data.lock().len() as u64)
    }
}

impl MemoryFileSystem {
    pub(crate) fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            state: Mutex::new(MemState::default()),
        }
    }

    pub(crate) fn add_file(&self, path: impl Into<PathBuf>, contents: &[u8], created: DateTime<Utc>) {
        let path = path.into();
        let mut state = self.state.lock();
        if let Some(parent) = path.parent() {
            state.dirs.insert(parent.to_path_buf());
        }
        state.files.insert(
            path,
            MemFile {
                data: Arc::new(Mutex::new(contents.to_vec())),
                created,
                write_fault: Arc::new(AtomicBool::new(false)),
            },
        );
    }

    pub(crate) fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let state = self.state.lock();
        state.files.get(path.as_ref()).map(|f| f.data.lock().clone())
    }

    pub(crate) fn exists(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().files.contains_key(path.as_ref())
    }

    pub(crate) fn contents_str(&self, path: impl AsRef<Path>) -> String {
        String::from_utf8(self.contents(path).unwrap_or_default()).unwrap()
    }

    pub(crate) fn file_names(&self, dir: impl AsRef<Path>) -> Vec<String> {
        let state = self.state.lock();
        state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir.as_ref()))
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
            .collect()
    }

    /// Opening `path` fails as if another process held it.
    pub(crate) fn lock(&self, path: impl Into<PathBuf>) {
        self.state.lock().locked.insert(path.into());
    }

    /// Opening `path` fails with a non-lock error.
    pub(crate) fn break_path(&self, path: impl Into<PathBuf>) {
        self.state.lock().broken.insert(path.into());
    }

    /// Moving `path` fails as if a reader held it.
    pub(crate) fn lock_for_move(&self, path: impl Into<PathBuf>) {
        self.state.lock().locked_moves.insert(path.into());
    }

    pub(crate) fn unlock_for_move(&self, path: impl AsRef<Path>) {
        self.state.lock().locked_moves.remove(path.as_ref());
    }

    pub(crate) fn fail_listing(&self, fail: bool) {
        self.state.lock().fail_listing = fail;
    }

    /// Writes to `path` (existing or future streams) fail.
    pub(crate) fn set_write_fault(&self, path: impl AsRef<Path>, fault: bool) {
        let state = self.state.lock();
        if let Some(file) = state.files.get(path.as_ref()) {
            file.write_fault.store(fault, Ordering::SeqCst);
        }
    }

    /// Streams currently open on `path`.
    pub(crate) fn open_streams(&self, path: impl AsRef<Path>) -> usize {
        let state = self.state.lock();
        state
            .files
            .get(path.as_ref())
            .map_or(0, |f| Arc::strong_count(&f.data) - 1)
    }

    pub(crate) fn rename_count(&self) -> usize {
        self.state.lock().renames
    }

    pub(crate) fn remove_count(&self) -> usize {
        self.state.lock().removes
    }
}

impl FileSystem for MemoryFileSystem {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        for ancestor in path.ancestors() {
            if ancestor.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(ancestor.to_path_buf());
        }
        Ok(())
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.state.lock().files.contains_key(path)
    }

    fn dir_exists(&self, path: &Path) -> bool {
        self.state.lock().dirs.contains(path)
    }

    fn open_append(&self, path: &Path) -> io::Result<Box<dyn LogStream>> {
        let now = self.clock.utc_now();
        let mut state = self.state.lock();
        if state.locked.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "file is being used by another process",
            ));
        }
        if state.broken.contains(path) {
            return Err(io::Error::new(io::ErrorKind::Other, "device error"));
        }
        let file = state.files.entry(path.to_path_buf()).or_insert_with(|| MemFile {
            data: Arc::new(Mutex::new(Vec::new())),
            created: now,
            write_fault: Arc::new(AtomicBool::new(false)),
        });
        Ok(Box::new(MemStream {
            data: Arc::clone(&file.data),
            write_fault: Arc::clone(&file.write_fault),
        }))
    }

    fn rename(&self, from: &Path, to: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        if state.locked_moves.contains(from) {
            return Err(io::Error::new(io::ErrorKind::PermissionDenied, "file is locked"));
        }
        let file = state
            .files
            .remove(from)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.files.insert(to.to_path_buf(), file);
        state.renames += 1;
        Ok(())
    }

    fn remove_file(&self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        state
            .files
            .remove(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;
        state.removes += 1;
        Ok(())
    }

    fn list_files(&self, dir: &Path, pattern: &glob::Pattern) -> io::Result<Vec<PathBuf>> {
        let state = self.state.lock();
        if state.fail_listing {
            return Err(io::Error::new(io::ErrorKind::Other, "listing failed"));
        }
        Ok(state
            .files
            .keys()
            .filter(|p| p.parent() == Some(dir))
            .filter(|p| {
                p.file_name()
                    .is_some_and(|n| pattern.matches(&n.to_string_lossy()))
            })
            .cloned()
            .collect())
    }

    fn created_utc(&self, path: &Path) -> io::Result<DateTime<Utc>> {
        self.state
            .lock()
            .files
            .get(path)
            .map(|f| f.created)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}
