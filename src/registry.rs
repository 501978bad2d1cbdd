//! Live log file handles
//!
//! The registry maps a resolved base file name to the one handle currently
//! being written for it, and decides when that handle must be replaced:
//!
//! - **cutover**: the UTC date moved past the day the handle was opened; the
//!   old file is closed and archived, and a handle for the freshly rendered
//!   name replaces it.
//! - **rotation**: the handle is toxic (a write failed) or its file reached
//!   the size ceiling; a sibling at the next rotation index replaces it.
//!
//! Only the worker thread touches the registry, so nothing here locks.

use chrono::{NaiveDate, NaiveTime, Utc};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::clock::Clock;
use crate::diagnostics::RateLimitedLogger;
use crate::fs::{is_lock_error, FileSystem, LogStream};
use crate::options::ResolvedOptions;
use crate::template::{rotated_file_name, TemplateEngine};

/// Written after every serialized record.
pub const LINE_ENDING: &str = if cfg!(windows) { "\r\n" } else { "\n" };

/// Upper bound on rotation indexes tried for one base name.
pub const MAX_ROTATION_INDEX: u32 = 9_999;

/// Consecutive locked candidates after which the lookup gives up.
pub const MAX_LOCKED_CANDIDATES: u32 = 16;

/// An open log file.
pub struct LogFileHandle {
    base_file_name: Arc<str>,
    index: u32,
    creation_date_utc: NaiveDate,
    file_name: String,
    path: PathBuf,
    stream: Box<dyn LogStream>,
    toxic: bool,
}

impl LogFileHandle {
    pub fn base_file_name(&self) -> &str {
        &self.base_file_name
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn creation_date_utc(&self) -> NaiveDate {
        self.creation_date_utc
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_toxic(&self) -> bool {
        self.toxic
    }

    /// Retire this handle; the next lookup for its base name rotates.
    pub fn mark_toxic(&mut self) {
        self.toxic = true;
    }

    /// Append one serialized record plus [`LINE_ENDING`] and flush.
    pub fn write_record(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.stream.write_all(bytes)?;
        self.stream.write_all(LINE_ENDING.as_bytes())?;
        self.stream.flush()
    }

    fn is_over_ceiling(&self, max_size_kb: u64) -> bool {
        if max_size_kb == 0 {
            return false;
        }
        match self.stream.len() {
            Ok(len) => len / 1024 >= max_size_kb,
            // A file we can no longer stat is not worth writing to.
            Err(_) => true,
        }
    }
}

impl fmt::Debug for LogFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogFileHandle")
            .field("file_name", &self.file_name)
            .field("index", &self.index)
            .field("creation_date_utc", &self.creation_date_utc)
            .field("toxic", &self.toxic)
            .finish_non_exhaustive()
    }
}

/// Outcome of one archival pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub moved: usize,
    pub skipped: usize,
}

#[derive(Clone, Copy)]
enum Lookup {
    Reuse,
    Create,
    Cutover,
    Rotate(u32),
}

pub struct LogFileRegistry {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    engine: TemplateEngine,
    live: HashMap<Arc<str>, LogFileHandle>,
    /// Group name -> base file name as last rendered.
    group_cache: HashMap<String, Arc<str>>,
    open_errors: RateLimitedLogger,
}

impl LogFileRegistry {
    pub fn new(fs: Arc<dyn FileSystem>, clock: Arc<dyn Clock>, engine: TemplateEngine) -> Self {
        Self {
            fs,
            clock,
            engine,
            live: HashMap::new(),
            group_cache: HashMap::new(),
            open_errors: RateLimitedLogger::default(),
        }
    }

    pub fn engine(&self) -> &TemplateEngine {
        &self.engine
    }

    /// Handle that records for `group_name` should be written to now, or
    /// `None` when no file could be opened.
    pub fn find_log_file(
        &mut self,
        options: &ResolvedOptions,
        group_name: &str,
    ) -> Option<&mut LogFileHandle> {
        let today = self.clock.utc_now().date_naive();
        let base = match self.group_cache.get(group_name) {
            Some(base) => Arc::clone(base),
            None => self.render_base_name(options, group_name),
        };

        let lookup = match self.live.get(&*base) {
            None => Lookup::Create,
            Some(handle) if today > handle.creation_date_utc => Lookup::Cutover,
            Some(handle) if handle.toxic || handle.is_over_ceiling(options.max_size_kb) => {
                Lookup::Rotate(handle.index + 1)
            }
            Some(_) => Lookup::Reuse,
        };

        match lookup {
            Lookup::Reuse => self.live.get_mut(&*base),
            Lookup::Rotate(index) => {
                let handle = self.create_new_log_file(options, &base, index)?;
                tracing::debug!(file = handle.file_name(), "rotated log file");
                Some(self.install(base, handle))
            }
            Lookup::Create | Lookup::Cutover => {
                if matches!(lookup, Lookup::Cutover) {
                    if let Some(old) = self.live.remove(&*base) {
                        self.archive_retired(options, old);
                    }
                }
                // The cached name may predate today's date tokens.
                let fresh = self.render_base_name(options, group_name);
                if self.live.contains_key(&*fresh) {
                    return self.find_log_file(options, group_name);
                }
                let handle = self.create_new_log_file(options, &fresh, 0)?;
                Some(self.install(fresh, handle))
            }
        }
    }

    fn render_base_name(&mut self, options: &ResolvedOptions, group_name: &str) -> Arc<str> {
        let base: Arc<str> = self
            .engine
            .generate_file_name(
                &options.application_name,
                self.clock.as_ref(),
                &file_safe_group_name(group_name),
                &options.file_name_pattern,
            )
            .into();
        self.group_cache
            .insert(group_name.to_string(), Arc::clone(&base));
        base
    }

    fn install(&mut self, base: Arc<str>, handle: LogFileHandle) -> &mut LogFileHandle {
        match self.live.entry(base) {
            Entry::Occupied(mut slot) => {
                // Replaced handle's stream closes here.
                slot.insert(handle);
                slot.into_mut()
            }
            Entry::Vacant(slot) => slot.insert(handle),
        }
    }

    /// Open the first usable file for `base_file_name` at or after
    /// `start_index`, skipping full and locked files.
    pub fn create_new_log_file(
        &self,
        options: &ResolvedOptions,
        base_file_name: &str,
        start_index: u32,
    ) -> Option<LogFileHandle> {
        let creation_date_utc = self.clock.utc_now().date_naive();
        let mut locked = 0;

        for index in start_index..=MAX_ROTATION_INDEX {
            let file_name = rotated_file_name(base_file_name, index);
            let path = options.log_directory.join(&file_name);

            let stream = match self.fs.open_append(&path) {
                Ok(stream) => stream,
                Err(e) if is_lock_error(&e) => {
                    locked += 1;
                    if locked >= MAX_LOCKED_CANDIDATES {
                        self.open_errors.error(
                            &format!("{locked} log files in a row are locked, last {}", path.display()),
                            &e,
                        );
                        return None;
                    }
                    tracing::debug!(path = %path.display(), error = %e, "log file locked, trying next index");
                    continue;
                }
                Err(e) => {
                    self.open_errors
                        .error(&format!("failed to open log file {}", path.display()), &e);
                    return None;
                }
            };

            locked = 0;
            if options.max_size_kb > 0 {
                match stream.len() {
                    Ok(len) if len / 1024 >= options.max_size_kb => continue,
                    Ok(_) => {}
                    Err(e) => {
                        self.open_errors
                            .error(&format!("failed to stat log file {}", path.display()), &e);
                        return None;
                    }
                }
            }

            return Some(LogFileHandle {
                base_file_name: Arc::from(base_file_name),
                index,
                creation_date_utc,
                file_name,
                path,
                stream,
                toxic: false,
            });
        }

        tracing::error!(
            base_file_name,
            max_index = MAX_ROTATION_INDEX,
            "no usable rotation index left for log file"
        );
        None
    }

    fn archive_retired(&self, options: &ResolvedOptions, handle: LogFileHandle) {
        let path = handle.path.clone();
        drop(handle);
        match self.archive_file(options, &path) {
            Ok(true) => tracing::debug!(path = %path.display(), "archived log file at cutover"),
            Ok(false) => {}
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "cutover archival deferred")
            }
        }
    }

    /// Move every closed log file created before today (UTC) into the
    /// archive directory.
    pub fn archive_log_files(&self, options: &ResolvedOptions) -> ArchiveReport {
        let mut report = ArchiveReport::default();
        let wildcard = self
            .engine
            .generate_wildcard_file_name(&options.application_name, &options.file_name_pattern);
        let pattern = match glob::Pattern::new(&wildcard) {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::warn!(pattern = %wildcard, error = %e, "cannot build archival glob");
                return report;
            }
        };

        let files = match self.fs.list_files(&options.log_directory, &pattern) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(
                    directory = %options.log_directory.display(),
                    error = %e,
                    "failed to enumerate log files for archival"
                );
                return report;
            }
        };

        let start_of_today = utc_midnight(self.clock.as_ref());

        for path in files {
            if self.live.values().any(|h| h.path == path) {
                report.skipped += 1;
                continue;
            }
            let eligible = matches!(self.fs.created_utc(&path), Ok(created) if created < start_of_today);
            if !eligible {
                report.skipped += 1;
                continue;
            }
            match self.archive_file(options, &path) {
                Ok(true) => report.moved += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "log file left in place");
                    report.skipped += 1;
                }
            }
        }

        if report.moved > 0 {
            tracing::info!(moved = report.moved, skipped = report.skipped, "archived log files");
        }
        report
    }

    /// Ok(false) when the archive already holds a file of that name.
    fn archive_file(&self, options: &ResolvedOptions, path: &Path) -> io::Result<bool> {
        let Some(file_name) = path.file_name() else {
            return Ok(false);
        };
        let destination = options.archive_directory.join(file_name);
        if self.fs.file_exists(&destination) {
            return Ok(false);
        }
        self.fs.rename(path, &destination)?;
        Ok(true)
    }

    /// Close handles opened on an earlier UTC date so archival can move
    /// their files. Returns how many were closed.
    pub fn retire_stale(&mut self) -> usize {
        let today = self.clock.utc_now().date_naive();
        let before = self.live.len();
        self.live.retain(|_, handle| handle.creation_date_utc >= today);
        let retired = before - self.live.len();
        if retired > 0 {
            self.group_cache.clear();
            tracing::debug!(retired, "closed log files from previous day");
        }
        retired
    }

    /// Forget rendered base names; the next lookup per group re-renders.
    pub fn clear_group_cache(&mut self) {
        self.group_cache.clear();
    }

    /// Flush and close every handle.
    pub fn close_all(&mut self) {
        for (_, mut handle) in self.live.drain() {
            if let Err(e) = handle.stream.flush() {
                tracing::warn!(path = %handle.path.display(), error = %e, "flush on close failed");
            }
        }
        self.group_cache.clear();
    }

    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    pub fn is_live(&self, path: &Path) -> bool {
        self.live.values().any(|h| h.path == path)
    }
}

impl Drop for LogFileRegistry {
    fn drop(&mut self) {
        self.close_all();
    }
}

const SEPARATORS: &[char] = &['/', '\\'];

/// Group names come from records; keep them from naming other directories.
fn file_safe_group_name(group_name: &str) -> Cow<'_, str> {
    if group_name.contains(SEPARATORS) {
        Cow::Owned(group_name.replace(SEPARATORS, "_"))
    } else {
        Cow::Borrowed(group_name)
    }
}

fn utc_midnight(clock: &dyn Clock) -> chrono::DateTime<Utc> {
    clock.utc_now().date_naive().and_time(NaiveTime::MIN).and_utc()
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod registry_test;
