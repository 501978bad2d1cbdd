//! Sink configuration
//!
//! [`FileLoggerOptions`] is the raw, deserializable surface. It is turned into
//! a validated [`ResolvedOptions`] snapshot by [`ResolvedOptions::resolve`],
//! and published to the worker through an [`OptionsMonitor`].

use arc_swap::ArcSwap;
use chrono::NaiveTime;
use serde::Deserialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::clock::Clock;
use crate::env;
use crate::error::ConfigError;
use crate::fs::FileSystem;
use crate::groups::{GroupClassifier, GroupOption};
use crate::schedule::{ScheduleOptions, TimeZoneMode};
use crate::template::TemplateEngine;

pub const DEFAULT_LOG_FILE_DIRECTORY: &str = "logs/{ApplicationName}";
pub const DEFAULT_LOG_FILE_ARCHIVE_DIRECTORY: &str = "logs/{ApplicationName}/archive";
pub const DEFAULT_GROUPED_FILE_NAME_PATTERN: &str =
    "{ApplicationName}.{GroupName}.{DateTimeUtc:yyyyMMdd}.log";
pub const DEFAULT_FILE_NAME_PATTERN: &str = "{ApplicationName}.{DateTimeUtc:yyyyMMdd}.log";
pub const DEFAULT_MAX_SIZE_KB: u64 = 10 * 1024;

const ILLEGAL_PATTERN_CHARS: &[char] = &['<', '>', '"', '|', '?', '*'];

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct FileLoggerOptions {
    pub application_name: String,
    pub log_file_directory: String,
    pub log_file_archive_directory: String,
    pub include_group_name_in_file_name: bool,
    /// 0 disables size-based rotation.
    pub log_file_max_size_in_kilobytes: u64,
    pub log_file_name_pattern: Option<String>,
    pub test_disk_on_startup: bool,
    pub archive_log_files_on_startup: bool,
    pub cutover_and_archive_time_zone_mode: TimeZoneMode,
    #[serde(with = "time_of_day")]
    pub log_file_cutover_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub log_file_archive_time: NaiveTime,
    pub group_options: Vec<GroupOption>,
}

impl Default for FileLoggerOptions {
    fn default() -> Self {
        let schedule = ScheduleOptions::default();
        Self {
            application_name: default_application_name(),
            log_file_directory: DEFAULT_LOG_FILE_DIRECTORY.to_string(),
            log_file_archive_directory: DEFAULT_LOG_FILE_ARCHIVE_DIRECTORY.to_string(),
            include_group_name_in_file_name: true,
            log_file_max_size_in_kilobytes: DEFAULT_MAX_SIZE_KB,
            log_file_name_pattern: None,
            test_disk_on_startup: true,
            archive_log_files_on_startup: false,
            cutover_and_archive_time_zone_mode: schedule.mode,
            log_file_cutover_time: schedule.cutover_time,
            log_file_archive_time: schedule.archive_time,
            group_options: Vec::new(),
        }
    }
}

/// File stem of the running executable.
pub fn default_application_name() -> String {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "app".to_string())
}

impl FileLoggerOptions {
    /// Pattern used when none is configured explicitly.
    pub fn effective_pattern(&self) -> &str {
        match &self.log_file_name_pattern {
            Some(pattern) if !pattern.trim().is_empty() => pattern,
            _ if self.include_group_name_in_file_name => DEFAULT_GROUPED_FILE_NAME_PATTERN,
            _ => DEFAULT_FILE_NAME_PATTERN,
        }
    }

    /// Overlay `FILE_LOG_*` environment variables.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        self.apply_env_with(env::env_var)
    }

    /// Overlay variables resolved through `lookup` instead of the process
    /// environment.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(name) = lookup(env::FILE_LOG_APPLICATION_NAME_ENV) {
            self.application_name = name;
        }
        if let Some(dir) = lookup(env::FILE_LOG_DIRECTORY_ENV) {
            self.log_file_directory = dir;
        }
        if let Some(dir) = lookup(env::FILE_LOG_ARCHIVE_DIRECTORY_ENV) {
            self.log_file_archive_directory = dir;
        }
        if let Some(size) = lookup(env::FILE_LOG_MAX_SIZE_KB_ENV) {
            self.log_file_max_size_in_kilobytes = size.trim().parse().map_err(|e| {
                ConfigError::invalid_value("LogFileMaxSizeInKilobytes", format!("'{size}': {e}"))
            })?;
        }
        if let Some(pattern) = lookup(env::FILE_LOG_NAME_PATTERN_ENV) {
            self.log_file_name_pattern = Some(pattern);
        }
        Ok(())
    }

    pub fn schedule(&self) -> ScheduleOptions {
        ScheduleOptions {
            mode: self.cutover_and_archive_time_zone_mode,
            cutover_time: self.log_file_cutover_time,
            archive_time: self.log_file_archive_time,
        }
    }
}

/// Validated settings the worker runs on.
#[derive(Debug, Clone)]
pub struct ResolvedOptions {
    pub application_name: String,
    pub log_directory: PathBuf,
    pub archive_directory: PathBuf,
    pub file_name_pattern: String,
    pub max_size_kb: u64,
    pub archive_on_startup: bool,
    pub schedule: ScheduleOptions,
    pub classifier: GroupClassifier,
}

impl ResolvedOptions {
    /// Validate `options`, create the directories, and run the disk self-test
    /// when enabled.
    pub fn resolve(
        options: &FileLoggerOptions,
        fs: &dyn FileSystem,
        clock: &dyn Clock,
        engine: &TemplateEngine,
    ) -> Result<Self, ConfigError> {
        let application_name = options.application_name.trim();
        if application_name.is_empty() {
            return Err(ConfigError::invalid_value("ApplicationName", "must not be empty"));
        }

        let file_name_pattern = options.effective_pattern().to_string();
        validate_pattern(&file_name_pattern)?;

        let log_directory = resolve_directory(
            engine,
            clock,
            application_name,
            &options.log_file_directory,
            "LogFileDirectory",
        )?;
        let archive_directory = resolve_directory(
            engine,
            clock,
            application_name,
            &options.log_file_archive_directory,
            "LogFileArchiveDirectory",
        )?;
        if log_directory == archive_directory {
            return Err(ConfigError::invalid_value(
                "LogFileArchiveDirectory",
                "must differ from LogFileDirectory",
            ));
        }

        let classifier = GroupClassifier::new(&options.group_options)?;

        for dir in [&log_directory, &archive_directory] {
            fs.create_dir_all(dir)
                .map_err(|source| ConfigError::CreateDirectory {
                    path: dir.clone(),
                    source,
                })?;
        }

        if options.test_disk_on_startup {
            run_disk_test(fs, application_name, &log_directory, &archive_directory)?;
        }

        Ok(Self {
            application_name: application_name.to_string(),
            log_directory,
            archive_directory,
            file_name_pattern,
            max_size_kb: options.log_file_max_size_in_kilobytes,
            archive_on_startup: options.archive_log_files_on_startup,
            schedule: options.schedule(),
            classifier,
        })
    }
}

fn resolve_directory(
    engine: &TemplateEngine,
    clock: &dyn Clock,
    application_name: &str,
    template: &str,
    field: &'static str,
) -> Result<PathBuf, ConfigError> {
    if template.trim().is_empty() {
        return Err(ConfigError::invalid_value(field, "must not be empty"));
    }
    let resolved = engine.generate_file_name(application_name, clock, "", template);
    Ok(PathBuf::from(resolved))
}

fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let illegal = pattern
        .chars()
        .find(|c| c.is_control() || ILLEGAL_PATTERN_CHARS.contains(c));
    match illegal {
        Some(ch) => Err(ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            ch,
        }),
        None => Ok(()),
    }
}

pub(crate) fn disk_test_file_name(application_name: &str) -> String {
    format!("{application_name}.disk-test.tmp")
}

/// Write a probe file, move it to the archive directory, delete it.
fn run_disk_test(
    fs: &dyn FileSystem,
    application_name: &str,
    log_directory: &Path,
    archive_directory: &Path,
) -> Result<(), ConfigError> {
    let name = disk_test_file_name(application_name);
    let probe = log_directory.join(&name);
    let moved = archive_directory.join(&name);
    let failed = |stage: &'static str, path: &Path| {
        let path = path.to_path_buf();
        move |source| ConfigError::DiskTest {
            stage,
            path,
            source,
        }
    };

    let mut stream = fs.open_append(&probe).map_err(failed("write", &probe))?;
    stream
        .write_all(b"disk test")
        .and_then(|_| stream.flush())
        .map_err(failed("write", &probe))?;
    drop(stream);

    if fs.file_exists(&moved) {
        fs.remove_file(&moved).map_err(failed("delete", &moved))?;
    }
    fs.rename(&probe, &moved).map_err(failed("move", &probe))?;
    fs.remove_file(&moved).map_err(failed("delete", &moved))?;
    Ok(())
}

/// Latest validated options plus a generation counter bumped on each publish.
pub struct OptionsMonitor {
    current: ArcSwap<ResolvedOptions>,
    generation: AtomicU64,
}

impl OptionsMonitor {
    pub fn new(options: ResolvedOptions) -> Self {
        Self {
            current: ArcSwap::from_pointee(options),
            generation: AtomicU64::new(0),
        }
    }

    pub fn current(&self) -> Arc<ResolvedOptions> {
        self.current.load_full()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    pub fn publish(&self, options: ResolvedOptions) {
        self.current.store(Arc::new(options));
        self.generation.fetch_add(1, Ordering::Release);
    }
}

/// `HH:MM` or `HH:MM:SS`.
mod time_of_day {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        let text = text.trim();
        NaiveTime::parse_from_str(text, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(text, "%H:%M"))
            .map_err(|_| de::Error::custom(format!("invalid time of day '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ManualClock, MemoryFileSystem};
    use chrono::{TimeZone, Utc};

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::utc(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()))
    }

    fn options() -> FileLoggerOptions {
        FileLoggerOptions {
            application_name: "App".into(),
            ..FileLoggerOptions::default()
        }
    }

    #[test]
    fn deserializes_pascal_case_keys_with_defaults() {
        let json = r#"{
            "ApplicationName": "Orders",
            "LogFileMaxSizeInKilobytes": 0,
            "CutoverAndArchiveTimeZoneMode": "Utc",
            "LogFileArchiveTime": "03:15",
            "GroupOptions": [
                { "GroupName": "Http", "CategoryNameFilters": ["Orders.Http.*"] }
            ]
        }"#;
        let parsed: FileLoggerOptions = serde_json::from_str(json).unwrap();

        assert_eq!(parsed.application_name, "Orders");
        assert_eq!(parsed.log_file_max_size_in_kilobytes, 0);
        assert_eq!(parsed.cutover_and_archive_time_zone_mode, TimeZoneMode::Utc);
        assert_eq!(parsed.log_file_archive_time, NaiveTime::from_hms_opt(3, 15, 0).unwrap());
        assert_eq!(parsed.log_file_cutover_time, NaiveTime::MIN);
        assert_eq!(parsed.group_options[0].group_name, "Http");
        assert!(parsed.test_disk_on_startup);
        assert_eq!(parsed.log_file_directory, DEFAULT_LOG_FILE_DIRECTORY);
    }

    #[test]
    fn rejects_malformed_time_of_day() {
        let err = serde_json::from_str::<FileLoggerOptions>(r#"{"LogFileCutoverTime": "25:99"}"#)
            .unwrap_err();
        assert!(err.to_string().contains("25:99"));
    }

    #[test]
    fn effective_pattern_follows_group_flag() {
        let mut opts = options();
        assert_eq!(opts.effective_pattern(), DEFAULT_GROUPED_FILE_NAME_PATTERN);
        opts.include_group_name_in_file_name = false;
        assert_eq!(opts.effective_pattern(), DEFAULT_FILE_NAME_PATTERN);
        opts.log_file_name_pattern = Some("{ApplicationName}.txt".into());
        assert_eq!(opts.effective_pattern(), "{ApplicationName}.txt");
    }

    #[test]
    fn env_overlay_replaces_fields() {
        let mut opts = options();
        opts.apply_env_with(|key| match key {
            env::FILE_LOG_DIRECTORY_ENV => Some("/var/log/app".into()),
            env::FILE_LOG_MAX_SIZE_KB_ENV => Some("512".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(opts.log_file_directory, "/var/log/app");
        assert_eq!(opts.log_file_max_size_in_kilobytes, 512);
        assert_eq!(opts.application_name, "App");
    }

    #[test]
    fn env_overlay_rejects_bad_size() {
        let mut opts = options();
        let err = opts
            .apply_env_with(|key| (key == env::FILE_LOG_MAX_SIZE_KB_ENV).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "LogFileMaxSizeInKilobytes", .. }));
    }

    #[test]
    fn resolve_creates_directories_and_cleans_up_probe() {
        let clock = clock();
        let fs = MemoryFileSystem::new(clock.clone());
        let engine = TemplateEngine::with_machine_name("M");

        let resolved = ResolvedOptions::resolve(&options(), &fs, clock.as_ref(), &engine).unwrap();

        assert_eq!(resolved.log_directory, PathBuf::from("logs/App"));
        assert_eq!(resolved.archive_directory, PathBuf::from("logs/App/archive"));
        assert!(fs.dir_exists(&resolved.log_directory));
        assert!(fs.dir_exists(&resolved.archive_directory));
        assert_eq!(fs.rename_count(), 1);
        assert_eq!(fs.remove_count(), 1);
        assert!(fs.file_names("logs/App").is_empty());
        assert!(fs.file_names("logs/App/archive").is_empty());
    }

    #[test]
    fn resolve_skips_disk_test_when_disabled() {
        let clock = clock();
        let fs = MemoryFileSystem::new(clock.clone());
        let engine = TemplateEngine::with_machine_name("M");
        let opts = FileLoggerOptions {
            test_disk_on_startup: false,
            ..options()
        };

        ResolvedOptions::resolve(&opts, &fs, clock.as_ref(), &engine).unwrap();
        assert_eq!(fs.rename_count(), 0);
    }

    #[test]
    fn resolve_reports_failed_disk_test_stage() {
        let clock = clock();
        let fs = MemoryFileSystem::new(clock.clone());
        fs.lock_for_move(Path::new("logs/App").join(disk_test_file_name("App")));
        let engine = TemplateEngine::with_machine_name("M");

        let err = ResolvedOptions::resolve(&options(), &fs, clock.as_ref(), &engine).unwrap_err();
        assert!(matches!(err, ConfigError::DiskTest { stage: "move", .. }));
    }

    #[test]
    fn resolve_rejects_illegal_pattern_characters() {
        let clock = clock();
        let fs = MemoryFileSystem::new(clock.clone());
        let engine = TemplateEngine::with_machine_name("M");
        let opts = FileLoggerOptions {
            log_file_name_pattern: Some("{ApplicationName}|{GroupName}.log".into()),
            ..options()
        };

        let err = ResolvedOptions::resolve(&opts, &fs, clock.as_ref(), &engine).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPattern { ch: '|', .. }));
        assert!(!fs.dir_exists(Path::new("logs/App")));
    }

    #[test]
    fn monitor_bumps_generation_on_publish() {
        let clock = clock();
        let fs = MemoryFileSystem::new(clock.clone());
        let engine = TemplateEngine::with_machine_name("M");
        let first = ResolvedOptions::resolve(&options(), &fs, clock.as_ref(), &engine).unwrap();
        let monitor = OptionsMonitor::new(first);
        assert_eq!(monitor.generation(), 0);

        let next = FileLoggerOptions {
            log_file_max_size_in_kilobytes: 1,
            ..options()
        };
        monitor.publish(ResolvedOptions::resolve(&next, &fs, clock.as_ref(), &engine).unwrap());

        assert_eq!(monitor.generation(), 1);
        assert_eq!(monitor.current().max_size_kb, 1);
    }
}
