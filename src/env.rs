/// Environment variable names recognized by
/// [`FileLoggerOptions::apply_env`](crate::options::FileLoggerOptions::apply_env).
///
/// These are purely an overlay; options built in code never read the
/// environment on their own.

/// Overrides `ApplicationName`.
pub const FILE_LOG_APPLICATION_NAME_ENV: &str = "FILE_LOG_APPLICATION_NAME";

/// Overrides `LogFileDirectory`; may contain `{ApplicationName}`.
pub const FILE_LOG_DIRECTORY_ENV: &str = "FILE_LOG_DIRECTORY";

/// Overrides `LogFileArchiveDirectory`.
pub const FILE_LOG_ARCHIVE_DIRECTORY_ENV: &str = "FILE_LOG_ARCHIVE_DIRECTORY";

/// Overrides `LogFileMaxSizeInKilobytes`; `0` disables size rotation.
pub const FILE_LOG_MAX_SIZE_KB_ENV: &str = "FILE_LOG_MAX_SIZE_KB";

/// Overrides `LogFileNamePattern`.
pub const FILE_LOG_NAME_PATTERN_ENV: &str = "FILE_LOG_NAME_PATTERN";

/// Read a non-empty environment variable.
pub fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read an environment variable or fall back to a provided default.
pub fn env_or(key: &str, default: &str) -> String {
    env_var(key).unwrap_or_else(|| default.to_string())
}
