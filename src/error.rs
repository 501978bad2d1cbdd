//! Error types

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while validating or applying [`FileLoggerOptions`](crate::options::FileLoggerOptions).
///
/// All of these are fatal: a sink is never started with options that failed
/// validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file name pattern contains a character that cannot appear in a path
    #[error("log file name pattern '{pattern}' contains illegal character {ch:?}")]
    InvalidPattern { pattern: String, ch: char },

    /// A group's category filter is not a valid glob
    #[error("group '{group}' has invalid category filter '{filter}': {source}")]
    InvalidCategoryFilter {
        group: String,
        filter: String,
        #[source]
        source: glob::PatternError,
    },

    /// The log or archive directory could not be created
    #[error("failed to create directory '{}': {source}", path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The startup write/move/delete probe failed
    #[error("disk self-test failed to {stage} '{}': {source}", path.display())]
    DiskTest {
        stage: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid {field}: {message}")]
    InvalidValue { field: &'static str, message: String },
}

impl ConfigError {
    pub fn invalid_value(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised while constructing or reconfiguring a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn log sink worker: {0}")]
    Spawn(#[source] io::Error),
}

pub type Result<T> = std::result::Result<T, SinkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_pattern_names_character() {
        let err = ConfigError::InvalidPattern {
            pattern: "a|b.log".into(),
            ch: '|',
        };
        assert!(err.to_string().contains("a|b.log"));
        assert!(err.to_string().contains("'|'"));
    }

    #[test]
    fn disk_test_names_stage_and_path() {
        let err = ConfigError::DiskTest {
            stage: "move",
            path: PathBuf::from("logs/probe.tmp"),
            source: io::Error::from(io::ErrorKind::PermissionDenied),
        };
        let text = err.to_string();
        assert!(text.contains("move"));
        assert!(text.contains("probe.tmp"));
    }

    #[test]
    fn sink_error_wraps_config_error_transparently() {
        let err: SinkError = ConfigError::invalid_value("LogFileCutoverTime", "not a time").into();
        assert_eq!(err.to_string(), "invalid LogFileCutoverTime: not a time");
    }
}
