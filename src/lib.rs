//! Rotating, crash-tolerant file sink for structured log records.
//!
//! Producers hand [`LogRecord`]s to a [`SinkHandle`]; a single worker thread
//! writes them to one file per group and UTC day, rotates on size or write
//! failure, and moves old files to an archive directory on a schedule.
//!
//! ```no_run
//! use file_log_sink::{FileLoggerOptions, FileLoggerProvider, LogLevel, LogRecord};
//!
//! let provider = FileLoggerProvider::new(&FileLoggerOptions::default())?;
//! provider.log(LogRecord::new(LogLevel::Information, "app::startup", "ready"));
//! provider.shutdown();
//! # Ok::<(), file_log_sink::SinkError>(())
//! ```

pub mod buffer;
pub mod clock;
pub mod diagnostics;
pub mod env;
pub mod error;
pub mod fs;
pub mod groups;
pub mod options;
pub mod provider;
pub mod record;
pub mod registry;
pub mod schedule;
pub mod serializer;
pub mod signal;
pub mod template;
pub mod timer;
pub mod worker;

#[cfg(feature = "layer")]
pub mod init;
#[cfg(feature = "layer")]
pub mod layer;

#[cfg(test)]
mod testing;

pub use error::{ConfigError, SinkError};
pub use options::FileLoggerOptions;
pub use provider::FileLoggerProvider;
pub use record::{LogLevel, LogRecord};
pub use worker::SinkHandle;
