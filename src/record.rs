use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a [`LogRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "Trace",
            Self::Debug => "Debug",
            Self::Information => "Information",
            Self::Warning => "Warning",
            Self::Error => "Error",
            Self::Critical => "Critical",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optional numeric/named event identifier attached by the front-end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventId {
    pub id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Captured exception tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub stack_frames: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<ExceptionInfo>,
}

/// One structured log record as produced by the logging front-end.
///
/// Records are immutable once enqueued; the worker consumes each exactly once.
/// `group_name` may be left unset, in which case the worker classifies the
/// record by its category using the configured group filters.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub timestamp: DateTime<Utc>,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<EventId>,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    pub category: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<ExceptionInfo>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<serde_json::Value>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl LogRecord {
    /// Minimal record stamped with the current time and calling thread.
    pub fn new(level: LogLevel, category: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            thread_id: current_thread_id(),
            event_id: None,
            level,
            group_name: None,
            category: category.into(),
            content: content.into(),
            exception: None,
            scopes: Vec::new(),
            extra: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group_name = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }

    /// Diagnostic stand-in written when serializing `self` failed.
    ///
    /// Keeps the envelope (time, thread, level, group, category, event id) and
    /// replaces everything the front-end supplied with plain strings, so the
    /// result only contains fields that always serialize.
    pub fn serialization_fallback(&self, error: &dyn fmt::Display) -> LogRecord {
        let mut extra = BTreeMap::new();
        extra.insert(
            "original_content".to_string(),
            serde_json::Value::String(self.content.clone()),
        );

        LogRecord {
            timestamp: self.timestamp,
            thread_id: self.thread_id.clone(),
            event_id: self.event_id.clone(),
            level: self.level,
            group_name: self.group_name.clone(),
            category: self.category.clone(),
            content: format!("failed to serialize log record: {}", error),
            exception: None,
            scopes: Vec::new(),
            extra,
        }
    }
}

/// Numeric id of the calling thread as a string ("ThreadId(7)" -> "7").
pub fn current_thread_id() -> String {
    let raw = format!("{:?}", std::thread::current().id());
    raw.trim_start_matches("ThreadId(")
        .trim_end_matches(')')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_keeps_envelope_and_original_content() {
        let record = LogRecord::new(LogLevel::Warning, "app::db", "slow query")
            .with_group("Data")
            .with_extra("rows", 12);

        let fallback = record.serialization_fallback(&"boom");

        assert_eq!(fallback.timestamp, record.timestamp);
        assert_eq!(fallback.level, LogLevel::Warning);
        assert_eq!(fallback.group_name.as_deref(), Some("Data"));
        assert_eq!(fallback.category, "app::db");
        assert!(fallback.content.contains("boom"));
        assert_eq!(
            fallback.extra.get("original_content"),
            Some(&serde_json::Value::String("slow query".into()))
        );
        assert!(!fallback.extra.contains_key("rows"));
    }

    #[test]
    fn thread_id_is_numeric() {
        let id = current_thread_id();
        assert!(id.chars().all(|c| c.is_ascii_digit()), "unexpected id {id}");
    }

    #[test]
    fn empty_optional_fields_are_omitted() {
        let record = LogRecord::new(LogLevel::Information, "cat", "hello");
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("exception").is_none());
        assert!(json.get("extra").is_none());
        assert_eq!(json["level"], "Information");
    }
}
