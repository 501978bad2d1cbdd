use crate::record::{current_thread_id, EventId, LogLevel, LogRecord};
use crate::worker::SinkHandle;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// Targets under this prefix are the sink's own diagnostics and are never
/// written back into the sink.
const SELF_TARGET_PREFIX: &str = "file_log_sink";

/// Field that carries an explicit group name.
pub const GROUP_FIELD: &str = "group";

/// Field that carries a numeric event id.
pub const EVENT_ID_FIELD: &str = "event_id";

/// `tracing_subscriber` layer that turns events into [`LogRecord`]s and
/// queues them on a file log sink.
///
/// Mapping: target -> category, `message` -> content, `group` -> group name,
/// `event_id` -> event id, names of the enclosing spans (root first) ->
/// scopes, every other field -> extension data. Enqueueing never blocks.
pub struct FileLogLayer {
    sink: SinkHandle,
    min_level: Level,
    /// Total events seen by the layer (before filtering by level).
    pub total_events: Arc<AtomicU64>,
    /// Events handed to the sink.
    pub enqueued_events: Arc<AtomicU64>,
}

impl FileLogLayer {
    /// Layer forwarding events at `min_level` and more severe.
    pub fn new(sink: SinkHandle, min_level: Level) -> Self {
        Self {
            sink,
            min_level,
            total_events: Arc::new(AtomicU64::new(0)),
            enqueued_events: Arc::new(AtomicU64::new(0)),
        }
    }
}

fn map_level(level: &Level) -> LogLevel {
    match *level {
        Level::TRACE => LogLevel::Trace,
        Level::DEBUG => LogLevel::Debug,
        Level::INFO => LogLevel::Information,
        Level::WARN => LogLevel::Warning,
        _ => LogLevel::Error,
    }
}

impl<S> Layer<S> for FileLogLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        self.total_events.fetch_add(1, Ordering::Relaxed);
        let meta = event.metadata();
        // Level ordering: TRACE > DEBUG > ... > ERROR
        if *meta.level() > self.min_level || meta.target().starts_with(SELF_TARGET_PREFIX) {
            return;
        }

        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);

        let scopes = ctx
            .event_scope(event)
            .map(|scope| {
                scope
                    .from_root()
                    .map(|span| serde_json::Value::String(span.name().to_string()))
                    .collect()
            })
            .unwrap_or_default();

        let record = LogRecord {
            timestamp: Utc::now(),
            thread_id: current_thread_id(),
            event_id: visitor.event_id.map(|id| EventId { id, name: None }),
            level: map_level(meta.level()),
            group_name: visitor.group,
            category: meta.target().to_string(),
            content: visitor.message.unwrap_or_default(),
            exception: None,
            scopes,
            extra: visitor.fields,
        };

        self.sink.enqueue(record);
        self.enqueued_events.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Default)]
pub struct FieldVisitor {
    pub fields: BTreeMap<String, serde_json::Value>,
    pub message: Option<String>,
    pub group: Option<String>,
    pub event_id: Option<i64>,
}

impl FieldVisitor {
    fn insert(&mut self, field: &Field, value: serde_json::Value) {
        self.fields.insert(field.name().to_string(), value);
    }
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        match field.name() {
            "message" => self.message = Some(value.to_string()),
            GROUP_FIELD => self.group = Some(value.to_string()),
            _ => self.insert(field, serde_json::Value::String(value.to_string())),
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        if field.name() == EVENT_ID_FIELD {
            self.event_id = Some(value);
        } else {
            self.insert(field, serde_json::Value::from(value));
        }
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        match i64::try_from(value) {
            Ok(id) if field.name() == EVENT_ID_FIELD => self.event_id = Some(id),
            _ => self.insert(field, serde_json::Value::from(value)),
        }
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.insert(field, serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        match field.name() {
            "message" => self.message = Some(format!("{:?}", value)),
            GROUP_FIELD => self.group = Some(format!("{:?}", value).trim_matches('"').to_string()),
            _ => self.insert(field, serde_json::Value::String(format!("{:?}", value))),
        }
    }
}
