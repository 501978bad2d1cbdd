use crate::buffer::SerializationBuffer;
use crate::record::LogRecord;
use std::error::Error;

/// Error returned by a [`RecordSerializer`].
pub type SerializeError = Box<dyn Error + Send + Sync>;

/// Turns a [`LogRecord`] into bytes for the active log file.
///
/// The worker calls `serialize` on its own thread, once per record, with a
/// cleared pooled buffer. Implementations append the encoded record and
/// nothing else; the worker writes the record separator itself.
///
/// **Returns**
/// - `Ok(())` if the whole record was written into `buffer`.
/// - `Err(..)` if the record could not be encoded. The buffer may hold a
///   partial encoding; the worker discards it and writes a diagnostic
///   fallback record (see [`LogRecord::serialization_fallback`]) instead.
pub trait RecordSerializer: Send + Sync {
    fn serialize(
        &self,
        record: &LogRecord,
        buffer: &mut SerializationBuffer,
    ) -> Result<(), SerializeError>;
}

/// One JSON object per record (`serde_json`).
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonSerializer;

impl RecordSerializer for JsonSerializer {
    fn serialize(
        &self,
        record: &LogRecord,
        buffer: &mut SerializationBuffer,
    ) -> Result<(), SerializeError> {
        serde_json::to_writer(buffer, record)?;
        Ok(())
    }
}
