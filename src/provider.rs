use std::sync::Arc;

use crate::buffer::{BufferPool, DEFAULT_BUFFER_CAPACITY, DEFAULT_POOL_SIZE};
use crate::clock::{Clock, SystemClock};
use crate::error::{Result, SinkError};
use crate::fs::{FileSystem, StdFileSystem};
use crate::options::{FileLoggerOptions, OptionsMonitor, ResolvedOptions};
use crate::record::LogRecord;
use crate::serializer::{JsonSerializer, RecordSerializer};
use crate::template::TemplateEngine;
use crate::worker::{LogSinkWorker, SinkHandle, WorkerContext, WorkerMetricsSnapshot};

/// Composition root of the sink: validated options, the worker thread and
/// the collaborators they share.
///
/// Dropping the provider shuts the worker down after it has written
/// everything already queued.
pub struct FileLoggerProvider {
    worker: LogSinkWorker,
    monitor: Arc<OptionsMonitor>,
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    engine: TemplateEngine,
    buffers: Arc<BufferPool>,
}

/// Builder for [`FileLoggerProvider`]; every collaborator has a real default.
pub struct FileLoggerProviderBuilder {
    fs: Arc<dyn FileSystem>,
    clock: Arc<dyn Clock>,
    serializer: Arc<dyn RecordSerializer>,
    machine_name: Option<String>,
    pool_size: usize,
    buffer_capacity: usize,
}

impl Default for FileLoggerProviderBuilder {
    fn default() -> Self {
        Self {
            fs: Arc::new(StdFileSystem),
            clock: Arc::new(SystemClock),
            serializer: Arc::new(JsonSerializer),
            machine_name: None,
            pool_size: DEFAULT_POOL_SIZE,
            buffer_capacity: DEFAULT_BUFFER_CAPACITY,
        }
    }
}

impl FileLoggerProviderBuilder {
    pub fn file_system(mut self, fs: Arc<dyn FileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn serializer(mut self, serializer: Arc<dyn RecordSerializer>) -> Self {
        self.serializer = serializer;
        self
    }

    /// Value of `{MachineName}`; defaults to the host name.
    pub fn machine_name(mut self, name: impl Into<String>) -> Self {
        self.machine_name = Some(name.into());
        self
    }

    pub fn buffer_pool(mut self, pool_size: usize, buffer_capacity: usize) -> Self {
        self.pool_size = pool_size;
        self.buffer_capacity = buffer_capacity;
        self
    }

    /// Validate `options` (creating directories and running the disk
    /// self-test when enabled) and start the worker.
    pub fn build(self, options: &FileLoggerOptions) -> Result<FileLoggerProvider> {
        let engine = match self.machine_name {
            Some(name) => TemplateEngine::with_machine_name(name),
            None => TemplateEngine::new(),
        };
        let resolved =
            ResolvedOptions::resolve(options, self.fs.as_ref(), self.clock.as_ref(), &engine)?;
        tracing::info!(
            application = %resolved.application_name,
            directory = %resolved.log_directory.display(),
            archive_directory = %resolved.archive_directory.display(),
            pattern = %resolved.file_name_pattern,
            "file log sink starting"
        );

        let monitor = Arc::new(OptionsMonitor::new(resolved));
        let buffers = Arc::new(BufferPool::new(self.pool_size, self.buffer_capacity));
        let worker = LogSinkWorker::start(WorkerContext {
            fs: Arc::clone(&self.fs),
            clock: Arc::clone(&self.clock),
            serializer: self.serializer,
            engine: engine.clone(),
            options: Arc::clone(&monitor),
            buffers: Arc::clone(&buffers),
        })
        .map_err(SinkError::Spawn)?;

        Ok(FileLoggerProvider {
            worker,
            monitor,
            fs: self.fs,
            clock: self.clock,
            engine,
            buffers,
        })
    }
}

impl FileLoggerProvider {
    pub fn builder() -> FileLoggerProviderBuilder {
        FileLoggerProviderBuilder::default()
    }

    /// Provider on the real file system and clock.
    pub fn new(options: &FileLoggerOptions) -> Result<Self> {
        Self::builder().build(options)
    }

    pub fn handle(&self) -> SinkHandle {
        self.worker.handle()
    }

    pub fn log(&self, record: LogRecord) {
        self.worker.enqueue(record);
    }

    pub fn options(&self) -> Arc<ResolvedOptions> {
        self.monitor.current()
    }

    /// Validate and publish new options. Open files stay open; new names and
    /// groups apply from the next lookup per group. On error the running
    /// options are kept.
    pub fn reload(&self, options: &FileLoggerOptions) -> Result<()> {
        let resolved = ResolvedOptions::resolve(
            options,
            self.fs.as_ref(),
            self.clock.as_ref(),
            &self.engine,
        )?;
        self.monitor.publish(resolved);
        self.worker.reschedule();
        tracing::info!(generation = self.monitor.generation(), "file log sink options reloaded");
        Ok(())
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.worker.metrics()
    }

    pub fn buffer_pool(&self) -> &BufferPool {
        &self.buffers
    }

    /// Stop the worker after it drains the queue.
    pub fn shutdown(mut self) -> WorkerMetricsSnapshot {
        self.worker.shutdown()
    }
}

impl std::fmt::Debug for FileLoggerProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileLoggerProvider")
            .field("application", &self.monitor.current().application_name)
            .field("generation", &self.monitor.generation())
            .finish_non_exhaustive()
    }
}
