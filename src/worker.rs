//! Background writer
//!
//! Any number of producers push [`LogRecord`]s into a lock-free queue and
//! raise `message_ready`. One worker thread owns every file handle: it
//! drains the queue, serializes each record into a pooled buffer and appends
//! it to the group's current file. A one-shot timer raises `archive_now` at
//! the next cutover or archive instant; the worker then closes files from
//! earlier days, archives when due, and re-arms the timer.

use chrono::{DateTime, Utc};
use crossbeam::queue::SegQueue;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::buffer::BufferPool;
use crate::clock::Clock;
use crate::diagnostics::RateLimitedLogger;
use crate::fs::FileSystem;
use crate::options::{OptionsMonitor, ResolvedOptions};
use crate::record::LogRecord;
use crate::registry::LogFileRegistry;
use crate::schedule::ArchiveSchedule;
use crate::serializer::RecordSerializer;
use crate::signal::{Signal, WorkerSignals};
use crate::template::TemplateEngine;
use crate::timer::OneShotTimer;

/// Delay used instead of zero when re-arming right after serving an event,
/// so a clock sitting exactly on a scheduled instant cannot spin the loop.
const MIN_REARM_DELAY: Duration = Duration::from_secs(1);

/// Worker counters
#[derive(Debug, Default)]
pub struct WorkerMetrics {
    pub enqueued: AtomicU64,
    pub written: AtomicU64,
    /// Records lost: no file could be opened, a write failed, or the sink
    /// had already stopped.
    pub dropped: AtomicU64,
    pub serialization_fallbacks: AtomicU64,
    pub write_failures: AtomicU64,
    /// Passes that actually ran archival.
    pub archive_passes: AtomicU64,
    pub files_archived: AtomicU64,
}

/// Point-in-time copy of [`WorkerMetrics`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerMetricsSnapshot {
    pub enqueued: u64,
    pub written: u64,
    pub dropped: u64,
    pub serialization_fallbacks: u64,
    pub write_failures: u64,
    pub archive_passes: u64,
    pub files_archived: u64,
}

impl WorkerMetrics {
    pub fn snapshot(&self) -> WorkerMetricsSnapshot {
        WorkerMetricsSnapshot {
            enqueued: self.enqueued.load(Ordering::Relaxed),
            written: self.written.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            serialization_fallbacks: self.serialization_fallbacks.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            archive_passes: self.archive_passes.load(Ordering::Relaxed),
            files_archived: self.files_archived.load(Ordering::Relaxed),
        }
    }

    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

struct Shared {
    queue: SegQueue<LogRecord>,
    signals: WorkerSignals,
    metrics: WorkerMetrics,
    /// Set once the worker has finished its final drain.
    closed: AtomicBool,
}

impl Shared {
    fn new() -> Self {
        Self {
            queue: SegQueue::new(),
            signals: WorkerSignals::new(),
            metrics: WorkerMetrics::default(),
            closed: AtomicBool::new(false),
        }
    }

    /// Drop whatever is still queued, counting it as lost.
    fn discard_pending(&self) -> usize {
        let mut discarded = 0;
        while self.queue.pop().is_some() {
            WorkerMetrics::incr(&self.metrics.dropped);
            discarded += 1;
        }
        discarded
    }
}

/// Cloneable, non-blocking producer side of a running worker.
#[derive(Clone)]
pub struct SinkHandle {
    shared: Arc<Shared>,
}

impl SinkHandle {
    /// Queue `record` for writing. Never blocks on I/O.
    pub fn enqueue(&self, record: LogRecord) {
        let shared = &self.shared;
        if shared.signals.is_stopped() {
            WorkerMetrics::incr(&shared.metrics.dropped);
            return;
        }
        shared.queue.push(record);
        WorkerMetrics::incr(&shared.metrics.enqueued);
        shared.signals.set_message_ready();
        // The final drain may have finished between the check and the push.
        if shared.closed.load(Ordering::SeqCst) {
            shared.discard_pending();
        }
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    pub fn pending(&self) -> usize {
        self.shared.queue.len()
    }
}

impl std::fmt::Debug for SinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SinkHandle")
            .field("pending", &self.pending())
            .finish()
    }
}

/// Collaborators handed to the worker thread.
pub struct WorkerContext {
    pub fs: Arc<dyn FileSystem>,
    pub clock: Arc<dyn Clock>,
    pub serializer: Arc<dyn RecordSerializer>,
    pub engine: TemplateEngine,
    pub options: Arc<OptionsMonitor>,
    pub buffers: Arc<BufferPool>,
}

/// Owns the worker thread; stopping it drains the queue first.
pub struct LogSinkWorker {
    shared: Arc<Shared>,
    thread: Option<JoinHandle<()>>,
}

impl LogSinkWorker {
    pub fn start(context: WorkerContext) -> io::Result<Self> {
        let shared = Arc::new(Shared::new());

        let worker_loop = WorkerLoop::new(Arc::clone(&shared), context);
        let thread = thread::Builder::new()
            .name("file-log-sink".to_string())
            .spawn(move || worker_loop.run())?;

        Ok(Self {
            shared,
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> SinkHandle {
        SinkHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn enqueue(&self, record: LogRecord) {
        self.handle().enqueue(record);
    }

    /// Ask the worker to recompute its schedule (after an options reload).
    pub fn reschedule(&self) {
        self.shared.signals.set_archive_now();
    }

    pub fn metrics(&self) -> WorkerMetricsSnapshot {
        self.shared.metrics.snapshot()
    }

    /// Stop the worker, wait for it to write everything already queued, and
    /// return the final counters. Idempotent.
    pub fn shutdown(&mut self) -> WorkerMetricsSnapshot {
        if let Some(thread) = self.thread.take() {
            self.shared.signals.set_stop();
            if thread.join().is_err() {
                tracing::error!("log sink worker panicked");
            }
        }
        self.shared.metrics.snapshot()
    }
}

impl Drop for LogSinkWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}

struct WorkerLoop {
    shared: Arc<Shared>,
    registry: LogFileRegistry,
    clock: Arc<dyn Clock>,
    serializer: Arc<dyn RecordSerializer>,
    monitor: Arc<OptionsMonitor>,
    options: Arc<ResolvedOptions>,
    seen_generation: u64,
    buffers: Arc<BufferPool>,
    timer: Option<OneShotTimer>,
    started: bool,
    next_archive_utc: Option<DateTime<Utc>>,
    write_errors: RateLimitedLogger,
}

impl WorkerLoop {
    fn new(shared: Arc<Shared>, context: WorkerContext) -> Self {
        let seen_generation = context.options.generation();
        let options = context.options.current();
        let registry = LogFileRegistry::new(context.fs, Arc::clone(&context.clock), context.engine);

        Self {
            shared,
            registry,
            clock: context.clock,
            serializer: context.serializer,
            monitor: context.options,
            options,
            seen_generation,
            buffers: context.buffers,
            timer: None,
            started: false,
            next_archive_utc: None,
            write_errors: RateLimitedLogger::default(),
        }
    }

    fn run(mut self) {
        tracing::debug!("log sink worker started");
        loop {
            match self.shared.signals.wait_any() {
                Signal::Stop => break,
                Signal::ArchiveNow => self.on_archive_signal(),
                Signal::MessageReady => self.drain(true),
            }
        }

        // Final drain: write everything, no archival.
        self.drain(false);
        self.shared.closed.store(true, Ordering::SeqCst);
        let discarded = self.shared.discard_pending();
        if discarded > 0 {
            tracing::debug!(discarded, "records enqueued during shutdown were dropped");
        }
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.registry.close_all();
        tracing::debug!("log sink worker stopped");
    }

    fn refresh_options(&mut self) {
        let generation = self.monitor.generation();
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.options = self.monitor.current();
            self.registry.clear_group_cache();
        }
    }

    /// Process queued records. With `yield_to_archive`, stops early once an
    /// archive pass is pending so a flood cannot starve it.
    fn drain(&mut self, yield_to_archive: bool) {
        self.refresh_options();
        loop {
            if yield_to_archive && self.shared.signals.is_archive_now() {
                break;
            }
            let Some(record) = self.shared.queue.pop() else {
                break;
            };
            self.process(record);
        }
    }

    fn process(&mut self, record: LogRecord) {
        let metrics = &self.shared.metrics;
        let group = match record.group_name.as_deref() {
            Some(group) => group,
            None => self.options.classifier.classify(&record.category),
        };

        let Some(handle) = self.registry.find_log_file(&self.options, group) else {
            WorkerMetrics::incr(&metrics.dropped);
            return;
        };

        let mut buffer = self.buffers.get();
        if let Err(e) = self.serializer.serialize(&record, &mut buffer) {
            WorkerMetrics::incr(&metrics.serialization_fallbacks);
            tracing::debug!(category = %record.category, error = %e, "writing serialization fallback");
            buffer.clear();
            let fallback = record.serialization_fallback(&e);
            if let Err(e) = self.serializer.serialize(&fallback, &mut buffer) {
                WorkerMetrics::incr(&metrics.dropped);
                self.write_errors.error("failed to serialize fallback record", &e);
                self.buffers.put(buffer);
                return;
            }
        }

        match handle.write_record(buffer.as_bytes()) {
            Ok(()) => WorkerMetrics::incr(&metrics.written),
            Err(e) => {
                handle.mark_toxic();
                WorkerMetrics::incr(&metrics.write_failures);
                WorkerMetrics::incr(&metrics.dropped);
                self.write_errors.error(
                    &format!("failed to write log file {}", handle.path().display()),
                    &e,
                );
            }
        }
        self.buffers.put(buffer);
    }

    fn on_archive_signal(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.cancel();
        }
        self.refresh_options();

        let now = self.clock.utc_now();
        let first = !self.started;
        self.started = true;
        let archive_due = if first {
            self.options.archive_on_startup
        } else {
            self.next_archive_utc.is_some_and(|at| now >= at)
        };

        self.registry.retire_stale();
        if archive_due {
            let report = self.registry.archive_log_files(&self.options);
            let metrics = &self.shared.metrics;
            WorkerMetrics::incr(&metrics.archive_passes);
            metrics
                .files_archived
                .fetch_add(report.moved as u64, Ordering::Relaxed);
        }

        let schedule = ArchiveSchedule::build(self.clock.as_ref(), &self.options.schedule);
        self.next_archive_utc = Some(schedule.next_archive_utc);

        // Reset before arming so a zero-delay timer cannot be lost.
        self.shared.signals.reset_archive_now();
        self.arm_timer(rearm_delay(schedule.time_until_next_event(), first));

        if !self.shared.queue.is_empty() {
            self.shared.signals.set_message_ready();
        }
    }

    fn arm_timer(&mut self, delay: Duration) {
        let shared = Arc::clone(&self.shared);
        match OneShotTimer::start(delay, move || shared.signals.set_archive_now()) {
            Ok(timer) => {
                tracing::trace!(delay_secs = delay.as_secs(), "archive timer armed");
                self.timer = Some(timer);
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to arm archive timer; scheduled archival disabled");
            }
        }
    }
}

/// Timer delay for the next wake-up. Only the first pass may fire at once.
fn rearm_delay(until_next_event: chrono::Duration, first: bool) -> Duration {
    let delay = until_next_event.to_std().unwrap_or(Duration::ZERO);
    if delay.is_zero() && !first {
        MIN_REARM_DELAY
    } else {
        delay
    }
}

#[cfg(test)]
#[path = "worker_test.rs"]
mod worker_test;
