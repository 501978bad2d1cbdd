//! Rate-limited diagnostics for repeated failures
//!
//! A disk that has filled up fails every write. Logging each failure would
//! bury everything else, so the worker reports through a [`RateLimitedLogger`]
//! that emits at most one `tracing` event per interval and counts what it
//! suppressed in between.

use std::fmt::Display;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub const DEFAULT_LOG_INTERVAL: Duration = Duration::from_secs(10);

pub struct RateLimitedLogger {
    min_interval: Duration,
    last_log_time: Mutex<Option<Instant>>,
    /// Occurrences since the last emitted event.
    pending: AtomicU64,
    total: AtomicU64,
}

impl RateLimitedLogger {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_log_time: Mutex::new(None),
            pending: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    /// Record a failure and emit it unless one was emitted within the
    /// interval. Returns whether an event was emitted.
    pub fn error(&self, message: &str, error: &dyn Display) -> bool {
        self.pending.fetch_add(1, Ordering::Relaxed);
        let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;

        if !self.should_log() {
            return false;
        }

        let count = self.pending.swap(0, Ordering::Relaxed);
        if count > 1 {
            tracing::error!(
                error = %error,
                suppressed_count = count - 1,
                total_errors = total,
                "{message} (rate-limited)"
            );
        } else {
            tracing::error!(error = %error, total_errors = total, "{message}");
        }
        true
    }

    fn should_log(&self) -> bool {
        let mut last = self.last_log_time.lock();
        let now = Instant::now();
        match *last {
            Some(prev) if now.duration_since(prev) < self.min_interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }

    pub fn pending_error_count(&self) -> u64 {
        self.pending.load(Ordering::Relaxed)
    }

    pub fn total_error_count(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }
}

impl Default for RateLimitedLogger {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_INTERVAL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn first_error_is_emitted_and_rest_suppressed() {
        let logger = RateLimitedLogger::new(Duration::from_secs(60));
        let error = io::Error::new(io::ErrorKind::Other, "disk full");

        assert!(logger.error("write failed", &error));
        for _ in 0..5 {
            assert!(!logger.error("write failed", &error));
        }

        assert_eq!(logger.total_error_count(), 6);
        assert_eq!(logger.pending_error_count(), 5);
    }

    #[test]
    fn zero_interval_never_suppresses() {
        let logger = RateLimitedLogger::new(Duration::ZERO);
        let error = io::Error::new(io::ErrorKind::Other, "disk full");

        assert!(logger.error("write failed", &error));
        assert!(logger.error("write failed", &error));
        assert_eq!(logger.pending_error_count(), 0);
    }
}
