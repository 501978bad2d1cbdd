//! Wake-up signals between producers, the archive timer and the worker.
//!
//! - `stop`: manual reset; once set it stays set.
//! - `archive_now`: manual reset, set at construction so the worker computes
//!   its schedule on start.
//! - `message_ready`: auto reset; consumed by the wait that observes it.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};

/// Which signal ended a [`WorkerSignals::wait_any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Stop,
    ArchiveNow,
    MessageReady,
}

#[derive(Debug)]
struct Flags {
    stop: bool,
    archive_now: bool,
}

#[derive(Debug)]
pub struct WorkerSignals {
    flags: Mutex<Flags>,
    changed: Condvar,
    // Mirror of `flags.stop` so producers can check it without the lock.
    stopped: AtomicBool,
    // Outside the mutex so a producer that finds it already set skips the lock.
    message_ready: AtomicBool,
}

impl WorkerSignals {
    pub fn new() -> Self {
        Self {
            flags: Mutex::new(Flags {
                stop: false,
                archive_now: true,
            }),
            changed: Condvar::new(),
            stopped: AtomicBool::new(false),
            message_ready: AtomicBool::new(false),
        }
    }

    pub fn set_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.flags.lock().stop = true;
        self.changed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn set_archive_now(&self) {
        self.flags.lock().archive_now = true;
        self.changed.notify_all();
    }

    pub fn reset_archive_now(&self) {
        self.flags.lock().archive_now = false;
    }

    pub fn is_archive_now(&self) -> bool {
        self.flags.lock().archive_now
    }

    pub fn set_message_ready(&self) {
        if self.message_ready.swap(true, Ordering::AcqRel) {
            return;
        }
        // Taking the lock orders this notify after any in-progress check.
        let _flags = self.flags.lock();
        self.changed.notify_all();
    }

    /// Block until a signal is set. Priority: stop, archive, message.
    pub fn wait_any(&self) -> Signal {
        let mut flags = self.flags.lock();
        loop {
            if flags.stop {
                return Signal::Stop;
            }
            if flags.archive_now {
                return Signal::ArchiveNow;
            }
            if self.message_ready.swap(false, Ordering::AcqRel) {
                return Signal::MessageReady;
            }
            self.changed.wait(&mut flags);
        }
    }
}

impl Default for WorkerSignals {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn archive_is_initially_signaled() {
        let signals = WorkerSignals::new();
        assert_eq!(signals.wait_any(), Signal::ArchiveNow);
        // manual reset: still set
        assert_eq!(signals.wait_any(), Signal::ArchiveNow);
        signals.reset_archive_now();
        assert!(!signals.is_archive_now());
    }

    #[test]
    fn message_ready_auto_resets() {
        let signals = WorkerSignals::new();
        signals.reset_archive_now();
        signals.set_message_ready();
        signals.set_message_ready();

        assert_eq!(signals.wait_any(), Signal::MessageReady);
        signals.set_stop();
        assert_eq!(signals.wait_any(), Signal::Stop);
    }

    #[test]
    fn stop_outranks_other_signals() {
        let signals = WorkerSignals::new();
        signals.set_message_ready();
        assert!(!signals.is_stopped());
        signals.set_stop();
        assert!(signals.is_stopped());
        assert_eq!(signals.wait_any(), Signal::Stop);
        assert_eq!(signals.wait_any(), Signal::Stop);
    }

    #[test]
    fn waiter_wakes_on_message_from_other_thread() {
        let signals = Arc::new(WorkerSignals::new());
        signals.reset_archive_now();

        let producer = {
            let signals = Arc::clone(&signals);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                signals.set_message_ready();
            })
        };

        assert_eq!(signals.wait_any(), Signal::MessageReady);
        producer.join().unwrap();
    }
}
