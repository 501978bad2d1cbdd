use crossbeam::channel::{self, RecvTimeoutError, Sender};
use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Runs a callback once after a delay on its own thread, unless cancelled
/// first. Dropping the timer cancels it.
pub struct OneShotTimer {
    cancel: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl OneShotTimer {
    pub fn start<F>(delay: Duration, on_fire: F) -> io::Result<Self>
    where
        F: FnOnce() + Send + 'static,
    {
        let (cancel, cancelled) = channel::bounded::<()>(1);
        let thread = thread::Builder::new()
            .name("file-log-sink-timer".to_string())
            .spawn(move || {
                // Disconnected means cancelled.
                if let Err(RecvTimeoutError::Timeout) = cancelled.recv_timeout(delay) {
                    on_fire();
                }
            })?;

        Ok(Self {
            cancel: Some(cancel),
            thread: Some(thread),
        })
    }

    pub fn cancel(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        drop(self.cancel.take());
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for OneShotTimer {
    fn drop(&mut self) {
        self.stop();
    }
}
