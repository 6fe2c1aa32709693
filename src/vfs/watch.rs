//! Background change watching.
//!
//! One thread per watching VFS. The thread holds only a weak reference, so it
//! never keeps a dropped filesystem alive, and exits on the first tick after
//! the filesystem is gone or as soon as it is told to stop.

use std::io;
use std::sync::Weak;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::fs::Inner;

/// Handle to a running watch thread.
pub(crate) struct Watcher {
    stop: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl Watcher {
    /// Spawn a watch thread ticking every `interval`.
    pub(crate) fn spawn(inner: Weak<Inner>, interval: Duration) -> io::Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let handle = thread::Builder::new()
            .name("php-vfs-watch".into())
            .spawn(move || {
                loop {
                    match stopped.recv_timeout(interval) {
                        Err(RecvTimeoutError::Timeout) => {}
                        Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    }
                    let Some(inner) = inner.upgrade() else {
                        break;
                    };
                    inner.check_changes();
                }
                tracing::debug!("change watch stopped");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread and wait for it to exit.
    pub(crate) fn stop(mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            tracing::warn!("change watch thread panicked");
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        // Detaches the thread; only `stop` joins.
        let _ = self.stop.send(());
    }
}
