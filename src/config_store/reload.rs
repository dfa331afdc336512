use std::{
    sync::{
        Weak,
        mpsc::{self, RecvTimeoutError},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use tracing::{debug, trace};

use super::{ConfigError, ConfigStore, store::StoreInner};

/// How long the loop sleeps between checks while periodic reload is disabled.
pub const IDLE_POLL: Duration = Duration::from_secs(5);

const THREAD_NAME: &str = "reload_config_loop";

enum WorkerSignal {
    Wake,
    Shutdown,
}

/// Handle to the background thread that keeps one store in sync with its file.
pub(super) struct ReloadWorker {
    signals: mpsc::Sender<WorkerSignal>,
    handle: JoinHandle<()>,
}

impl ReloadWorker {
    /// Starts the poll loop for the store behind `store`.
    ///
    /// The thread holds only a weak reference and exits once the store is gone.
    ///
    /// # Errors
    /// Returns `ConfigError::Unknown` if the OS refuses to spawn the thread.
    pub(super) fn spawn(store: Weak<StoreInner>) -> Result<Self, ConfigError> {
        let (signals, receiver) = mpsc::channel();

        let handle = thread::Builder::new()
            .name(THREAD_NAME.to_string())
            .spawn(move || run(store, receiver))
            .map_err(|e| ConfigError::Unknown {
                details: format!("failed to spawn reload thread: {e}"),
            })?;

        Ok(Self { signals, handle })
    }

    /// Interrupts the current sleep so a new interval takes effect at once.
    pub(super) fn wake(&self) {
        let _ = self.signals.send(WorkerSignal::Wake);
    }

    /// Stops the loop and waits for it, unless called from the loop itself.
    pub(super) fn stop(self) {
        let _ = self.signals.send(WorkerSignal::Shutdown);

        if self.handle.thread().id() == thread::current().id() {
            return;
        }

        if self.handle.join().is_err() {
            debug!("Reload thread panicked before shutdown");
        }
    }
}

fn wait_for(interval: f64) -> (Duration, bool) {
    if interval > 0.0 {
        let wait = Duration::try_from_secs_f64(interval).unwrap_or(Duration::MAX);
        (wait, true)
    } else {
        (IDLE_POLL, false)
    }
}

fn run(store: Weak<StoreInner>, signals: mpsc::Receiver<WorkerSignal>) {
    loop {
        let Some(interval) = store.upgrade().map(|inner| inner.reload_interval()) else {
            return;
        };

        let (wait, reload) = wait_for(interval);

        match signals.recv_timeout(wait) {
            Ok(WorkerSignal::Wake) => continue,
            Ok(WorkerSignal::Shutdown) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }

        if !reload {
            continue;
        }

        let Some(inner) = store.upgrade() else {
            return;
        };

        ConfigStore::from_inner(inner).reload();
    }

    trace!("Reload loop stopped");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_interval_reloads_after_waiting() {
        assert_eq!(wait_for(0.25), (Duration::from_millis(250), true));
    }

    #[test]
    fn non_positive_interval_idles_without_reloading() {
        assert_eq!(wait_for(0.0), (IDLE_POLL, false));
        assert_eq!(wait_for(-1.0), (IDLE_POLL, false));
    }

    #[test]
    fn huge_interval_saturates() {
        assert_eq!(wait_for(1e300), (Duration::MAX, true));
    }
}
