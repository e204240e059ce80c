// Dependency health checker module
//
// One periodic execution thread per monitored dependency. Each tick runs
// the user-supplied probe and republishes the UP/DOWN gauge. Cancellation
// is cooperative with a bounded grace period: the name leaves the live set
// first (exactly once, even under concurrent cancels), the thread is
// signalled, and after one second of grace it is detached and left to die
// on its stop flag.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::registry::MetricRegistry;

/// How long a cancellation waits for an in-flight tick to finish
const CANCEL_GRACE: Duration = Duration::from_secs(1);

/// Result of a dependency probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DependencyState {
    Up,
    Down,
}

struct CheckerHandle {
    stop_tx: Sender<()>,
    done_rx: Receiver<()>,
    thread: JoinHandle<()>,
}

/// The set of live dependency checkers
///
/// Probe failures are the probe's own problem: a panic kills that checker's
/// thread and nothing else, and the gauge stops being republished, which is
/// exactly the "stopped checker" behavior. The scheduler never catches it.
pub struct DependencyCheckers {
    registry: Arc<MetricRegistry>,
    checkers: Mutex<HashMap<String, CheckerHandle>>,
}

impl DependencyCheckers {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self {
            registry,
            checkers: Mutex::new(HashMap::new()),
        }
    }

    /// Schedule a periodic probe for a dependency name
    ///
    /// A checker already scheduled under the same name is fully cancelled
    /// first, so at most one timer ever fires per name. The first tick runs
    /// one `period` after registration.
    pub fn add<F>(&self, name: &str, probe: F, period: Duration)
    where
        F: Fn() -> DependencyState + Send + 'static,
    {
        self.cancel(name);

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let registry = Arc::clone(&self.registry);
        let checker_name = name.to_string();

        let thread = std::thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(RecvTimeoutError::Timeout) => {
                        if probe() == DependencyState::Up {
                            tracing::debug!(checker = %checker_name, "checker is UP");
                            registry.set_dependency_up(&checker_name);
                        } else {
                            tracing::debug!(checker = %checker_name, "checker is DOWN");
                            registry.set_dependency_down(&checker_name);
                        }
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            let _ = done_tx.send(());
        });

        let handle = CheckerHandle {
            stop_tx,
            done_rx,
            thread,
        };

        self.checkers.lock().insert(name.to_string(), handle);
    }

    /// Cancel the checker scheduled under a name
    ///
    /// Safe no-op when the name is not scheduled. On return the name is out
    /// of the live set, whether the thread stopped within the grace period
    /// or had to be abandoned mid-probe.
    pub fn cancel(&self, name: &str) {
        // Taking the entry under the lock makes the removal exactly-once:
        // a concurrent cancel for the same name finds nothing.
        let Some(handle) = self.checkers.lock().remove(name) else {
            return;
        };

        tracing::debug!(checker = name, "attempting to stop checker");
        let _ = handle.stop_tx.send(());

        match handle.done_rx.recv_timeout(CANCEL_GRACE) {
            Ok(()) => {
                let _ = handle.thread.join();
                tracing::debug!(checker = name, "checker stopped");
            }
            Err(RecvTimeoutError::Disconnected) => {
                // The thread already died (e.g. the probe panicked)
                tracing::debug!(checker = name, "checker thread already exited");
            }
            Err(RecvTimeoutError::Timeout) => {
                // Still inside a probe; dropping the handle detaches it,
                // and the stop signal already sent makes it exit after the
                // current tick.
                tracing::warn!(checker = name, "checker did not stop within grace period, detaching");
            }
        }
    }

    /// Cancel every scheduled checker
    ///
    /// Works on a snapshot of the live names; a checker added concurrently
    /// may or may not be included.
    pub fn cancel_all(&self) {
        let names: Vec<String> = self.checkers.lock().keys().cloned().collect();
        for name in names {
            self.cancel(&name);
        }
    }

    /// Read-only snapshot of the currently scheduled checker names
    pub fn scheduled(&self) -> Vec<String> {
        self.checkers.lock().keys().cloned().collect()
    }
}

impl Drop for DependencyCheckers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
