//! Cancellable background timer tasks
//!
//! Every poller in the import pipeline runs inside a [`PollTask`]. Cancelling
//! the task sets a shared [`StopFlag`] and aborts the spawned future, so a
//! tick that is already past its await point can observe the flag and bail out
//! before touching shared state.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::task::JoinHandle;

/// Shared flag observed by a running loop
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Handle to a spawned polling loop
#[derive(Debug)]
pub struct PollTask {
    stop: StopFlag,
    handle: JoinHandle<()>,
}

impl PollTask {
    /// Spawn a loop on the tokio runtime
    ///
    /// The closure receives the task's stop flag and must check it after every
    /// suspension point before mutating anything.
    pub fn spawn<F, Fut>(f: F) -> Self
    where
        F: FnOnce(StopFlag) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let stop = StopFlag::default();
        let handle = tokio::spawn(f(stop.clone()));
        Self { stop, handle }
    }

    /// Stop the loop; no further ticks will run
    pub fn cancel(&self) {
        self.stop.stop();
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.stop.is_stopped()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PollTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Holder enforcing at most one live task
#[derive(Debug, Default)]
pub struct TaskSlot {
    current: Mutex<Option<PollTask>>,
}

impl TaskSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new task, cancelling whatever was running before
    pub fn replace(&self, task: PollTask) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = current.take() {
            previous.cancel();
        }
        *current = Some(task);
    }

    /// Cancel and drop the current task, if any
    pub fn cancel(&self) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(task) = current.take() {
            task.cancel();
        }
    }

    /// True while a task is installed and has not finished
    pub fn is_active(&self) -> bool {
        let current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        current
            .as_ref()
            .map(|t| !t.is_finished() && !t.is_cancelled())
            .unwrap_or(false)
    }
}
