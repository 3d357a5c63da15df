//! Cloneable handle used to spawn tasks onto a runtime.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::error;

use crate::core::deadline::Deadline;
use crate::core::scheduler::Shared;
use crate::core::stats::RuntimeStats;
use crate::core::task::context;
use crate::core::task::{SharedTaskHandle, TaskHandle};
use crate::sync::Promise;

/// Spawns tasks onto a [`Runtime`](super::Runtime) from anywhere.
#[derive(Clone, Debug)]
pub struct Handle {
    shared: Arc<Shared>,
}

impl Handle {
    pub(crate) const fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Handle of the runtime driving the current thread.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a runtime worker thread.
    #[must_use]
    pub fn current() -> Self {
        match Self::try_current() {
            Some(handle) => handle,
            None => panic!("Handle::current() called outside of an engine runtime"),
        }
    }

    /// Handle of the runtime driving the current thread, if any.
    #[must_use]
    pub fn try_current() -> Option<Self> {
        context::current_runtime().map(Self::new)
    }

    /// Spawns `future` as a new task.
    pub fn spawn<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_with(future, false, Deadline::unreachable())
    }

    /// Spawns `future` as a critical task: it runs even if cancelled before
    /// it started and is never cancelled by overload.
    pub fn spawn_critical<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_with(future, true, Deadline::unreachable())
    }

    /// Spawns `future` as a task that is cancelled with
    /// [`CancellationReason::Deadline`](crate::core::CancellationReason::Deadline)
    /// once `deadline` passes. A task whose deadline passed before it started
    /// never runs.
    pub fn spawn_with_deadline<F>(&self, deadline: Deadline, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.spawn_with(future, false, deadline)
    }

    /// Spawns `future` as a task whose result many waiters can read.
    pub fn spawn_shared<F>(&self, future: F) -> SharedTaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Clone + Send + Sync + 'static,
    {
        self.spawn(future).share()
    }

    fn spawn_with<F>(&self, future: F, critical: bool, deadline: Deadline) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let (promise, result) = Promise::pair();
        let body = async move {
            match AssertUnwindSafe(future).catch_unwind().await {
                Ok(value) => {
                    let _ = promise.set_value(value);
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(
                        task_id = crate::current_task::id().map(|id| id.as_u64()),
                        panic = %message,
                        "task panicked"
                    );
                    let _ = promise.set_exception(anyhow::anyhow!("task panicked: {message}"));
                }
            }
        };
        let header = self.shared.spawn_task(Box::pin(body), critical, deadline);
        TaskHandle::new(header, result)
    }

    /// Number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.shared.worker_count()
    }

    /// Returns `true` once shutdown has begun.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.shared.is_shutting_down()
    }

    /// Snapshot of the runtime's counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.shared.stats()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
