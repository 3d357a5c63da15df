//! Owning handle of a spawned task.

use std::sync::Arc;
use std::task::Wake;

use super::header::TaskHeader;
use super::{CancellationReason, TaskId, TaskState};
use crate::core::deadline::Deadline;
use crate::core::error::FutureError;
use crate::sync::{Future, FutureStatus, SharedFuture, WaitQueue, Waitable};

/// Handle to a spawned task: cancellation, join and result retrieval.
///
/// Dropping the handle detaches the task; it keeps running.
pub struct TaskHandle<T> {
    header: Arc<TaskHeader>,
    result: Future<T>,
}

impl<T> TaskHandle<T> {
    pub(crate) const fn new(header: Arc<TaskHeader>, result: Future<T>) -> Self {
        Self { header, result }
    }

    /// Identifier of the task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.header.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.header.state()
    }

    /// Returns `true` once the task produced its result or was dropped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.result.is_ready()
    }

    /// Asks the task to cancel. A task that has not started yet is dropped
    /// without running unless it was spawned as critical; a running task
    /// observes the request at its next cancellable wait.
    pub fn request_cancel(&self) {
        if self.header.set_cancel_requested(CancellationReason::UserRequest) {
            self.header.wake_by_ref();
        }
    }

    /// Reason of the first cancellation request, if any.
    #[must_use]
    pub fn cancellation_reason(&self) -> CancellationReason {
        self.header.cancellation_reason()
    }

    /// Waits for the task to finish without consuming its result.
    pub async fn wait(&self) -> FutureStatus {
        self.result.wait().await
    }

    /// Waits until `deadline` for the task to finish.
    pub async fn wait_until(&self, deadline: Deadline) -> FutureStatus {
        self.result.wait_until(deadline).await
    }

    /// Waits for the task and returns its output.
    ///
    /// # Errors
    ///
    /// - [`FutureError::TaskCancelled`] when the task was dropped before
    ///   producing a value
    /// - [`FutureError::Exception`] when the task panicked
    /// - [`FutureError::WaitInterrupted`] when the waiting task is cancelled
    pub async fn get(mut self) -> Result<T, FutureError> {
        match self.result.get().await {
            Err(FutureError::BrokenPromise) => {
                Err(FutureError::TaskCancelled(self.header.cancellation_reason()))
            }
            other => other,
        }
    }

    /// Requests cancellation and waits for the task to finish.
    pub async fn cancel_and_wait(&self) {
        self.request_cancel();
        let _blocker = crate::current_task::CancellationBlocker::new();
        self.result.wait().await;
    }

    /// Lets the task run on without a handle.
    pub fn detach(self) {}

    /// Converts the handle into one that can be cloned and read by many
    /// waiters.
    #[must_use]
    pub fn share(self) -> SharedTaskHandle<T> {
        SharedTaskHandle {
            header: self.header,
            result: self.result.share(),
        }
    }
}

impl<T: Send> Waitable for TaskHandle<T> {
    fn is_ready(&self) -> bool {
        self.is_finished()
    }

    fn wait_queue(&self) -> &WaitQueue {
        self.result.wait_queue()
    }
}

/// Cloneable handle of a task whose result every clone can read.
pub struct SharedTaskHandle<T> {
    header: Arc<TaskHeader>,
    result: SharedFuture<T>,
}

impl<T> Clone for SharedTaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            header: Arc::clone(&self.header),
            result: self.result.clone(),
        }
    }
}

impl<T> SharedTaskHandle<T> {
    /// Identifier of the task.
    #[must_use]
    pub fn id(&self) -> TaskId {
        self.header.id()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> TaskState {
        self.header.state()
    }

    /// Returns `true` once the task produced its result or was dropped.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.result.is_ready()
    }

    /// Asks the task to cancel, like [`TaskHandle::request_cancel`].
    pub fn request_cancel(&self) {
        if self.header.set_cancel_requested(CancellationReason::UserRequest) {
            self.header.wake_by_ref();
        }
    }

    /// Reason of the first cancellation request, if any.
    #[must_use]
    pub fn cancellation_reason(&self) -> CancellationReason {
        self.header.cancellation_reason()
    }

    /// Waits for the task to finish.
    pub async fn wait(&self) -> FutureStatus {
        self.result.wait().await
    }

    /// Waits until `deadline` for the task to finish.
    pub async fn wait_until(&self, deadline: Deadline) -> FutureStatus {
        self.result.wait_until(deadline).await
    }

    /// Waits for the task and returns a copy of its output.
    ///
    /// # Errors
    ///
    /// Same as [`TaskHandle::get`].
    pub async fn get(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        match self.result.get().await {
            Err(FutureError::BrokenPromise) => {
                Err(FutureError::TaskCancelled(self.header.cancellation_reason()))
            }
            other => other,
        }
    }
}

impl<T: Send> Waitable for SharedTaskHandle<T> {
    fn is_ready(&self) -> bool {
        self.is_finished()
    }

    fn wait_queue(&self) -> &WaitQueue {
        self.result.wait_queue()
    }
}

impl<T> std::fmt::Debug for SharedTaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}

impl<T> std::fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.id())
            .field("state", &self.state())
            .finish()
    }
}
