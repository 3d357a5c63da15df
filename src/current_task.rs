//! Operations on the task currently running on this thread.
//!
//! Outside of a task the queries report "not cancelled" and the sleeps
//! panic, since there is no timer to arm.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use crate::core::deadline::Deadline;
use crate::core::task::context;
use crate::core::task::header::TaskHeader;
use crate::core::task::wait::NoWakeups;
use crate::core::task::{CancellationReason, TaskId, WakeupSource};

pub use crate::core::task::{wait_with, Wait, WaitStrategy};

/// Future returned by [`yield_now`].
#[derive(Debug, Default)]
#[must_use = "futures do nothing unless awaited"]
pub struct YieldNow {
    yielded: bool,
}

impl Future for YieldNow {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        if self.yielded {
            return Poll::Ready(());
        }
        self.yielded = true;
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

/// Gives other ready tasks a chance to run. The current task goes to the
/// back of its worker's local queue.
pub fn yield_now() -> YieldNow {
    YieldNow::default()
}

/// Suspends the task for `duration`. Not interrupted by cancellation.
pub async fn sleep_for(duration: Duration) {
    sleep_until(Deadline::from_duration(duration)).await;
}

/// Suspends the task until `deadline`. Not interrupted by cancellation.
pub async fn sleep_until(deadline: Deadline) {
    wait_with(NoWakeups, deadline, false).await;
}

/// Suspends the task for `duration` or until cancellation is requested.
pub async fn interruptible_sleep_for(duration: Duration) -> WakeupSource {
    interruptible_sleep_until(Deadline::from_duration(duration)).await
}

/// Suspends the task until `deadline` or until cancellation is requested.
pub async fn interruptible_sleep_until(deadline: Deadline) -> WakeupSource {
    wait_with(NoWakeups, deadline, true).await
}

/// Cancels the running task with
/// [`CancellationReason::Deadline`] once `deadline` passes. Replaces any
/// earlier deadline; [`Deadline::unreachable`] removes it.
///
/// # Panics
///
/// Panics when called outside of a task.
pub fn set_deadline(deadline: Deadline) {
    let Some(task) = context::current_task() else {
        panic!("set_deadline called outside of an engine task");
    };
    task.set_cancel_deadline(deadline);
}

/// Identifier of the running task, `None` outside of a task.
#[must_use]
pub fn id() -> Option<TaskId> {
    context::with_current_task(|task| task.map(|task| task.id()))
}

/// Returns `true` when called from inside a task.
#[must_use]
pub fn is_in_task() -> bool {
    context::with_current_task(|task| task.is_some())
}

/// Returns `true` if cancellation of the running task was requested, even
/// while a [`CancellationBlocker`] is active.
#[must_use]
pub fn is_cancel_requested() -> bool {
    context::with_current_task(|task| task.is_some_and(|task| task.is_cancel_requested()))
}

/// Returns `true` if the running task should stop: cancellation was
/// requested and no [`CancellationBlocker`] is active.
#[must_use]
pub fn should_cancel() -> bool {
    context::with_current_task(|task| task.is_some_and(|task| task.should_cancel()))
}

/// Reason of the running task's cancellation request.
#[must_use]
pub fn cancellation_reason() -> CancellationReason {
    context::with_current_task(|task| {
        task.map_or(CancellationReason::None, |task| task.cancellation_reason())
    })
}

/// While alive, cancellable waits of the running task ignore cancellation.
///
/// Blockers nest. Create and drop a blocker inside the same task.
#[derive(Debug)]
pub struct CancellationBlocker {
    task: Option<Arc<TaskHeader>>,
}

impl CancellationBlocker {
    /// Blocks cancellation of the running task. A no-op outside of a task.
    #[must_use]
    pub fn new() -> Self {
        let task = context::current_task();
        if let Some(task) = &task {
            task.block_cancellation();
        }
        Self { task }
    }
}

impl Default for CancellationBlocker {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CancellationBlocker {
    fn drop(&mut self) {
        if let Some(task) = &self.task {
            task.unblock_cancellation();
        }
    }
}
