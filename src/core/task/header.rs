//! Per-task control block shared by the scheduler, wakers and handles.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll, Wake, Waker};

use parking_lot::Mutex;

use super::{CancellationReason, TaskId, TaskState};
use crate::core::deadline::Deadline;
use crate::core::scheduler::timer::TimerId;
use crate::core::scheduler::Shared;

/// Type-erased task body.
pub(crate) type BoxedTask = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

// Scheduling word. Only IDLE -> SCHEDULED enqueues the task.
const IDLE: u8 = 0;
const SCHEDULED: u8 = 1;
const RUNNING: u8 = 2;
const NOTIFIED: u8 = 3;
const COMPLETE: u8 = 4;

pub(crate) struct TaskHeader {
    id: TaskId,
    key: usize,
    critical: bool,
    runtime: Weak<Shared>,
    schedule: AtomicU8,
    state: AtomicU8,
    cancel: AtomicU8,
    cancel_blockers: AtomicUsize,
    started: AtomicBool,
    enqueued_at_nanos: AtomicU64,
    cancel_timer: Mutex<Option<TimerId>>,
    body: Mutex<Option<BoxedTask>>,
}

impl TaskHeader {
    pub(crate) fn new(
        id: TaskId,
        key: usize,
        critical: bool,
        runtime: Weak<Shared>,
        body: BoxedTask,
    ) -> Self {
        Self {
            id,
            key,
            critical,
            runtime,
            schedule: AtomicU8::new(IDLE),
            state: AtomicU8::new(TaskState::New.as_u8()),
            cancel: AtomicU8::new(CancellationReason::None.as_u8()),
            cancel_blockers: AtomicUsize::new(0),
            started: AtomicBool::new(false),
            enqueued_at_nanos: AtomicU64::new(0),
            cancel_timer: Mutex::new(None),
            body: Mutex::new(Some(body)),
        }
    }

    pub(crate) const fn id(&self) -> TaskId {
        self.id
    }

    /// Slot of this task in the runtime's task arena.
    pub(crate) const fn key(&self) -> usize {
        self.key
    }

    pub(crate) const fn is_critical(&self) -> bool {
        self.critical
    }

    pub(crate) fn runtime(&self) -> Option<Arc<Shared>> {
        self.runtime.upgrade()
    }

    /// Claims the right to enqueue the task. Returns `false` when it is
    /// already queued, complete, or currently running (in which case the
    /// running worker requeues it after the poll).
    pub(crate) fn transition_to_scheduled(&self) -> bool {
        let mut current = self.schedule.load(Ordering::Acquire);
        loop {
            let next = match current {
                IDLE => SCHEDULED,
                RUNNING => NOTIFIED,
                _ => return false,
            };
            match self.schedule.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next == SCHEDULED,
                Err(actual) => current = actual,
            }
        }
    }

    pub(crate) fn transition_to_running(&self) {
        self.schedule.store(RUNNING, Ordering::Release);
        self.started.store(true, Ordering::Release);
        self.set_state(TaskState::Running);
    }

    /// Called after a pending poll. Returns `true` when the task went idle,
    /// `false` when it was woken during the poll and must be requeued.
    pub(crate) fn transition_to_idle(&self) -> bool {
        match self
            .schedule
            .compare_exchange(RUNNING, IDLE, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => {
                self.set_state(TaskState::Suspended);
                true
            }
            Err(_) => {
                self.schedule.store(SCHEDULED, Ordering::Release);
                self.set_state(TaskState::Queued);
                false
            }
        }
    }

    pub(crate) fn transition_to_complete(&self) -> TaskState {
        self.schedule.store(COMPLETE, Ordering::Release);
        let state = if self.is_cancel_requested() {
            TaskState::Cancelled
        } else {
            TaskState::Completed
        };
        self.set_state(state);
        state
    }

    pub(crate) fn is_started(&self) -> bool {
        self.started.load(Ordering::Acquire)
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    pub(crate) fn mark_enqueued(&self, nanos: u64) {
        self.enqueued_at_nanos.store(nanos, Ordering::Relaxed);
    }

    pub(crate) fn enqueued_at_nanos(&self) -> u64 {
        self.enqueued_at_nanos.load(Ordering::Relaxed)
    }

    /// Records a cancellation request without waking the task. The first
    /// reason wins.
    pub(crate) fn set_cancel_requested(&self, reason: CancellationReason) -> bool {
        self.cancel
            .compare_exchange(
                CancellationReason::None.as_u8(),
                reason.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub(crate) fn cancellation_reason(&self) -> CancellationReason {
        CancellationReason::from_u8(self.cancel.load(Ordering::Acquire))
    }

    pub(crate) fn is_cancel_requested(&self) -> bool {
        self.cancellation_reason() != CancellationReason::None
    }

    /// Cancellation requested and not suppressed by a blocker.
    pub(crate) fn should_cancel(&self) -> bool {
        self.is_cancel_requested() && self.cancel_blockers.load(Ordering::Acquire) == 0
    }

    pub(crate) fn block_cancellation(&self) {
        self.cancel_blockers.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unblock_cancellation(&self) {
        self.cancel_blockers.fetch_sub(1, Ordering::AcqRel);
    }

    /// Replaces the task's cancellation deadline. Once `deadline` passes the
    /// task is cancelled with [`CancellationReason::Deadline`]; a deadline
    /// already reached cancels it right away.
    pub(crate) fn set_cancel_deadline(self: &Arc<Self>, deadline: Deadline) {
        let runtime = self.runtime();
        let mut slot = self.cancel_timer.lock();
        if let (Some(id), Some(runtime)) = (slot.take(), runtime.as_ref()) {
            runtime.timer().cancel(id);
        }
        let Some(at) = deadline.instant() else {
            return;
        };
        if deadline.is_reached() {
            drop(slot);
            if self.set_cancel_requested(CancellationReason::Deadline) {
                self.wake_by_ref();
            }
            return;
        }
        if let Some(runtime) = runtime {
            let canceller = Waker::from(Arc::new(DeadlineCanceller {
                task: Arc::downgrade(self),
            }));
            *slot = Some(runtime.timer().register(at, canceller));
        }
    }

    /// Drops a pending cancellation deadline.
    pub(crate) fn clear_cancel_deadline(&self) {
        if let Some(id) = self.cancel_timer.lock().take() {
            if let Some(runtime) = self.runtime() {
                runtime.timer().cancel(id);
            }
        }
    }

    /// Polls the task body once. A missing body counts as finished.
    pub(crate) fn poll(&self, cx: &mut Context<'_>) -> Poll<()> {
        let mut body = self.body.lock();
        let Some(future) = body.as_mut() else {
            return Poll::Ready(());
        };
        let poll = future.as_mut().poll(cx);
        if poll.is_ready() {
            *body = None;
        }
        poll
    }

    pub(crate) fn take_body(&self) -> Option<BoxedTask> {
        self.body.lock().take()
    }
}

impl Wake for TaskHeader {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.schedule(self);
        }
    }
}

/// Timer waker that cancels a task whose deadline passed.
struct DeadlineCanceller {
    task: Weak<TaskHeader>,
}

impl Wake for DeadlineCanceller {
    fn wake(self: Arc<Self>) {
        self.wake_by_ref();
    }

    fn wake_by_ref(self: &Arc<Self>) {
        let Some(task) = self.task.upgrade() else {
            return;
        };
        task.cancel_timer.lock().take();
        if task.set_cancel_requested(CancellationReason::Deadline) {
            task.wake_by_ref();
        }
    }
}

impl std::fmt::Debug for TaskHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskHeader")
            .field("id", &self.id)
            .field("state", &self.state())
            .field("cancel", &self.cancellation_reason())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detached_header() -> TaskHeader {
        TaskHeader::new(TaskId(1), 0, false, Weak::new(), Box::pin(async {}))
    }

    #[test]
    fn test_schedule_only_once() {
        let header = detached_header();
        assert!(header.transition_to_scheduled());
        assert!(!header.transition_to_scheduled());
    }

    #[test]
    fn test_wake_while_running_requeues() {
        let header = detached_header();
        assert!(header.transition_to_scheduled());
        header.transition_to_running();
        assert!(!header.transition_to_scheduled());
        assert!(!header.transition_to_idle());
        assert_eq!(header.state(), TaskState::Queued);
    }

    #[test]
    fn test_idle_after_quiet_poll() {
        let header = detached_header();
        header.transition_to_running();
        assert!(header.transition_to_idle());
        assert_eq!(header.state(), TaskState::Suspended);
        assert!(header.transition_to_scheduled());
    }

    #[test]
    fn test_complete_ignores_wakes() {
        let header = detached_header();
        header.transition_to_running();
        assert_eq!(header.transition_to_complete(), TaskState::Completed);
        assert!(!header.transition_to_scheduled());
    }

    #[test]
    fn test_first_cancel_reason_wins() {
        let header = detached_header();
        assert!(header.set_cancel_requested(CancellationReason::Overload));
        assert!(!header.set_cancel_requested(CancellationReason::UserRequest));
        assert_eq!(header.cancellation_reason(), CancellationReason::Overload);
    }

    #[test]
    fn test_blocker_suppresses_should_cancel() {
        let header = detached_header();
        header.set_cancel_requested(CancellationReason::UserRequest);
        header.block_cancellation();
        assert!(header.is_cancel_requested());
        assert!(!header.should_cancel());
        header.unblock_cancellation();
        assert!(header.should_cancel());
    }

    #[test]
    fn test_passed_cancel_deadline_cancels_immediately() {
        let header = Arc::new(detached_header());
        header.set_cancel_deadline(Deadline::passed());
        assert_eq!(header.cancellation_reason(), CancellationReason::Deadline);
    }

    #[test]
    fn test_unreachable_cancel_deadline_is_noop() {
        let header = Arc::new(detached_header());
        header.set_cancel_deadline(Deadline::unreachable());
        assert!(!header.is_cancel_requested());
        header.clear_cancel_deadline();
    }
}
