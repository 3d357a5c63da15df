//! State shared by all workers of one runtime.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::Wake;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, RwLock};
use slab::Slab;
use tracing::{debug, info, warn};

use super::coordinator::Coordinator;
use super::global_queue::GlobalQueue;
use super::local_queue::LocalQueue;
use super::timer::Timer;
use crate::config::{OverloadAction, RuntimeConfig};
use crate::core::deadline::Deadline;
use crate::core::stats::{RuntimeStats, TaskCounters, WorkerCounters};
use crate::core::task::context;
use crate::core::task::header::{BoxedTask, TaskHeader};
use crate::core::task::{CancellationReason, TaskId, TaskState};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) struct Shared {
    config: RuntimeConfig,
    tasks: RwLock<Slab<Arc<TaskHeader>>>,
    pub(crate) global: GlobalQueue,
    pub(crate) locals: Box<[LocalQueue]>,
    pub(crate) coordinator: Coordinator,
    timer: Arc<Timer>,
    counters: TaskCounters,
    pub(crate) worker_counters: Box<[WorkerCounters]>,
    shutting_down: AtomicBool,
    stopped: AtomicBool,
    running_workers: AtomicUsize,
    epoch: Instant,
    drained: (Mutex<()>, Condvar),
}

impl Shared {
    pub(crate) fn new(config: RuntimeConfig) -> Self {
        let workers = config.worker_threads;
        Self {
            tasks: RwLock::new(Slab::with_capacity(1024)),
            global: GlobalQueue::default(),
            locals: (0..workers)
                .map(|_| LocalQueue::new(config.local_queue_capacity))
                .collect(),
            coordinator: Coordinator::new(workers),
            timer: Arc::new(Timer::default()),
            counters: TaskCounters::default(),
            worker_counters: (0..workers).map(|_| WorkerCounters::default()).collect(),
            shutting_down: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            running_workers: AtomicUsize::new(workers),
            epoch: Instant::now(),
            drained: (Mutex::new(()), Condvar::new()),
            config,
        }
    }

    pub(crate) const fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub(crate) const fn timer(&self) -> &Arc<Timer> {
        &self.timer
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.locals.len()
    }

    pub(crate) fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::Acquire)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn elapsed_nanos(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    /// Registers a new task in the arena and schedules it. On a stopped
    /// runtime the body is dropped at once, so the task's handle reports a
    /// shutdown cancellation instead of waiting forever.
    pub(crate) fn spawn_task(
        self: &Arc<Self>,
        body: BoxedTask,
        critical: bool,
        deadline: Deadline,
    ) -> Arc<TaskHeader> {
        let id = TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed));
        self.counters.created.fetch_add(1, Ordering::AcqRel);
        let header = {
            let mut tasks = self.tasks.write();
            let entry = tasks.vacant_entry();
            let header = Arc::new(TaskHeader::new(
                id,
                entry.key(),
                critical,
                Arc::downgrade(self),
                body,
            ));
            entry.insert(Arc::clone(&header));
            header
        };
        if self.is_shutting_down() {
            header.set_cancel_requested(CancellationReason::Shutdown);
        }
        if self.is_stopped() {
            debug!(task_id = id.as_u64(), "task spawned on a stopped runtime");
            self.discard_task(&header);
            return header;
        }
        header.set_cancel_deadline(deadline);
        debug!(task_id = id.as_u64(), critical, "task spawned");
        self.schedule(&header);
        header
    }

    pub(crate) fn task(&self, key: usize) -> Option<Arc<TaskHeader>> {
        self.tasks.read().get(key).cloned()
    }

    /// Makes a task ready. A no-op when it is already queued or finished.
    pub(crate) fn schedule(&self, header: &Arc<TaskHeader>) {
        if !header.transition_to_scheduled() {
            return;
        }
        header.set_state(TaskState::Queued);
        header.mark_enqueued(self.elapsed_nanos());
        let limit = self.config.overload.wait_queue_length_limit;
        if limit > 0 && self.queued_approx() >= limit {
            self.on_overload(header);
        }
        self.push_ready(header.key());
    }

    /// Enqueues a key: on the calling worker's local queue when called from
    /// one of this runtime's workers, on the global queue otherwise.
    pub(crate) fn push_ready(&self, key: usize) {
        let pushed_locally = context::with_worker(|worker| match worker {
            Some(worker) if std::ptr::eq(Arc::as_ptr(&worker.shared), self) => {
                if self.locals[worker.index].push(key, &self.global) {
                    WorkerCounters::bump(&self.worker_counters[worker.index].local_overflows);
                }
                true
            }
            _ => false,
        });
        if !pushed_locally {
            self.global.push(key);
        }
        self.coordinator.wake_up_one();
    }

    pub(crate) fn queued_approx(&self) -> usize {
        self.global.len() + self.locals.iter().map(LocalQueue::len).sum::<usize>()
    }

    pub(crate) fn has_pending_work(&self) -> bool {
        !self.global.is_empty() || self.locals.iter().any(|local| !local.is_empty())
    }

    /// Applies the queue-time overload limit to a task about to run.
    pub(crate) fn check_wait_time(&self, header: &TaskHeader) {
        let limit_ms = self.config.overload.wait_queue_time_limit_ms;
        if limit_ms == 0 {
            return;
        }
        let waited = Duration::from_nanos(self.elapsed_nanos().saturating_sub(header.enqueued_at_nanos()));
        if waited > Duration::from_millis(limit_ms) {
            self.on_overload(header);
        }
    }

    fn on_overload(&self, header: &TaskHeader) {
        self.counters.overloaded.fetch_add(1, Ordering::Relaxed);
        if self.config.overload.action == OverloadAction::Cancel
            && !header.is_critical()
            && header.set_cancel_requested(CancellationReason::Overload)
        {
            debug!(task_id = header.id().as_u64(), "task cancelled due to overload");
        }
    }

    /// Records completion and releases the arena slot.
    pub(crate) fn finish_task(&self, header: &TaskHeader) {
        let state = header.transition_to_complete();
        header.clear_cancel_deadline();
        {
            let mut tasks = self.tasks.write();
            if tasks
                .get(header.key())
                .is_some_and(|slot| std::ptr::eq(Arc::as_ptr(slot), header))
            {
                tasks.remove(header.key());
            }
        }
        if state == TaskState::Cancelled {
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.finished.fetch_add(1, Ordering::AcqRel);
        if self.is_shutting_down() && self.counters.alive() == 0 {
            let _guard = self.drained.0.lock();
            self.drained.1.notify_all();
        }
    }

    /// Finishes a task without running it any further. Dropping the body
    /// breaks its promise. A no-op when the body is already gone.
    pub(crate) fn discard_task(&self, header: &TaskHeader) {
        let Some(body) = header.take_body() else {
            return;
        };
        self.finish_task(header);
        drop(body);
    }

    /// Finishes a task that was cancelled before its first poll, without
    /// running it.
    pub(crate) fn abort_task(&self, header: &TaskHeader) {
        debug!(
            task_id = header.id().as_u64(),
            reason = %header.cancellation_reason(),
            "dropping task cancelled before start"
        );
        self.discard_task(header);
    }

    fn live_tasks(&self) -> Vec<Arc<TaskHeader>> {
        self.tasks.read().iter().map(|(_, header)| Arc::clone(header)).collect()
    }

    /// Stops accepting work quietly and asks every live task to cancel.
    pub(crate) fn begin_shutdown(&self) {
        if self.shutting_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let tasks = self.live_tasks();
        info!(alive = tasks.len(), "cancelling tasks for shutdown");
        for header in tasks {
            if header.set_cancel_requested(CancellationReason::Shutdown) {
                header.wake_by_ref();
            }
        }
    }

    /// Waits until no task is alive. Returns `false` on timeout.
    pub(crate) fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.drained.0.lock();
        while self.counters.alive() > 0 {
            if self.drained.1.wait_until(&mut guard, deadline).timed_out() {
                return self.counters.alive() == 0;
            }
        }
        true
    }

    /// Makes workers and the timer exit their loops.
    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.coordinator.wake_up_all();
        self.timer.stop();
    }

    /// Drops the bodies of tasks still alive after the workers stopped.
    pub(crate) fn drop_remaining_tasks(&self) {
        let tasks = self.live_tasks();
        if tasks.is_empty() {
            return;
        }
        warn!(count = tasks.len(), "dropping tasks that outlived shutdown");
        for header in tasks {
            self.discard_task(&header);
        }
    }

    /// Returns `true` for the last worker to leave a stopped runtime.
    pub(crate) fn worker_exited(&self) -> bool {
        self.running_workers.fetch_sub(1, Ordering::AcqRel) == 1 && self.is_stopped()
    }

    pub(crate) fn stats(&self) -> RuntimeStats {
        let mut stats = self.counters.snapshot(self.worker_count());
        stats.global_queue_len = self.global.len();
        stats.sleeping_workers = self.coordinator.sleeping();
        stats.stealing_workers = self.coordinator.stealing();
        stats.pending_timers = self.timer.pending();
        stats.workers = self
            .worker_counters
            .iter()
            .enumerate()
            .map(|(index, counters)| counters.snapshot(index))
            .collect();
        stats
    }
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("workers", &self.worker_count())
            .field("alive", &self.counters.alive())
            .field("shutting_down", &self.is_shutting_down())
            .finish_non_exhaustive()
    }
}
