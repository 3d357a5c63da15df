//! Read-only counters exposed for external metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Snapshot of one worker's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerStats {
    /// Worker index within its runtime.
    pub worker_id: usize,
    /// Polls performed.
    pub tasks_polled: u64,
    /// Tasks taken from the worker's own local queue.
    pub local_pops: u64,
    /// Tasks taken from the global queue.
    pub global_pops: u64,
    /// Rounds of stealing attempted.
    pub steal_attempts: u64,
    /// Tasks taken from other workers.
    pub stolen_tasks: u64,
    /// Times the worker went to sleep.
    pub sleeps: u64,
    /// Times the local queue overflowed into the global queue.
    pub local_overflows: u64,
}

/// Snapshot of a runtime's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuntimeStats {
    /// Number of worker threads.
    pub worker_count: usize,
    /// Tasks ever spawned.
    pub tasks_created: u64,
    /// Tasks that ran to completion or were dropped.
    pub tasks_finished: u64,
    /// Tasks finished in the `Cancelled` state.
    pub tasks_cancelled: u64,
    /// Times the overload limits were hit.
    pub tasks_overloaded: u64,
    /// Tasks currently alive.
    pub tasks_alive: u64,
    /// Keys currently on the global queue.
    pub global_queue_len: usize,
    /// Workers currently asleep.
    pub sleeping_workers: usize,
    /// Workers currently in the stealing phase.
    pub stealing_workers: usize,
    /// Deadlines registered with the timer thread.
    pub pending_timers: usize,
    /// Per-worker counters.
    pub workers: Vec<WorkerStats>,
}

/// Runtime-wide task counters.
#[derive(Debug, Default)]
pub(crate) struct TaskCounters {
    pub created: AtomicU64,
    pub finished: AtomicU64,
    pub cancelled: AtomicU64,
    pub overloaded: AtomicU64,
}

impl TaskCounters {
    pub(crate) fn alive(&self) -> u64 {
        let created = self.created.load(Ordering::Acquire);
        created.saturating_sub(self.finished.load(Ordering::Acquire))
    }

    /// Fills the task fields of a runtime snapshot.
    pub(crate) fn snapshot(&self, worker_count: usize) -> RuntimeStats {
        RuntimeStats {
            worker_count,
            tasks_created: self.created.load(Ordering::Relaxed),
            tasks_finished: self.finished.load(Ordering::Relaxed),
            tasks_cancelled: self.cancelled.load(Ordering::Relaxed),
            tasks_overloaded: self.overloaded.load(Ordering::Relaxed),
            tasks_alive: self.alive(),
            ..RuntimeStats::default()
        }
    }
}

/// Per-worker counters, written only by the owning worker.
#[derive(Debug, Default)]
pub(crate) struct WorkerCounters {
    pub tasks_polled: AtomicU64,
    pub local_pops: AtomicU64,
    pub global_pops: AtomicU64,
    pub steal_attempts: AtomicU64,
    pub stolen_tasks: AtomicU64,
    pub sleeps: AtomicU64,
    pub local_overflows: AtomicU64,
}

impl WorkerCounters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, worker_id: usize) -> WorkerStats {
        WorkerStats {
            worker_id,
            tasks_polled: self.tasks_polled.load(Ordering::Relaxed),
            local_pops: self.local_pops.load(Ordering::Relaxed),
            global_pops: self.global_pops.load(Ordering::Relaxed),
            steal_attempts: self.steal_attempts.load(Ordering::Relaxed),
            stolen_tasks: self.stolen_tasks.load(Ordering::Relaxed),
            sleeps: self.sleeps.load(Ordering::Relaxed),
            local_overflows: self.local_overflows.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_counters_snapshot() {
        let counters = TaskCounters::default();
        counters.created.fetch_add(10, Ordering::Relaxed);
        counters.finished.fetch_add(4, Ordering::Relaxed);
        counters.cancelled.fetch_add(1, Ordering::Relaxed);

        let stats = counters.snapshot(3);
        assert_eq!(stats.worker_count, 3);
        assert_eq!(stats.tasks_created, 10);
        assert_eq!(stats.tasks_alive, 6);
        assert_eq!(stats.tasks_cancelled, 1);
        assert!(stats.workers.is_empty());
    }

    #[test]
    fn test_worker_counters_snapshot() {
        let counters = WorkerCounters::default();
        WorkerCounters::bump(&counters.stolen_tasks);
        WorkerCounters::bump(&counters.stolen_tasks);
        let stats = counters.snapshot(2);
        assert_eq!(stats.worker_id, 2);
        assert_eq!(stats.stolen_tasks, 2);
        assert_eq!(stats.sleeps, 0);
    }

    #[test]
    fn test_stats_serialize() {
        let stats = RuntimeStats {
            worker_count: 1,
            workers: vec![WorkerStats::default()],
            ..RuntimeStats::default()
        };
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"worker_count\":1"));
        assert!(json.contains("\"local_overflows\":0"));
    }
}
