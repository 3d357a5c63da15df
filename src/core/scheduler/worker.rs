//! Worker thread main loop.
//!
//! Task sources, in order of preference:
//! 1. every `global_queue_interval` ticks, the global queue first;
//! 2. the worker's own local queue;
//! 3. a fair-share bulk pop from the global queue;
//! 4. stealing from other workers, when the coordinator admits it.
//!
//! With nothing found the worker registers as asleep, re-checks every queue,
//! and parks until another thread publishes work.

use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::thread::{self, JoinHandle};

use parking_lot_core::SpinWait;
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, trace};

use super::shared::Shared;
use crate::core::error::EngineError;
use crate::core::stats::WorkerCounters;
use crate::core::task::context::{self, WorkerContext};

pub(crate) struct Worker {
    shared: Arc<Shared>,
    index: usize,
    tick: u32,
    rng: SmallRng,
}

impl Worker {
    /// Spawn the worker thread `index` of `shared`.
    pub(crate) fn spawn(shared: Arc<Shared>, index: usize) -> Result<JoinHandle<()>, EngineError> {
        let name = format!("{}-{index}", shared.config().thread_name);
        let stack_size = shared.config().thread_stack_size;
        thread::Builder::new()
            .name(name.clone())
            .stack_size(stack_size)
            .spawn(move || {
                Self {
                    shared,
                    index,
                    tick: 0,
                    rng: SmallRng::from_rng(&mut rand::rng()),
                }
                .run();
            })
            .map_err(|source| EngineError::ThreadSpawn { name, source })
    }

    fn counters(&self) -> &WorkerCounters {
        &self.shared.worker_counters[self.index]
    }

    fn run(mut self) {
        let _worker = context::enter_worker(WorkerContext {
            shared: Arc::clone(&self.shared),
            index: self.index,
        });
        debug!(worker_id = self.index, "worker thread started");
        while !self.shared.is_stopped() {
            match self.next_task() {
                Some(key) => self.run_task(key),
                None => self.park(),
            }
        }
        debug!(worker_id = self.index, "worker thread exiting");
        if self.shared.worker_exited() {
            self.shared.drop_remaining_tasks();
        }
    }

    fn next_task(&mut self) -> Option<usize> {
        self.tick = self.tick.wrapping_add(1);
        let shared = Arc::clone(&self.shared);
        if self.tick % shared.config().global_queue_interval == 0 {
            if let Some(key) = shared.global.pop() {
                WorkerCounters::bump(&self.counters().global_pops);
                return Some(key);
            }
        }
        if let Some(key) = shared.locals[self.index].pop() {
            WorkerCounters::bump(&self.counters().local_pops);
            return Some(key);
        }
        if let Some(key) = self.pop_global_bulk() {
            return Some(key);
        }
        self.steal()
    }

    /// Takes a fair share of the global queue: one key to run, the rest
    /// onto the local queue.
    fn pop_global_bulk(&self) -> Option<usize> {
        let shared = &*self.shared;
        let local = &shared.locals[self.index];
        let share = (shared.global.len() / shared.worker_count() + 1)
            .min(shared.config().global_bulk_max)
            .min(local.remaining() + 1);
        let first = shared.global.pop()?;
        WorkerCounters::bump(&self.counters().global_pops);
        for _ in 1..share {
            let Some(key) = shared.global.pop() else {
                break;
            };
            local.push(key, &shared.global);
        }
        Some(first)
    }

    fn steal(&mut self) -> Option<usize> {
        let shared = Arc::clone(&self.shared);
        let workers = shared.worker_count();
        if workers < 2 || !shared.coordinator.allow_stealing() {
            return None;
        }
        let own = &shared.locals[self.index];
        let batch = shared.config().steal_batch;
        let mut backoff = SpinWait::new();
        let mut found = None;
        'rounds: for _ in 0..shared.config().steal_attempts {
            WorkerCounters::bump(&self.counters().steal_attempts);
            let start = self.rng.random_range(0..workers);
            for offset in 0..workers {
                let victim = (start + offset) % workers;
                if victim == self.index {
                    continue;
                }
                if let Some(key) = shared.locals[victim].steal_into(own, batch, &shared.global) {
                    WorkerCounters::bump(&self.counters().stolen_tasks);
                    trace!(worker_id = self.index, victim, "stole work");
                    found = Some(key);
                    break 'rounds;
                }
            }
            if let Some(key) = shared.global.pop() {
                WorkerCounters::bump(&self.counters().global_pops);
                found = Some(key);
                break;
            }
            if !backoff.spin() {
                break;
            }
        }
        let last_stealer = shared.coordinator.stop_stealing();
        if found.is_some() && (last_stealer || !own.is_empty()) {
            shared.coordinator.wake_up_one();
        }
        found
    }

    fn run_task(&self, key: usize) {
        let Some(header) = self.shared.task(key) else {
            return;
        };
        self.shared.check_wait_time(&header);
        if !header.is_started() && header.is_cancel_requested() && !header.is_critical() {
            self.shared.abort_task(&header);
            return;
        }
        header.transition_to_running();
        WorkerCounters::bump(&self.counters().tasks_polled);

        let waker = Waker::from(Arc::clone(&header));
        let mut cx = Context::from_waker(&waker);
        let poll = {
            let _task = context::enter_task(Arc::clone(&header));
            header.poll(&mut cx)
        };
        match poll {
            Poll::Ready(()) => self.shared.finish_task(&header),
            Poll::Pending => {
                if !header.transition_to_idle() {
                    self.shared.push_ready(header.key());
                }
            }
        }
    }

    fn park(&self) {
        let coordinator = &self.shared.coordinator;
        let parker = coordinator.parker(self.index);
        let generation = parker.generation();
        coordinator.notify_sleep(self.index);
        if self.shared.has_pending_work() || self.shared.is_stopped() {
            coordinator.notify_wake_up(self.index);
            return;
        }
        WorkerCounters::bump(&self.counters().sleeps);
        trace!(worker_id = self.index, "worker going to sleep");
        parker.park(generation);
        coordinator.notify_wake_up(self.index);
    }
}
