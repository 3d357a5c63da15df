//! Task processors: worker threads driving the scheduler, plus the entry
//! points for spawning and blocking on tasks.

mod handle;

use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use futures::FutureExt;
use parking_lot::Mutex;
use tracing::{info, warn};

pub use handle::Handle;

use crate::config::RuntimeConfig;
use crate::core::deadline::Deadline;
use crate::core::error::EngineError;
use crate::core::scheduler::worker::Worker;
use crate::core::scheduler::Shared;
use crate::core::stats::RuntimeStats;
use crate::core::task::context;
use crate::core::task::TaskHandle;

/// A pool of worker threads running tasks with work stealing.
///
/// Dropping the runtime shuts it down: live tasks are cancelled, given
/// `shutdown_timeout_ms` to finish, and dropped afterwards.
///
/// ```
/// use prometheus_engine::config::RuntimeConfig;
/// use prometheus_engine::runtime::Runtime;
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap();
/// let answer = runtime.block_on(async {
///     let task = prometheus_engine::spawn(async { 6 * 7 });
///     task.get().await.unwrap()
/// });
/// assert_eq!(answer, 42);
/// ```
#[derive(Debug)]
pub struct Runtime {
    shared: Arc<Shared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl Runtime {
    /// Starts the worker threads and the timer thread.
    ///
    /// # Errors
    ///
    /// - [`EngineError::InvalidConfig`] if the configuration is invalid
    /// - [`EngineError::ThreadSpawn`] if a thread could not be started
    pub fn new(config: RuntimeConfig) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let worker_count = config.worker_threads;
        let timer_name = format!("{}-timer", config.thread_name);
        let shared = Arc::new(Shared::new(config));

        let runtime = Self {
            workers: Mutex::new(Vec::with_capacity(worker_count)),
            timer: Mutex::new(Some(shared.timer().spawn(timer_name)?)),
            shared,
        };
        for index in 0..worker_count {
            let worker = Worker::spawn(Arc::clone(&runtime.shared), index)?;
            runtime.workers.lock().push(worker);
        }

        info!(
            worker_count,
            local_queue_capacity = runtime.shared.config().local_queue_capacity,
            thread_name = %runtime.shared.config().thread_name,
            "runtime started"
        );
        Ok(runtime)
    }

    /// Returns a cloneable handle for spawning tasks.
    #[must_use]
    pub fn handle(&self) -> Handle {
        Handle::new(Arc::clone(&self.shared))
    }

    /// Spawns `future` as a new task.
    pub fn spawn<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle().spawn(future)
    }

    /// Spawns `future` as a critical task.
    pub fn spawn_critical<F>(&self, future: F) -> TaskHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.handle().spawn_critical(future)
    }

    /// Runs `future` as a critical task and blocks the calling OS thread
    /// until it finishes. A panic inside the future is resumed here.
    ///
    /// # Panics
    ///
    /// Panics when called from a worker thread, after [`shutdown`](Self::shutdown),
    /// or when the runtime is torn down before the future completes.
    pub fn block_on<F>(&self, future: F) -> F::Output
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        assert!(
            context::with_worker(|worker| worker.is_none()),
            "block_on called from a runtime worker thread"
        );
        assert!(!self.shared.is_stopped(), "block_on called on a runtime that was shut down");
        let (tx, rx) = crossbeam_channel::bounded(1);
        let body = async move {
            let outcome = AssertUnwindSafe(future).catch_unwind().await;
            let _ = tx.send(outcome);
        };
        self.shared.spawn_task(Box::pin(body), true, Deadline::unreachable());
        match rx.recv() {
            Ok(Ok(value)) => value,
            Ok(Err(payload)) => panic::resume_unwind(payload),
            Err(_) => panic!("runtime shut down before the blocked-on future completed"),
        }
    }

    /// Snapshot of the runtime's counters.
    #[must_use]
    pub fn stats(&self) -> RuntimeStats {
        self.shared.stats()
    }

    /// Cancels every task, waits for them within the configured timeout,
    /// stops and joins all threads. Idempotent.
    pub fn shutdown(&self) {
        let on_own_worker = context::with_worker(|worker| {
            worker.is_some_and(|worker| Arc::ptr_eq(&worker.shared, &self.shared))
        });
        if on_own_worker {
            warn!(
                alive = self.shared.stats().tasks_alive,
                "runtime dropped on its own worker thread; threads are detached"
            );
            self.shared.begin_shutdown();
            self.shared.stop();
            return;
        }

        let workers = std::mem::take(&mut *self.workers.lock());
        let timer = self.timer.lock().take();
        if workers.is_empty() && timer.is_none() {
            return;
        }

        info!("shutting down runtime");
        self.shared.begin_shutdown();
        if !self.shared.wait_drained(self.shared.config().shutdown_timeout()) {
            warn!(
                alive = self.shared.stats().tasks_alive,
                "tasks still alive after shutdown timeout"
            );
        }
        self.shared.stop();

        let worker_count = workers.len();
        for (worker_id, worker) in workers.into_iter().enumerate() {
            if worker.join().is_err() {
                warn!(worker_id, "worker panicked");
            }
        }
        if let Some(timer) = timer {
            if timer.join().is_err() {
                warn!("timer thread panicked");
            }
        }
        self.shared.drop_remaining_tasks();
        info!(worker_count, "runtime shut down complete");
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Spawns `future` on the runtime driving the current thread.
///
/// # Panics
///
/// Panics when called outside of a runtime.
pub fn spawn<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Handle::current().spawn(future)
}

/// Spawns a critical task on the runtime driving the current thread.
///
/// # Panics
///
/// Panics when called outside of a runtime.
pub fn spawn_critical<F>(future: F) -> TaskHandle<F::Output>
where
    F: Future + Send + 'static,
    F::Output: Send + 'static,
{
    Handle::current().spawn_critical(future)
}
