//! Thread-local bookkeeping: which runtime a worker thread belongs to and
//! which task it is currently polling.

use std::cell::RefCell;
use std::sync::Arc;

use super::header::TaskHeader;
use crate::core::scheduler::Shared;

thread_local! {
    static WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };
    static CURRENT_TASK: RefCell<Option<Arc<TaskHeader>>> = const { RefCell::new(None) };
}

/// Identity of a worker thread.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub(crate) shared: Arc<Shared>,
    pub(crate) index: usize,
}

/// Restores the previous worker context on drop.
pub(crate) struct WorkerGuard {
    previous: Option<WorkerContext>,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        WORKER.with(|cell| *cell.borrow_mut() = previous);
    }
}

pub(crate) fn enter_worker(context: WorkerContext) -> WorkerGuard {
    let previous = WORKER.with(|cell| cell.borrow_mut().replace(context));
    WorkerGuard { previous }
}

pub(crate) fn with_worker<R>(f: impl FnOnce(Option<&WorkerContext>) -> R) -> R {
    WORKER.with(|cell| f(cell.borrow().as_ref()))
}

pub(crate) fn current_runtime() -> Option<Arc<Shared>> {
    if let Some(shared) = with_worker(|worker| worker.map(|w| Arc::clone(&w.shared))) {
        return Some(shared);
    }
    current_task().and_then(|task| task.runtime())
}

/// Restores the previously running task on drop.
pub(crate) struct TaskGuard {
    previous: Option<Arc<TaskHeader>>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT_TASK.with(|cell| *cell.borrow_mut() = previous);
    }
}

pub(crate) fn enter_task(task: Arc<TaskHeader>) -> TaskGuard {
    let previous = CURRENT_TASK.with(|cell| cell.borrow_mut().replace(task));
    TaskGuard { previous }
}

pub(crate) fn current_task() -> Option<Arc<TaskHeader>> {
    with_current_task(|task| task.cloned())
}

pub(crate) fn with_current_task<R>(f: impl FnOnce(Option<&Arc<TaskHeader>>) -> R) -> R {
    CURRENT_TASK.with(|cell| f(cell.borrow().as_ref()))
}
