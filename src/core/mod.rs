//! Scheduler core: tasks, workers, deadlines, errors and statistics.

pub mod deadline;
pub mod error;
pub(crate) mod scheduler;
pub mod stats;
pub mod task;

pub use deadline::Deadline;
pub use error::{AppResult, EngineError, FutureError, SemaphoreError};
pub use stats::{RuntimeStats, WorkerStats};
pub use task::{
    wait_with, CancellationReason, SharedTaskHandle, TaskHandle, TaskId, TaskState, Wait,
    WaitStrategy, WakeupSource,
};
