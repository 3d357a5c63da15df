//! Error types for the task engine and its synchronization primitives.
//!
//! Timeouts and cancellation observed while waiting are not errors; they are
//! reported as plain values (`bool`, [`FutureStatus`](crate::sync::FutureStatus),
//! [`WakeupSource`](crate::core::WakeupSource)).

use thiserror::Error;

use crate::core::task::CancellationReason;

/// Errors produced while building or driving a runtime.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Runtime configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The OS refused to start a worker or timer thread.
    #[error("failed to spawn thread `{name}`: {source}")]
    ThreadSpawn {
        /// Name of the thread that could not be started.
        name: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// No task processor with the requested name is configured.
    #[error("unknown task processor: {0}")]
    UnknownTaskProcessor(String),
}

/// Errors reported by [`Promise`](crate::sync::Promise) and
/// [`Future`](crate::sync::Future).
#[derive(Debug, Error)]
pub enum FutureError {
    /// `set_value` or `set_exception` was called on a satisfied promise.
    #[error("promise already satisfied")]
    PromiseAlreadySatisfied,
    /// The future was already retrieved from the promise, or its value was
    /// already consumed with `get`.
    #[error("future already retrieved")]
    AlreadyRetrieved,
    /// The promise was dropped without being satisfied.
    #[error("broken promise")]
    BrokenPromise,
    /// The waiting task was cancelled before the value became ready.
    #[error("wait interrupted by task cancellation")]
    WaitInterrupted,
    /// The producing task was cancelled before it produced a value.
    #[error("task cancelled: {0}")]
    TaskCancelled(CancellationReason),
    /// The producer stored an application error.
    #[error(transparent)]
    Exception(#[from] anyhow::Error),
}

impl FutureError {
    /// Copy of this error for another reader of a shared result. A stored
    /// application error is copied by its message, including its causes.
    #[must_use]
    pub fn duplicate(&self) -> Self {
        match self {
            Self::PromiseAlreadySatisfied => Self::PromiseAlreadySatisfied,
            Self::AlreadyRetrieved => Self::AlreadyRetrieved,
            Self::BrokenPromise => Self::BrokenPromise,
            Self::WaitInterrupted => Self::WaitInterrupted,
            Self::TaskCancelled(reason) => Self::TaskCancelled(*reason),
            Self::Exception(error) => Self::Exception(anyhow::anyhow!("{error:#}")),
        }
    }
}

/// Errors reported by cancellable synchronization primitives.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreError {
    /// The waiting task was cancelled before enough tokens were released.
    #[error("semaphore wait cancelled")]
    Cancelled,
    /// The request can never be satisfied with the current capacity.
    #[error("requested {requested} tokens from a semaphore of capacity {capacity}")]
    Unreachable {
        /// Tokens requested.
        requested: usize,
        /// Current capacity.
        capacity: usize,
    },
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
