//! Tasks: identifiers, lifecycle states, cancellation and wakeups.

pub(crate) mod context;
pub(crate) mod handle;
pub(crate) mod header;
pub(crate) mod wait;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use handle::{SharedTaskHandle, TaskHandle};
pub use wait::{wait_with, Wait, WaitStrategy};

/// Unique identifier of a task within the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    /// Raw numeric value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Observable lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Created, not yet handed to the scheduler.
    New,
    /// Sitting on a ready queue.
    Queued,
    /// Being polled by a worker.
    Running,
    /// Parked until something wakes it.
    Suspended,
    /// Finished normally.
    Completed,
    /// Finished after cancellation was requested, or dropped before it ran.
    Cancelled,
}

impl TaskState {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::New,
            1 => Self::Queued,
            2 => Self::Running,
            3 => Self::Suspended,
            4 => Self::Completed,
            _ => Self::Cancelled,
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Returns `true` for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Why cancellation of a task was requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancellationReason {
    /// Not cancelled.
    None,
    /// Requested through a [`TaskHandle`].
    UserRequest,
    /// The task processor was overloaded when the task was scheduled.
    Overload,
    /// The runtime is shutting down.
    Shutdown,
    /// The task's deadline passed.
    Deadline,
}

impl CancellationReason {
    pub(crate) const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::None,
            1 => Self::UserRequest,
            2 => Self::Overload,
            3 => Self::Shutdown,
            _ => Self::Deadline,
        }
    }

    pub(crate) const fn as_u8(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for CancellationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::None => "not cancelled",
            Self::UserRequest => "user request",
            Self::Overload => "task processor overload",
            Self::Shutdown => "task processor shutdown",
            Self::Deadline => "task deadline reached",
        };
        f.write_str(text)
    }
}

/// What ended a wait.
///
/// When several sources fire at once, `WaitList` wins so that a notification
/// consumed by the waiter is never reported as a timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeupSource {
    /// The awaited primitive woke the task, or the condition already held.
    WaitList,
    /// The deadline passed.
    DeadlineTimer,
    /// Cancellation of the task was requested.
    CancelRequest,
}
