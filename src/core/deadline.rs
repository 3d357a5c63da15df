//! Absolute deadlines for timed waits.

use std::time::{Duration, Instant};

/// An absolute point in time after which a wait gives up.
///
/// An unreachable deadline never passes; it is what the untimed waits use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Deadline(Option<Instant>);

impl Deadline {
    /// A deadline that never passes.
    #[must_use]
    pub const fn unreachable() -> Self {
        Self(None)
    }

    /// A deadline `timeout` from now. Durations too large to represent
    /// produce an unreachable deadline.
    #[must_use]
    pub fn from_duration(timeout: Duration) -> Self {
        Self(Instant::now().checked_add(timeout))
    }

    /// A deadline at `instant`.
    #[must_use]
    pub const fn from_instant(instant: Instant) -> Self {
        Self(Some(instant))
    }

    /// A deadline that has already passed.
    #[must_use]
    pub fn passed() -> Self {
        Self(Some(Instant::now()))
    }

    /// Returns `true` if this deadline can ever pass.
    #[must_use]
    pub const fn is_reachable(&self) -> bool {
        self.0.is_some()
    }

    /// Returns `true` once the deadline is at or before now.
    #[must_use]
    pub fn is_reached(&self) -> bool {
        self.0.is_some_and(|at| at <= Instant::now())
    }

    /// Time remaining until the deadline, `None` when unreachable.
    #[must_use]
    pub fn time_left(&self) -> Option<Duration> {
        self.0.map(|at| at.saturating_duration_since(Instant::now()))
    }

    /// The underlying instant, `None` when unreachable.
    #[must_use]
    pub const fn instant(&self) -> Option<Instant> {
        self.0
    }
}

impl From<Duration> for Deadline {
    fn from(timeout: Duration) -> Self {
        Self::from_duration(timeout)
    }
}

impl From<Instant> for Deadline {
    fn from(instant: Instant) -> Self {
        Self::from_instant(instant)
    }
}
