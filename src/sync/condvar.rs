//! Condition variable for tasks, paired with the task [`Mutex`](super::Mutex).
//!
//! Every notification bumps an epoch. A waiter records the epoch while it
//! still holds the mutex, unlocks, and parks until the epoch moves. A
//! notification sent between the unlock and the park is therefore seen by
//! the registration check and never lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use super::mutex::MutexLock;
use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

/// Outcome of a condition variable wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CvStatus {
    /// Woken by a notification (or spuriously).
    NoTimeout,
    /// The deadline passed.
    Timeout,
    /// The waiting task was cancelled.
    Cancelled,
}

impl From<WakeupSource> for CvStatus {
    fn from(source: WakeupSource) -> Self {
        match source {
            WakeupSource::WaitList => Self::NoTimeout,
            WakeupSource::DeadlineTimer => Self::Timeout,
            WakeupSource::CancelRequest => Self::Cancelled,
        }
    }
}

/// Condition variable whose waits park the task.
///
/// Waits honor task cancellation. The mutex is always held again when a
/// wait returns, whatever the status.
#[derive(Debug, Default)]
pub struct ConditionVariable {
    epoch: AtomicU64,
    waiters: WaitQueue,
}

impl ConditionVariable {
    /// Creates a condition variable with no waiters.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            epoch: AtomicU64::new(0),
            waiters: WaitQueue::new(),
        }
    }

    /// Unlocks `lock`, waits for a notification, locks again.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait(&self, lock: &mut MutexLock<'_>) -> CvStatus {
        self.wait_until(lock, Deadline::unreachable()).await
    }

    /// [`wait`](Self::wait) with a timeout.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait_for(&self, lock: &mut MutexLock<'_>, timeout: Duration) -> CvStatus {
        self.wait_until(lock, Deadline::from_duration(timeout)).await
    }

    /// [`wait`](Self::wait) with a deadline.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait_until(&self, lock: &mut MutexLock<'_>, deadline: Deadline) -> CvStatus {
        assert!(lock.owns_lock(), "condition variable wait without the lock");
        let seen = self.epoch.load(Ordering::Acquire);
        lock.unlock();
        let source = self
            .waiters
            .wait_until(|| self.epoch.load(Ordering::Acquire) != seen, deadline, true)
            .await;
        lock.relock().await;
        source.into()
    }

    /// Waits until `pred` holds. Returns the final value of `pred`, which
    /// is `false` only when the task was cancelled.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait_pred<P>(&self, lock: &mut MutexLock<'_>, pred: P) -> bool
    where
        P: FnMut() -> bool,
    {
        self.wait_until_pred(lock, Deadline::unreachable(), pred).await
    }

    /// Waits until `pred` holds or `timeout` passes.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait_for_pred<P>(&self, lock: &mut MutexLock<'_>, timeout: Duration, pred: P) -> bool
    where
        P: FnMut() -> bool,
    {
        self.wait_until_pred(lock, Deadline::from_duration(timeout), pred)
            .await
    }

    /// Waits until `pred` holds or `deadline` passes. Returns the final
    /// value of `pred`.
    ///
    /// # Panics
    ///
    /// Panics if `lock` does not hold its mutex.
    pub async fn wait_until_pred<P>(&self, lock: &mut MutexLock<'_>, deadline: Deadline, mut pred: P) -> bool
    where
        P: FnMut() -> bool,
    {
        while !pred() {
            if self.wait_until(lock, deadline).await != CvStatus::NoTimeout {
                return pred();
            }
        }
        true
    }

    /// Wakes one waiter.
    pub fn notify_one(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.waiters.wake_one();
    }

    /// Wakes every waiter.
    pub fn notify_all(&self) {
        self.epoch.fetch_add(1, Ordering::AcqRel);
        self.waiters.wake_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_wakeup_source() {
        assert_eq!(CvStatus::from(WakeupSource::WaitList), CvStatus::NoTimeout);
        assert_eq!(CvStatus::from(WakeupSource::DeadlineTimer), CvStatus::Timeout);
        assert_eq!(CvStatus::from(WakeupSource::CancelRequest), CvStatus::Cancelled);
    }

    #[test]
    fn test_notify_without_waiters_advances_epoch() {
        let cv = ConditionVariable::new();
        cv.notify_one();
        cv.notify_all();
        assert_eq!(cv.epoch.load(Ordering::Relaxed), 2);
    }
}
