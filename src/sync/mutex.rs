//! Task mutex.
//!
//! A data-less lock whose contention parks the task instead of the worker
//! thread. It is not FIFO: an unlocking task wakes one waiter, but a task
//! arriving on the fast path may take the lock first.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

/// Mutual exclusion between tasks.
#[derive(Debug, Default)]
pub struct Mutex {
    locked: AtomicBool,
    waiters: WaitQueue,
}

impl Mutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            locked: AtomicBool::new(false),
            waiters: WaitQueue::new(),
        }
    }

    fn try_lock_fast(&self) -> bool {
        self.locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Returns `true` if some task holds the lock. Racy.
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    async fn lock_slow(&self, deadline: Deadline) -> bool {
        loop {
            let mut acquired = false;
            let source = self
                .waiters
                .wait_until(
                    || {
                        acquired = self.try_lock_fast();
                        acquired
                    },
                    deadline,
                    false,
                )
                .await;
            if acquired || self.try_lock_fast() {
                return true;
            }
            if source != WakeupSource::WaitList {
                if !self.is_locked() {
                    self.waiters.wake_one();
                }
                return false;
            }
        }
    }

    /// Acquires the lock, parking the task while it is held elsewhere.
    /// Cancellation is ignored.
    pub async fn lock(&self) -> MutexLock<'_> {
        if !self.try_lock_fast() {
            self.lock_slow(Deadline::unreachable()).await;
        }
        MutexLock {
            mutex: self,
            owns: true,
        }
    }

    /// Acquires the lock if it is free.
    #[must_use]
    pub fn try_lock(&self) -> Option<MutexLock<'_>> {
        self.try_lock_fast().then_some(MutexLock {
            mutex: self,
            owns: true,
        })
    }

    /// Acquires the lock unless `timeout` passes first.
    pub async fn try_lock_for(&self, timeout: Duration) -> Option<MutexLock<'_>> {
        self.try_lock_until(Deadline::from_duration(timeout)).await
    }

    /// Acquires the lock unless `deadline` passes first.
    pub async fn try_lock_until(&self, deadline: Deadline) -> Option<MutexLock<'_>> {
        let acquired = self.try_lock_fast() || self.lock_slow(deadline).await;
        acquired.then_some(MutexLock {
            mutex: self,
            owns: true,
        })
    }

    fn unlock(&self) {
        self.locked.store(false, Ordering::Release);
        self.waiters.wake_one();
    }
}

/// Holds a [`Mutex`] locked; unlocks on drop.
#[derive(Debug)]
#[must_use = "the mutex is unlocked as soon as the guard is dropped"]
pub struct MutexLock<'a> {
    mutex: &'a Mutex,
    owns: bool,
}

impl MutexLock<'_> {
    /// Returns `true` while the guard holds the lock.
    #[must_use]
    pub const fn owns_lock(&self) -> bool {
        self.owns
    }

    /// Unlocks early. Does nothing if already unlocked.
    pub fn unlock(&mut self) {
        if std::mem::replace(&mut self.owns, false) {
            self.mutex.unlock();
        }
    }

    /// Locks again after [`unlock`](Self::unlock).
    ///
    /// # Panics
    ///
    /// Panics if the guard still holds the lock.
    pub async fn relock(&mut self) {
        assert!(!self.owns, "relock on a guard that already owns the mutex");
        if !self.mutex.try_lock_fast() {
            self.mutex.lock_slow(Deadline::unreachable()).await;
        }
        self.owns = true;
    }
}

impl Drop for MutexLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
