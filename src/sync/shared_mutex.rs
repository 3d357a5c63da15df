//! Reader/writer lock for tasks with writer priority.
//!
//! The lock is a [`Semaphore`] of `MAX_READERS` tokens: a reader takes one
//! token, a writer takes all of them. Writers announce themselves in
//! `waiting_writers` before they start waiting; new readers first wait at a
//! gate until no writer is announced, so a queued writer cannot be starved
//! by a stream of readers.
//!
//! All waits ignore task cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::semaphore::Semaphore;
use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

const MAX_READERS: usize = usize::MAX >> 2;

/// Task reader/writer lock.
#[derive(Debug)]
pub struct SharedMutex {
    semaphore: Semaphore,
    waiting_writers: AtomicUsize,
    writers_gate: WaitQueue,
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// Keeps a writer announced for as long as it is acquiring.
struct WriterAnnouncement<'a>(&'a SharedMutex);

impl<'a> WriterAnnouncement<'a> {
    fn new(mutex: &'a SharedMutex) -> Self {
        mutex.waiting_writers.fetch_add(1, Ordering::AcqRel);
        Self(mutex)
    }
}

impl Drop for WriterAnnouncement<'_> {
    fn drop(&mut self) {
        if self.0.waiting_writers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.0.writers_gate.wake_all();
        }
    }
}

impl SharedMutex {
    /// Creates an unlocked mutex.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            semaphore: Semaphore::new(MAX_READERS),
            waiting_writers: AtomicUsize::new(0),
            writers_gate: WaitQueue::new(),
        }
    }

    /// Returns `true` if a writer is queued for the lock. Racy.
    #[must_use]
    pub fn has_waiting_writer(&self) -> bool {
        self.waiting_writers.load(Ordering::Acquire) > 0
    }

    /// Locks exclusively, parking the task until readers and writers leave.
    pub async fn lock(&self) -> ExclusiveLock<'_> {
        let announced = WriterAnnouncement::new(self);
        self.semaphore.acquire(MAX_READERS).await;
        drop(announced);
        ExclusiveLock::new(self)
    }

    /// Locks exclusively if nobody holds the lock.
    #[must_use]
    pub fn try_lock(&self) -> Option<ExclusiveLock<'_>> {
        self.semaphore
            .try_acquire(MAX_READERS)
            .then(|| ExclusiveLock::new(self))
    }

    /// [`lock`](Self::lock) with a timeout.
    pub async fn try_lock_for(&self, timeout: Duration) -> Option<ExclusiveLock<'_>> {
        self.try_lock_until(Deadline::from_duration(timeout)).await
    }

    /// [`lock`](Self::lock) with a deadline.
    pub async fn try_lock_until(&self, deadline: Deadline) -> Option<ExclusiveLock<'_>> {
        let announced = WriterAnnouncement::new(self);
        let acquired = self.semaphore.try_acquire_until(MAX_READERS, deadline).await;
        drop(announced);
        acquired.then(|| ExclusiveLock::new(self))
    }

    /// Releases an exclusive lock taken without a guard, see
    /// [`ExclusiveLock::forget`].
    pub fn unlock(&self) {
        self.semaphore.release(MAX_READERS);
    }

    async fn pass_writers_gate(&self, deadline: Deadline) -> bool {
        loop {
            let source = self
                .writers_gate
                .wait_until(|| !self.has_waiting_writer(), deadline, false)
                .await;
            if !self.has_waiting_writer() {
                return true;
            }
            if source != WakeupSource::WaitList {
                return false;
            }
        }
    }

    /// Locks shared. Waits behind any announced writer first.
    pub async fn lock_shared(&self) -> SharedLock<'_> {
        self.pass_writers_gate(Deadline::unreachable()).await;
        self.semaphore.acquire(1).await;
        SharedLock::new(self)
    }

    /// Locks shared if no writer holds or waits for the lock.
    #[must_use]
    pub fn try_lock_shared(&self) -> Option<SharedLock<'_>> {
        (!self.has_waiting_writer() && self.semaphore.try_acquire(1)).then(|| SharedLock::new(self))
    }

    /// [`lock_shared`](Self::lock_shared) with a timeout.
    pub async fn try_lock_shared_for(&self, timeout: Duration) -> Option<SharedLock<'_>> {
        self.try_lock_shared_until(Deadline::from_duration(timeout)).await
    }

    /// [`lock_shared`](Self::lock_shared) with a deadline.
    pub async fn try_lock_shared_until(&self, deadline: Deadline) -> Option<SharedLock<'_>> {
        if !self.pass_writers_gate(deadline).await {
            return None;
        }
        self.semaphore
            .try_acquire_until(1, deadline)
            .await
            .then(|| SharedLock::new(self))
    }

    /// Releases a shared lock taken without a guard, see
    /// [`SharedLock::forget`].
    pub fn unlock_shared(&self) {
        self.semaphore.release(1);
    }
}

/// Exclusive hold on a [`SharedMutex`].
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ExclusiveLock<'a> {
    mutex: &'a SharedMutex,
    owns: bool,
}

impl<'a> ExclusiveLock<'a> {
    const fn new(mutex: &'a SharedMutex) -> Self {
        Self { mutex, owns: true }
    }

    /// Returns `true` while the guard holds the lock.
    #[must_use]
    pub const fn owns_lock(&self) -> bool {
        self.owns
    }

    /// Unlocks early.
    pub fn unlock(&mut self) {
        if std::mem::replace(&mut self.owns, false) {
            self.mutex.unlock();
        }
    }

    /// Keeps the lock held past the guard; release with
    /// [`SharedMutex::unlock`].
    pub fn forget(mut self) {
        self.owns = false;
    }
}

impl Drop for ExclusiveLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Shared hold on a [`SharedMutex`].
#[derive(Debug)]
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedLock<'a> {
    mutex: &'a SharedMutex,
    owns: bool,
}

impl<'a> SharedLock<'a> {
    const fn new(mutex: &'a SharedMutex) -> Self {
        Self { mutex, owns: true }
    }

    /// Returns `true` while the guard holds the lock.
    #[must_use]
    pub const fn owns_lock(&self) -> bool {
        self.owns
    }

    /// Unlocks early.
    pub fn unlock(&mut self) {
        if std::mem::replace(&mut self.owns, false) {
            self.mutex.unlock_shared();
        }
    }

    /// Keeps the lock held past the guard; release with
    /// [`SharedMutex::unlock_shared`].
    pub fn forget(mut self) {
        self.owns = false;
    }
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
