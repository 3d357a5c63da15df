//! Counting semaphore for tasks.
//!
//! The fast path is a compare-and-swap loop on the remaining token count.
//! Waiters park on a [`WaitQueue`] and retry the CAS each time they are
//! woken, so a fresh acquirer can overtake a parked one: the semaphore is
//! not FIFO.
//!
//! [`Semaphore`] ignores cancellation of the waiting task; once a lock is
//! requested it is either acquired or the deadline passes.
//! [`CancellableSemaphore`] shares the token logic but gives up when the
//! waiting task is cancelled.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::error::SemaphoreError;
use crate::core::task::WakeupSource;

fn tokens(count: usize) -> i64 {
    i64::try_from(count).unwrap_or(i64::MAX)
}

/// Counting semaphore whose waits park the task, not the thread.
///
/// ```
/// use std::sync::Arc;
/// use prometheus_engine::config::RuntimeConfig;
/// use prometheus_engine::runtime::Runtime;
/// use prometheus_engine::sync::Semaphore;
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap();
/// let semaphore = Arc::new(Semaphore::new(2));
/// let left = runtime.block_on({
///     let semaphore = Arc::clone(&semaphore);
///     async move {
///         let _lock = semaphore.lock(2).await;
///         assert!(!semaphore.try_acquire(1));
///         semaphore.remaining_approx()
///     }
/// });
/// assert_eq!(left, 0);
/// assert_eq!(semaphore.remaining_approx(), 2);
/// ```
#[derive(Debug)]
pub struct Semaphore {
    remaining: AtomicI64,
    capacity: AtomicI64,
    waiters: WaitQueue,
}

impl Semaphore {
    /// Creates a semaphore with `capacity` tokens, all available.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not fit in an `i64`.
    #[must_use]
    #[allow(clippy::cast_possible_wrap)]
    pub const fn new(capacity: usize) -> Self {
        assert!(capacity <= i64::MAX as usize, "semaphore capacity too large");
        Self {
            remaining: AtomicI64::new(capacity as i64),
            capacity: AtomicI64::new(capacity as i64),
            waiters: WaitQueue::new(),
        }
    }

    /// Maximum number of tokens.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn capacity(&self) -> usize {
        self.capacity.load(Ordering::Acquire).max(0) as usize
    }

    /// Tokens currently available, clamped at zero. Racy.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn remaining_approx(&self) -> usize {
        self.remaining.load(Ordering::Acquire).max(0) as usize
    }

    /// Tokens currently held. Racy.
    #[must_use]
    #[allow(clippy::cast_sign_loss)]
    pub fn used_approx(&self) -> usize {
        let used = self.capacity.load(Ordering::Acquire) - self.remaining.load(Ordering::Acquire);
        used.max(0) as usize
    }

    /// Changes the capacity. Holders keep their tokens; when the capacity
    /// shrinks below the tokens in use, new acquirers wait until enough are
    /// released.
    pub fn set_capacity(&self, capacity: usize) {
        let new = tokens(capacity);
        let old = self.capacity.swap(new, Ordering::AcqRel);
        self.remaining.fetch_add(new - old, Ordering::AcqRel);
        if new > old {
            self.waiters.wake_all();
        }
    }

    fn assert_reachable(&self, count: usize) {
        let capacity = self.capacity();
        assert!(
            count <= capacity,
            "requested {count} tokens from a semaphore of capacity {capacity}"
        );
    }

    fn try_acquire_fast(&self, count: i64) -> bool {
        let mut current = self.remaining.load(Ordering::Acquire);
        loop {
            if current < count {
                return false;
            }
            match self.remaining.compare_exchange_weak(
                current,
                current - count,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Parks until `count` tokens are taken. `None` means acquired.
    pub(crate) async fn acquire_slow(
        &self,
        count: usize,
        deadline: Deadline,
        cancellable: bool,
    ) -> Option<WakeupSource> {
        let needed = tokens(count);
        loop {
            let mut acquired = false;
            let source = self
                .waiters
                .wait_until(
                    || {
                        acquired = self.try_acquire_fast(needed);
                        acquired
                    },
                    deadline,
                    cancellable,
                )
                .await;
            if acquired || self.try_acquire_fast(needed) {
                return None;
            }
            if source != WakeupSource::WaitList {
                // A release may have woken us just before we gave up.
                if self.remaining.load(Ordering::Acquire) > 0 {
                    self.waiters.wake_one();
                }
                return Some(source);
            }
        }
    }

    /// Takes `count` tokens without waiting.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    #[must_use]
    pub fn try_acquire(&self, count: usize) -> bool {
        self.assert_reachable(count);
        self.try_acquire_fast(tokens(count))
    }

    /// Takes `count` tokens, parking the task until they are available.
    /// Cancellation of the task is ignored.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn acquire(&self, count: usize) {
        self.assert_reachable(count);
        if self.try_acquire_fast(tokens(count)) {
            return;
        }
        self.acquire_slow(count, Deadline::unreachable(), false).await;
    }

    /// Like [`acquire`](Self::acquire) but gives up after `timeout`.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn try_acquire_for(&self, count: usize, timeout: Duration) -> bool {
        self.try_acquire_until(count, Deadline::from_duration(timeout)).await
    }

    /// Like [`acquire`](Self::acquire) but gives up at `deadline`.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn try_acquire_until(&self, count: usize, deadline: Deadline) -> bool {
        self.assert_reachable(count);
        if self.try_acquire_fast(tokens(count)) {
            return true;
        }
        self.acquire_slow(count, deadline, false).await.is_none()
    }

    /// Returns `count` tokens. Wakes one waiter for a single token, all of
    /// them otherwise, since a multi-token release may satisfy several.
    pub fn release(&self, count: usize) {
        self.remaining.fetch_add(tokens(count), Ordering::AcqRel);
        if count == 1 {
            self.waiters.wake_one();
        } else {
            self.waiters.wake_all();
        }
    }

    /// Acquires `count` tokens and returns a guard releasing them on drop.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn lock(&self, count: usize) -> SemaphoreLock<'_> {
        self.acquire(count).await;
        SemaphoreLock::new(self, count)
    }

    /// Non-blocking [`lock`](Self::lock).
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    #[must_use]
    pub fn try_lock(&self, count: usize) -> Option<SemaphoreLock<'_>> {
        self.try_acquire(count).then(|| SemaphoreLock::new(self, count))
    }

    /// [`lock`](Self::lock) with a timeout.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn try_lock_for(&self, count: usize, timeout: Duration) -> Option<SemaphoreLock<'_>> {
        self.try_lock_until(count, Deadline::from_duration(timeout)).await
    }

    /// [`lock`](Self::lock) with a deadline.
    ///
    /// # Panics
    ///
    /// Panics if `count` exceeds the capacity.
    pub async fn try_lock_until(&self, count: usize, deadline: Deadline) -> Option<SemaphoreLock<'_>> {
        self.try_acquire_until(count, deadline)
            .await
            .then(|| SemaphoreLock::new(self, count))
    }
}

impl Default for Semaphore {
    fn default() -> Self {
        Self::new(1)
    }
}

/// Tokens held from a semaphore; released on drop.
#[derive(Debug)]
#[must_use = "the tokens are released as soon as the lock is dropped"]
pub struct SemaphoreLock<'a> {
    semaphore: &'a Semaphore,
    count: usize,
    owns: bool,
}

impl<'a> SemaphoreLock<'a> {
    const fn new(semaphore: &'a Semaphore, count: usize) -> Self {
        Self {
            semaphore,
            count,
            owns: true,
        }
    }

    /// Number of tokens this guard holds.
    #[must_use]
    pub const fn count(&self) -> usize {
        self.count
    }

    /// Returns `true` while the guard still holds its tokens.
    #[must_use]
    pub const fn owns_lock(&self) -> bool {
        self.owns
    }

    /// Releases the tokens early.
    pub fn unlock(&mut self) {
        if std::mem::replace(&mut self.owns, false) {
            self.semaphore.release(self.count);
        }
    }

    /// Detaches the guard without releasing; the caller must call
    /// [`Semaphore::release`] later.
    pub fn forget(mut self) -> usize {
        self.owns = false;
        self.count
    }
}

impl Drop for SemaphoreLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}

/// Semaphore whose waits end when the waiting task is cancelled.
#[derive(Debug, Default)]
pub struct CancellableSemaphore {
    inner: Semaphore,
}

impl CancellableSemaphore {
    /// Creates a semaphore with `capacity` tokens.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` does not fit in an `i64`.
    #[must_use]
    pub const fn new(capacity: usize) -> Self {
        Self {
            inner: Semaphore::new(capacity),
        }
    }

    /// Maximum number of tokens.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.inner.capacity()
    }

    /// Tokens currently available, clamped at zero. Racy.
    #[must_use]
    pub fn remaining_approx(&self) -> usize {
        self.inner.remaining_approx()
    }

    /// Changes the capacity.
    pub fn set_capacity(&self, capacity: usize) {
        self.inner.set_capacity(capacity);
    }

    fn check_reachable(&self, count: usize) -> Result<(), SemaphoreError> {
        let capacity = self.inner.capacity();
        if count > capacity {
            return Err(SemaphoreError::Unreachable {
                requested: count,
                capacity,
            });
        }
        Ok(())
    }

    /// Takes `count` tokens without waiting. `false` also when `count`
    /// exceeds the capacity.
    #[must_use]
    pub fn try_acquire(&self, count: usize) -> bool {
        self.check_reachable(count).is_ok() && self.inner.try_acquire_fast(tokens(count))
    }

    /// Takes `count` tokens, parking the task until they are available.
    ///
    /// # Errors
    ///
    /// - [`SemaphoreError::Cancelled`] when the task is cancelled first
    /// - [`SemaphoreError::Unreachable`] when `count` exceeds the capacity
    pub async fn acquire(&self, count: usize) -> Result<(), SemaphoreError> {
        self.check_reachable(count)?;
        if self.inner.try_acquire_fast(tokens(count)) {
            return Ok(());
        }
        match self.inner.acquire_slow(count, Deadline::unreachable(), true).await {
            None => Ok(()),
            Some(_) => Err(SemaphoreError::Cancelled),
        }
    }

    /// Gives up at `deadline` or on cancellation.
    pub async fn try_acquire_until(&self, count: usize, deadline: Deadline) -> bool {
        if self.check_reachable(count).is_err() {
            return false;
        }
        if self.inner.try_acquire_fast(tokens(count)) {
            return true;
        }
        self.inner.acquire_slow(count, deadline, true).await.is_none()
    }

    /// Gives up after `timeout` or on cancellation.
    pub async fn try_acquire_for(&self, count: usize, timeout: Duration) -> bool {
        self.try_acquire_until(count, Deadline::from_duration(timeout)).await
    }

    /// Returns `count` tokens.
    pub fn release(&self, count: usize) {
        self.inner.release(count);
    }

    /// Acquires `count` tokens and returns a guard releasing them on drop.
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub async fn lock(&self, count: usize) -> Result<SemaphoreLock<'_>, SemaphoreError> {
        self.acquire(count).await?;
        Ok(SemaphoreLock::new(&self.inner, count))
    }
}
