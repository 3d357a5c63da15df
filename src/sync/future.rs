//! One-shot value handoff between tasks.
//!
//! A [`Promise`] is satisfied exactly once, with a value or an error; its
//! paired [`Future`] can be waited on any number of times and consumed once
//! with [`Future::get`]. Waiting parks the task instead of blocking the
//! worker thread.

use std::mem;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::error::FutureError;
use crate::core::task::WakeupSource;

/// Outcome of a non-consuming wait on a [`Future`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FutureStatus {
    /// The promise is satisfied (with a value, an error, or broken).
    Ready,
    /// The deadline passed first.
    Timeout,
    /// The waiting task was cancelled first.
    Cancelled,
}

enum Slot<T> {
    Empty,
    Value(T),
    Error(FutureError),
    Taken,
}

struct SharedState<T> {
    slot: Mutex<Slot<T>>,
    ready: AtomicBool,
    future_retrieved: AtomicBool,
    waiters: WaitQueue,
}

impl<T> SharedState<T> {
    fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
            ready: AtomicBool::new(false),
            future_retrieved: AtomicBool::new(false),
            waiters: WaitQueue::new(),
        }
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    async fn wait_ready(&self, deadline: Deadline) -> FutureStatus {
        loop {
            if self.is_ready() {
                return FutureStatus::Ready;
            }
            let source = self.waiters.wait_until(|| self.is_ready(), deadline, true).await;
            if self.is_ready() {
                return FutureStatus::Ready;
            }
            match source {
                WakeupSource::WaitList => {}
                WakeupSource::DeadlineTimer => return FutureStatus::Timeout,
                WakeupSource::CancelRequest => return FutureStatus::Cancelled,
            }
        }
    }

    fn satisfy(&self, slot: Slot<T>) -> Result<(), FutureError> {
        {
            let mut guard = self.slot.lock();
            if self.is_ready() {
                return Err(FutureError::PromiseAlreadySatisfied);
            }
            *guard = slot;
            self.ready.store(true, Ordering::Release);
        }
        self.waiters.wake_all();
        Ok(())
    }
}

/// Producer side of a one-shot channel.
///
/// Dropping an unsatisfied promise breaks it: the future then reports
/// [`FutureError::BrokenPromise`].
pub struct Promise<T> {
    state: Arc<SharedState<T>>,
}

impl<T> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Promise<T> {
    /// Creates an unsatisfied promise.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(SharedState::new()),
        }
    }

    /// Creates a promise together with its future.
    pub(crate) fn pair() -> (Self, Future<T>) {
        let promise = Self::new();
        promise.state.future_retrieved.store(true, Ordering::Release);
        let future = Future {
            state: Some(Arc::clone(&promise.state)),
        };
        (promise, future)
    }

    /// Returns the future paired with this promise.
    ///
    /// # Errors
    ///
    /// [`FutureError::AlreadyRetrieved`] on every call after the first.
    pub fn get_future(&self) -> Result<Future<T>, FutureError> {
        if self.state.future_retrieved.swap(true, Ordering::AcqRel) {
            return Err(FutureError::AlreadyRetrieved);
        }
        Ok(Future {
            state: Some(Arc::clone(&self.state)),
        })
    }

    /// Stores `value` and wakes every waiter.
    ///
    /// # Errors
    ///
    /// [`FutureError::PromiseAlreadySatisfied`] if a value or error was
    /// already stored.
    pub fn set_value(&self, value: T) -> Result<(), FutureError> {
        self.state.satisfy(Slot::Value(value))
    }

    /// Stores an application error that [`Future::get`] will return.
    ///
    /// # Errors
    ///
    /// [`FutureError::PromiseAlreadySatisfied`] if a value or error was
    /// already stored.
    pub fn set_exception(&self, error: anyhow::Error) -> Result<(), FutureError> {
        self.state.satisfy(Slot::Error(FutureError::Exception(error)))
    }

    /// Returns `true` once a value or error is stored.
    #[must_use]
    pub fn is_satisfied(&self) -> bool {
        self.state.is_ready()
    }
}

impl<T> Drop for Promise<T> {
    fn drop(&mut self) {
        if !self.state.is_ready() {
            let _ = self.state.satisfy(Slot::Error(FutureError::BrokenPromise));
        }
    }
}

impl<T> std::fmt::Debug for Promise<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Promise")
            .field("satisfied", &self.is_satisfied())
            .finish()
    }
}

/// Consumer side of a one-shot channel.
pub struct Future<T> {
    state: Option<Arc<SharedState<T>>>,
}

impl<T> Future<T> {
    /// Returns `false` once the value has been consumed by [`get`](Self::get).
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        self.state.is_some()
    }

    /// Returns `true` when a value, error, or broken promise is stored.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.as_ref().is_some_and(|state| state.is_ready())
    }

    /// Waits for the promise to be satisfied. Cancellable.
    ///
    /// # Panics
    ///
    /// Panics if the future is no longer valid.
    pub async fn wait(&self) -> FutureStatus {
        self.wait_until(Deadline::unreachable()).await
    }

    /// Waits at most `timeout`. Cancellable.
    ///
    /// # Panics
    ///
    /// Panics if the future is no longer valid.
    pub async fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.wait_until(Deadline::from_duration(timeout)).await
    }

    /// Waits until `deadline`. Cancellable. Never consumes the value.
    ///
    /// # Panics
    ///
    /// Panics if the future is no longer valid.
    pub async fn wait_until(&self, deadline: Deadline) -> FutureStatus {
        let Some(state) = self.state.as_ref() else {
            panic!("wait on a future whose value was already retrieved");
        };
        state.wait_ready(deadline).await
    }

    /// Waits for the promise and consumes its result.
    ///
    /// # Errors
    ///
    /// - [`FutureError::AlreadyRetrieved`] when called a second time
    /// - [`FutureError::WaitInterrupted`] when the waiting task is cancelled;
    ///   the future stays valid in that case
    /// - [`FutureError::BrokenPromise`] when the promise was dropped unsatisfied
    /// - [`FutureError::Exception`] with the error passed to `set_exception`
    pub async fn get(&mut self) -> Result<T, FutureError> {
        let Some(state) = self.state.clone() else {
            return Err(FutureError::AlreadyRetrieved);
        };
        if self.wait().await != FutureStatus::Ready {
            return Err(FutureError::WaitInterrupted);
        }
        self.state = None;
        let slot = mem::replace(&mut *state.slot.lock(), Slot::Taken);
        match slot {
            Slot::Value(value) => Ok(value),
            Slot::Error(error) => Err(error),
            Slot::Empty | Slot::Taken => Err(FutureError::AlreadyRetrieved),
        }
    }
}

impl<T> Future<T> {
    /// Turns this future into one that many holders can read.
    ///
    /// # Panics
    ///
    /// Panics if the future is no longer valid.
    #[must_use]
    pub fn share(mut self) -> SharedFuture<T> {
        let Some(state) = self.state.take() else {
            panic!("share on a future whose value was already retrieved");
        };
        SharedFuture { state }
    }

    pub(crate) fn wait_queue(&self) -> &WaitQueue {
        let Some(state) = self.state.as_ref() else {
            panic!("wait on a future whose value was already retrieved");
        };
        &state.waiters
    }
}

impl<T> std::fmt::Debug for Future<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Future")
            .field("valid", &self.is_valid())
            .field("ready", &self.is_ready())
            .finish()
    }
}

/// Read side of a promise shared by many holders. Every clone observes the
/// same result; [`get`](Self::get) hands out copies and never consumes it.
pub struct SharedFuture<T> {
    state: Arc<SharedState<T>>,
}

impl<T> Clone for SharedFuture<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<T> SharedFuture<T> {
    /// Returns `true` when a value, error, or broken promise is stored.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.is_ready()
    }

    /// Waits for the promise to be satisfied. Cancellable.
    pub async fn wait(&self) -> FutureStatus {
        self.state.wait_ready(Deadline::unreachable()).await
    }

    /// Waits at most `timeout`. Cancellable.
    pub async fn wait_for(&self, timeout: Duration) -> FutureStatus {
        self.state.wait_ready(Deadline::from_duration(timeout)).await
    }

    /// Waits until `deadline`. Cancellable.
    pub async fn wait_until(&self, deadline: Deadline) -> FutureStatus {
        self.state.wait_ready(deadline).await
    }

    /// Waits for the promise and returns a copy of its result.
    ///
    /// # Errors
    ///
    /// - [`FutureError::WaitInterrupted`] when the waiting task is cancelled
    /// - [`FutureError::BrokenPromise`] when the promise was dropped unsatisfied
    /// - [`FutureError::Exception`] carrying the message of the stored error
    pub async fn get(&self) -> Result<T, FutureError>
    where
        T: Clone,
    {
        if self.wait().await != FutureStatus::Ready {
            return Err(FutureError::WaitInterrupted);
        }
        match &*self.state.slot.lock() {
            Slot::Value(value) => Ok(value.clone()),
            Slot::Error(error) => Err(error.duplicate()),
            Slot::Empty | Slot::Taken => Err(FutureError::AlreadyRetrieved),
        }
    }

    pub(crate) fn wait_queue(&self) -> &WaitQueue {
        &self.state.waiters
    }
}

impl<T> std::fmt::Debug for SharedFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedFuture")
            .field("ready", &self.is_ready())
            .finish()
    }
}
