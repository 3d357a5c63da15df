//! One-shot signal between any number of senders and a single waiting task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

/// Event that one task waits for and any task can send.
///
/// By default a successful wait consumes the signal, so the next wait blocks
/// until the event is sent again. [`SingleConsumerEvent::without_auto_reset`]
/// keeps the signal until [`reset`](SingleConsumerEvent::reset).
///
/// Waits are cancellable. Only one task may wait at a time.
#[derive(Debug)]
pub struct SingleConsumerEvent {
    signal: AtomicBool,
    auto_reset: bool,
    waiters: WaitQueue,
}

impl Default for SingleConsumerEvent {
    fn default() -> Self {
        Self::new()
    }
}

impl SingleConsumerEvent {
    /// Creates an unsignaled event that resets on every successful wait.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            signal: AtomicBool::new(false),
            auto_reset: true,
            waiters: WaitQueue::new(),
        }
    }

    /// Creates an unsignaled event that stays signaled until reset.
    #[must_use]
    pub const fn without_auto_reset() -> Self {
        Self {
            signal: AtomicBool::new(false),
            auto_reset: false,
            waiters: WaitQueue::new(),
        }
    }

    /// Signals the event and wakes the waiter, if any.
    pub fn send(&self) {
        self.signal.store(true, Ordering::Release);
        self.waiters.wake_one();
    }

    /// Clears the signal.
    pub fn reset(&self) {
        self.signal.store(false, Ordering::Release);
    }

    /// Returns `true` while the event is signaled.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.signal.load(Ordering::Acquire)
    }

    fn try_consume(&self) -> bool {
        if self.auto_reset {
            self.signal.swap(false, Ordering::AcqRel)
        } else {
            self.is_ready()
        }
    }

    /// Waits for the event. Returns `false` if the task was cancelled first.
    pub async fn wait(&self) -> bool {
        self.wait_until(Deadline::unreachable()).await
    }

    /// Waits at most `timeout`. Returns `false` on timeout or cancellation.
    pub async fn wait_for(&self, timeout: Duration) -> bool {
        self.wait_until(Deadline::from_duration(timeout)).await
    }

    /// Waits until `deadline`. Returns `false` on timeout or cancellation.
    pub async fn wait_until(&self, deadline: Deadline) -> bool {
        loop {
            if self.try_consume() {
                return true;
            }
            let source = self
                .waiters
                .wait_until(|| self.is_ready(), deadline, true)
                .await;
            if self.try_consume() {
                return true;
            }
            if source != WakeupSource::WaitList {
                return false;
            }
        }
    }
}
