//! Waiting for the first of several futures or tasks to finish.
//!
//! The waiting task registers on the wait queue of every target at once and
//! wakes as soon as any of them becomes ready.

use std::task::Waker;
use std::time::Duration;

use super::future::{Future, SharedFuture};
use super::wait_queue::{WaitKey, WaitQueue};
use crate::core::deadline::Deadline;
use crate::core::task::{wait_with, WaitStrategy, WakeupSource};

/// A result that becomes ready once and announces it on a [`WaitQueue`].
///
/// Implementors must make [`is_ready`](Self::is_ready) return `true` before
/// they wake the queue.
pub trait Waitable: Sync {
    /// Returns `true` once the awaited result is available.
    fn is_ready(&self) -> bool;

    /// Queue woken when the result becomes available.
    fn wait_queue(&self) -> &WaitQueue;
}

impl<T: Send> Waitable for Future<T> {
    fn is_ready(&self) -> bool {
        Self::is_ready(self)
    }

    fn wait_queue(&self) -> &WaitQueue {
        Self::wait_queue(self)
    }
}

impl<T: Send> Waitable for SharedFuture<T> {
    fn is_ready(&self) -> bool {
        Self::is_ready(self)
    }

    fn wait_queue(&self) -> &WaitQueue {
        Self::wait_queue(self)
    }
}

struct AnyWaiter<'a> {
    targets: &'a [&'a dyn Waitable],
    keys: Vec<Option<WaitKey>>,
    consumed: Vec<usize>,
}

impl<'a> AnyWaiter<'a> {
    fn new(targets: &'a [&'a dyn Waitable]) -> Self {
        Self {
            targets,
            keys: Vec::with_capacity(targets.len()),
            consumed: Vec::new(),
        }
    }

    /// Removes every registration. Returns `true` if any of them had
    /// already been woken.
    fn unregister(&mut self) -> bool {
        self.consumed.clear();
        for (index, key) in self.keys.drain(..).enumerate() {
            if let Some(key) = key {
                if !self.targets[index].wait_queue().remove(key) {
                    self.consumed.push(index);
                }
            }
        }
        !self.consumed.is_empty()
    }
}

impl WaitStrategy for AnyWaiter<'_> {
    fn setup_wakeups(&mut self, waker: &Waker) -> bool {
        let targets = self.targets;
        for target in targets {
            if let Some(key) = target.wait_queue().register(&mut || target.is_ready(), waker) {
                self.keys.push(Some(key));
                continue;
            }
            if self.unregister() {
                self.forward_wakeup();
            }
            return false;
        }
        true
    }

    fn is_notified(&self) -> bool {
        self.keys.iter().enumerate().any(|(index, key)| {
            key.is_some_and(|key| !self.targets[index].wait_queue().is_linked(key))
        })
    }

    fn disable_wakeups(&mut self) -> bool {
        self.unregister()
    }

    fn refresh_waker(&mut self, waker: &Waker) {
        for (index, key) in self.keys.iter().enumerate() {
            if let Some(key) = key {
                self.targets[index].wait_queue().update(*key, waker);
            }
        }
    }

    fn forward_wakeup(&mut self) {
        for index in self.consumed.drain(..) {
            self.targets[index].wait_queue().wake_one();
        }
    }
}

fn first_ready(targets: &[&dyn Waitable]) -> Option<usize> {
    targets.iter().position(|target| target.is_ready())
}

/// Waits until one of `targets` is ready and returns its index. Returns
/// `None` for an empty slice or when the waiting task is cancelled.
///
/// ```
/// use prometheus_engine::config::RuntimeConfig;
/// use prometheus_engine::runtime::Runtime;
/// use prometheus_engine::sync::{wait_any, Waitable};
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap();
/// let first = runtime.block_on(async {
///     let slow = prometheus_engine::spawn(async {
///         prometheus_engine::current_task::interruptible_sleep_for(std::time::Duration::from_secs(5)).await;
///     });
///     let fast = prometheus_engine::spawn(async {});
///     let first = wait_any(&[&slow as &dyn Waitable, &fast]).await;
///     slow.request_cancel();
///     first
/// });
/// assert_eq!(first, Some(1));
/// ```
pub async fn wait_any(targets: &[&dyn Waitable]) -> Option<usize> {
    wait_any_until(targets, Deadline::unreachable()).await
}

/// Like [`wait_any`], giving up after `timeout`.
pub async fn wait_any_for(targets: &[&dyn Waitable], timeout: Duration) -> Option<usize> {
    wait_any_until(targets, Deadline::from_duration(timeout)).await
}

/// Like [`wait_any`], giving up once `deadline` passes.
pub async fn wait_any_until(targets: &[&dyn Waitable], deadline: Deadline) -> Option<usize> {
    loop {
        if let Some(index) = first_ready(targets) {
            return Some(index);
        }
        if targets.is_empty() {
            return None;
        }
        let source = wait_with(AnyWaiter::new(targets), deadline, true).await;
        if let Some(index) = first_ready(targets) {
            return Some(index);
        }
        if source != WakeupSource::WaitList {
            return None;
        }
    }
}
