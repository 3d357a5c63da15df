//! Bounded multi-producer single-consumer queue for tasks.
//!
//! Items travel through a lock-free [`SegQueue`]; producers park on
//! `nonfull` when the queue is at its length limit and the consumer parks
//! on `nonempty` when it is empty. The length limit is soft: concurrent
//! producers may overrun it by a few items.
//!
//! Each side notices the other going away. Pushes fail once the consumer
//! is dropped, and [`Consumer::pop`] returns `None` once every producer is
//! dropped and the queue is drained.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

struct Channel<T> {
    queue: SegQueue<T>,
    size: AtomicUsize,
    max_len: AtomicUsize,
    producers: AtomicUsize,
    consumer_alive: AtomicBool,
    nonempty: WaitQueue,
    nonfull: WaitQueue,
}

impl<T> Channel<T> {
    fn has_room(&self, limit: Option<usize>) -> bool {
        let limit = limit.unwrap_or_else(|| self.max_len.load(Ordering::Acquire));
        self.size.load(Ordering::Acquire) < limit
    }

    fn consumer_alive(&self) -> bool {
        self.consumer_alive.load(Ordering::Acquire)
    }

    fn producers_alive(&self) -> bool {
        self.producers.load(Ordering::Acquire) > 0
    }

    fn do_push(&self, value: T) {
        self.size.fetch_add(1, Ordering::AcqRel);
        self.queue.push(value);
        self.nonempty.wake_one();
    }

    fn do_pop(&self) -> Option<T> {
        let value = self.queue.pop()?;
        self.size.fetch_sub(1, Ordering::AcqRel);
        self.nonfull.wake_one();
        Some(value)
    }
}

/// Creates a queue holding at most `max_len` items.
///
/// ```
/// use prometheus_engine::config::RuntimeConfig;
/// use prometheus_engine::core::Deadline;
/// use prometheus_engine::runtime::Runtime;
/// use prometheus_engine::sync::mpsc;
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap();
/// let (producer, consumer) = mpsc::channel(4);
/// let received = runtime.block_on(async move {
///     let sender = prometheus_engine::spawn(async move {
///         for i in 0..10 {
///             producer.push(i, Deadline::unreachable()).await.unwrap();
///         }
///     });
///     let mut received = Vec::new();
///     while let Some(value) = consumer.pop(Deadline::unreachable()).await {
///         received.push(value);
///     }
///     sender.get().await.unwrap();
///     received
/// });
/// assert_eq!(received, (0..10).collect::<Vec<_>>());
/// ```
#[must_use]
pub fn channel<T>(max_len: usize) -> (Producer<T>, Consumer<T>) {
    let channel = Arc::new(Channel {
        queue: SegQueue::new(),
        size: AtomicUsize::new(0),
        max_len: AtomicUsize::new(max_len),
        producers: AtomicUsize::new(1),
        consumer_alive: AtomicBool::new(true),
        nonempty: WaitQueue::new(),
        nonfull: WaitQueue::new(),
    });
    (
        Producer {
            channel: Arc::clone(&channel),
        },
        Consumer { channel },
    )
}

/// Sending side. Clone it to add producers.
pub struct Producer<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Producer<T> {
    /// Pushes `value`, parking while the queue is full. Gives the value
    /// back if the consumer is gone, the deadline passes, or the task is
    /// cancelled.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when the push did not happen.
    pub async fn push(&self, value: T, deadline: Deadline) -> Result<(), T> {
        self.push_limited(value, None, deadline).await
    }

    /// [`push`](Self::push) measured against `max_len` instead of the
    /// queue's own limit.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` when the push did not happen.
    pub async fn push_with_limit_override(&self, value: T, max_len: usize, deadline: Deadline) -> Result<(), T> {
        self.push_limited(value, Some(max_len), deadline).await
    }

    async fn push_limited(&self, value: T, limit: Option<usize>, deadline: Deadline) -> Result<(), T> {
        let channel = &*self.channel;
        loop {
            if !channel.consumer_alive() {
                return Err(value);
            }
            if channel.has_room(limit) {
                channel.do_push(value);
                return Ok(());
            }
            let source = channel
                .nonfull
                .wait_until(
                    || channel.has_room(limit) || !channel.consumer_alive(),
                    deadline,
                    true,
                )
                .await;
            if source != WakeupSource::WaitList {
                if channel.consumer_alive() && channel.has_room(limit) {
                    channel.do_push(value);
                    return Ok(());
                }
                return Err(value);
            }
        }
    }

    /// Pushes without waiting.
    ///
    /// # Errors
    ///
    /// Returns `Err(value)` if the queue is full or the consumer is gone.
    pub fn push_noblock(&self, value: T) -> Result<(), T> {
        if !self.channel.consumer_alive() || !self.channel.has_room(None) {
            return Err(value);
        }
        self.channel.do_push(value);
        Ok(())
    }

    /// Returns `true` while the consumer exists.
    #[must_use]
    pub fn is_consumer_alive(&self) -> bool {
        self.channel.consumer_alive()
    }

    /// Items queued right now. Racy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channel.size.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing is queued. Racy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current length limit.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.channel.max_len.load(Ordering::Acquire)
    }
}

impl<T> Clone for Producer<T> {
    fn clone(&self) -> Self {
        self.channel.producers.fetch_add(1, Ordering::AcqRel);
        Self {
            channel: Arc::clone(&self.channel),
        }
    }
}

impl<T> Drop for Producer<T> {
    fn drop(&mut self) {
        if self.channel.producers.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.channel.nonempty.wake_all();
        }
    }
}

impl<T> fmt::Debug for Producer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer")
            .field("len", &self.len())
            .field("max_len", &self.max_len())
            .finish()
    }
}

/// Receiving side.
pub struct Consumer<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Consumer<T> {
    /// Pops the oldest item, parking while the queue is empty.
    ///
    /// Returns `None` when every producer is gone and the queue is drained,
    /// or when the deadline passes or the task is cancelled with nothing
    /// queued.
    pub async fn pop(&self, deadline: Deadline) -> Option<T> {
        let channel = &*self.channel;
        loop {
            if let Some(value) = channel.do_pop() {
                return Some(value);
            }
            if !channel.producers_alive() {
                return channel.do_pop();
            }
            let source = channel
                .nonempty
                .wait_until(
                    || !channel.queue.is_empty() || !channel.producers_alive(),
                    deadline,
                    true,
                )
                .await;
            if source != WakeupSource::WaitList {
                return channel.do_pop();
            }
        }
    }

    /// Pops without waiting.
    #[must_use]
    pub fn pop_noblock(&self) -> Option<T> {
        self.channel.do_pop()
    }

    /// Changes the length limit. Producers parked on the old limit re-check.
    pub fn set_max_len(&self, max_len: usize) {
        self.channel.max_len.store(max_len, Ordering::Release);
        self.channel.nonfull.wake_all();
    }

    /// Current length limit.
    #[must_use]
    pub fn max_len(&self) -> usize {
        self.channel.max_len.load(Ordering::Acquire)
    }

    /// Items queued right now. Racy.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channel.size.load(Ordering::Acquire)
    }

    /// Returns `true` if nothing is queued. Racy.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` while at least one producer exists.
    #[must_use]
    pub fn has_producers(&self) -> bool {
        self.channel.producers_alive()
    }
}

impl<T> Drop for Consumer<T> {
    fn drop(&mut self) {
        self.channel.consumer_alive.store(false, Ordering::Release);
        self.channel.nonfull.wake_all();
    }
}

impl<T> fmt::Debug for Consumer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Consumer")
            .field("len", &self.len())
            .field("max_len", &self.max_len())
            .finish()
    }
}
