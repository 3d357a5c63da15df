//! Queue of tasks parked on one condition.
//!
//! Waiters live in an index-addressed arena threaded into a doubly linked
//! list; a waiter is identified by a [`WaitKey`] (slot index plus a
//! generation), so a stale key can never remove or observe a reused slot.
//!
//! Lost-wakeup protocol: a waiter evaluates its readiness predicate while
//! holding the queue lock and only then links itself in. A notifier must
//! change the condition first and call [`WaitQueue::wake_one`] or
//! [`WaitQueue::wake_all`] afterwards.

use std::sync::atomic::{fence, AtomicUsize, Ordering};
use std::task::Waker;

use parking_lot::Mutex;

use crate::core::deadline::Deadline;
use crate::core::task::wait::{wait_with, Wait, WaitStrategy};

/// Identifies one registered waiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WaitKey {
    index: usize,
    generation: u64,
}

#[derive(Debug)]
struct Node {
    waker: Option<Waker>,
    prev: Option<usize>,
    next: Option<usize>,
    generation: u64,
    linked: bool,
}

#[derive(Debug)]
struct Waiters {
    nodes: Vec<Node>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    generation: u64,
}

impl Waiters {
    const fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            head: None,
            tail: None,
            generation: 0,
        }
    }

    fn push_back(&mut self, waker: Waker) -> WaitKey {
        self.generation += 1;
        let node = Node {
            waker: Some(waker),
            prev: self.tail,
            next: None,
            generation: self.generation,
            linked: true,
        };
        let index = if let Some(index) = self.free.pop() {
            self.nodes[index] = node;
            index
        } else {
            self.nodes.push(node);
            self.nodes.len() - 1
        };
        match self.tail {
            Some(tail) => self.nodes[tail].next = Some(index),
            None => self.head = Some(index),
        }
        self.tail = Some(index);
        WaitKey {
            index,
            generation: self.generation,
        }
    }

    fn is_linked(&self, key: WaitKey) -> bool {
        self.nodes
            .get(key.index)
            .is_some_and(|node| node.linked && node.generation == key.generation)
    }

    fn unlink(&mut self, index: usize) -> Option<Waker> {
        let (prev, next) = {
            let node = &self.nodes[index];
            (node.prev, node.next)
        };
        match prev {
            Some(prev) => self.nodes[prev].next = next,
            None => self.head = next,
        }
        match next {
            Some(next) => self.nodes[next].prev = prev,
            None => self.tail = prev,
        }
        self.free.push(index);
        let node = &mut self.nodes[index];
        node.linked = false;
        node.prev = None;
        node.next = None;
        node.waker.take()
    }

    fn remove(&mut self, key: WaitKey) -> bool {
        if !self.is_linked(key) {
            return false;
        }
        self.unlink(key.index);
        true
    }

    fn pop_front(&mut self) -> Option<Waker> {
        let head = self.head?;
        self.unlink(head)
    }

    fn update(&mut self, key: WaitKey, waker: &Waker) {
        if self.is_linked(key) {
            self.nodes[key.index].waker = Some(waker.clone());
        }
    }
}

/// Tasks blocked on a single condition.
///
/// `WaitQueue` is the building block of every primitive in this module. It
/// can also be used directly:
///
/// ```
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
/// use prometheus_engine::config::RuntimeConfig;
/// use prometheus_engine::core::{Deadline, WakeupSource};
/// use prometheus_engine::runtime::Runtime;
/// use prometheus_engine::sync::WaitQueue;
///
/// let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(2)).unwrap();
/// let flag = Arc::new(AtomicBool::new(false));
/// let queue = Arc::new(WaitQueue::new());
///
/// let source = runtime.block_on({
///     let (flag, queue) = (Arc::clone(&flag), Arc::clone(&queue));
///     async move {
///         let setter = prometheus_engine::spawn({
///             let (flag, queue) = (Arc::clone(&flag), Arc::clone(&queue));
///             async move {
///                 flag.store(true, Ordering::SeqCst);
///                 queue.wake_all();
///             }
///         });
///         let source = queue
///             .wait_until(|| flag.load(Ordering::SeqCst), Deadline::unreachable(), true)
///             .await;
///         setter.detach();
///         source
///     }
/// });
/// assert_eq!(source, WakeupSource::WaitList);
/// ```
#[derive(Debug)]
pub struct WaitQueue {
    waiters: Mutex<Waiters>,
    len: AtomicUsize,
}

impl Default for WaitQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitQueue {
    /// Creates an empty queue.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            waiters: Mutex::new(Waiters::new()),
            len: AtomicUsize::new(0),
        }
    }

    /// Number of parked waiters. Racy; for diagnostics and fast paths only.
    #[must_use]
    pub fn len_approx(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Wakes the longest-waiting task. Returns `false` if nobody was parked.
    pub fn wake_one(&self) -> bool {
        fence(Ordering::SeqCst);
        if self.len.load(Ordering::Relaxed) == 0 {
            return false;
        }
        let waker = {
            let mut waiters = self.waiters.lock();
            let waker = waiters.pop_front();
            if waker.is_some() {
                self.len.fetch_sub(1, Ordering::Relaxed);
            }
            waker
        };
        waker.map(Waker::wake).is_some()
    }

    /// Wakes every parked task. Returns how many were woken.
    pub fn wake_all(&self) -> usize {
        fence(Ordering::SeqCst);
        if self.len.load(Ordering::Relaxed) == 0 {
            return 0;
        }
        let wakers: Vec<Waker> = {
            let mut waiters = self.waiters.lock();
            let mut wakers = Vec::with_capacity(self.len.load(Ordering::Relaxed));
            while let Some(waker) = waiters.pop_front() {
                wakers.push(waker);
            }
            self.len.fetch_sub(wakers.len(), Ordering::Relaxed);
            wakers
        };
        let woken = wakers.len();
        wakers.into_iter().for_each(Waker::wake);
        woken
    }

    /// Parks the current task until `ready` holds, the deadline passes, or
    /// (when `cancellable`) the task is cancelled.
    ///
    /// `ready` is evaluated under the queue lock before the task parks, and
    /// is not re-evaluated afterwards: a [`WakeupSource::WaitList`] result
    /// means the condition held at registration or a notifier woke the task,
    /// so callers re-check their state in a loop.
    ///
    /// [`WakeupSource::WaitList`]: crate::core::WakeupSource::WaitList
    pub fn wait_until<F>(&self, ready: F, deadline: Deadline, cancellable: bool) -> Wait<QueueWaiter<'_, F>>
    where
        F: FnMut() -> bool + Unpin,
    {
        wait_with(
            QueueWaiter {
                queue: self,
                ready,
                key: None,
            },
            deadline,
            cancellable,
        )
    }

    pub(crate) fn register(&self, ready: &mut impl FnMut() -> bool, waker: &Waker) -> Option<WaitKey> {
        let mut waiters = self.waiters.lock();
        self.len.fetch_add(1, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        if ready() {
            self.len.fetch_sub(1, Ordering::Relaxed);
            return None;
        }
        Some(waiters.push_back(waker.clone()))
    }

    pub(crate) fn remove(&self, key: WaitKey) -> bool {
        let removed = self.waiters.lock().remove(key);
        if removed {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        removed
    }

    pub(crate) fn is_linked(&self, key: WaitKey) -> bool {
        self.waiters.lock().is_linked(key)
    }

    pub(crate) fn update(&self, key: WaitKey, waker: &Waker) {
        self.waiters.lock().update(key, waker);
    }
}

/// [`WaitStrategy`] parking a task on a [`WaitQueue`].
#[derive(Debug)]
pub struct QueueWaiter<'a, F> {
    queue: &'a WaitQueue,
    ready: F,
    key: Option<WaitKey>,
}

impl<F: FnMut() -> bool> WaitStrategy for QueueWaiter<'_, F> {
    fn setup_wakeups(&mut self, waker: &Waker) -> bool {
        self.key = self.queue.register(&mut self.ready, waker);
        self.key.is_some()
    }

    fn is_notified(&self) -> bool {
        self.key.is_some_and(|key| !self.queue.is_linked(key))
    }

    fn disable_wakeups(&mut self) -> bool {
        self.key.take().is_some_and(|key| !self.queue.remove(key))
    }

    fn refresh_waker(&mut self, waker: &Waker) {
        if let Some(key) = self.key {
            self.queue.update(key, waker);
        }
    }

    fn forward_wakeup(&mut self) {
        self.queue.wake_one();
    }
}
