//! Fixed-capacity per-worker ring of ready task keys.
//!
//! The owning worker pushes at the tail and pops at the head; other workers
//! only steal from the head. `head` and `tail` grow monotonically (wrapping),
//! so a claim is a single compare-and-swap on `head` that fails if anybody
//! else moved it in between. Only the owner writes `tail` and the slots.

use std::iter;
use std::sync::atomic::{AtomicUsize, Ordering};

use crossbeam_utils::CachePadded;

use super::global_queue::GlobalQueue;

#[derive(Debug)]
pub(crate) struct LocalQueue {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    slots: Box<[AtomicUsize]>,
    mask: usize,
}

impl LocalQueue {
    /// `capacity` must be a power of two.
    pub(crate) fn new(capacity: usize) -> Self {
        debug_assert!(capacity.is_power_of_two(), "local queue capacity must be a power of two");
        Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            slots: (0..capacity).map(|_| AtomicUsize::new(0)).collect(),
            mask: capacity - 1,
        }
    }

    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn len(&self) -> usize {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        tail.wrapping_sub(head).min(self.capacity())
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Free slots as seen by the owner.
    pub(crate) fn remaining(&self) -> usize {
        self.capacity() - self.len()
    }

    /// Owner only. When the ring is full, half of it plus `key` moves to
    /// `overflow` in one batch. Returns `true` in that case.
    pub(crate) fn push(&self, key: usize, overflow: &GlobalQueue) -> bool {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Relaxed);
            if tail.wrapping_sub(head) < self.capacity() {
                self.slots[tail & self.mask].store(key, Ordering::Release);
                self.tail.store(tail.wrapping_add(1), Ordering::Release);
                return false;
            }
            let half = self.capacity() / 2;
            if self
                .head
                .compare_exchange(head, head.wrapping_add(half), Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                // A stealer made room; retry the fast path.
                continue;
            }
            let batch: Vec<usize> = (0..half)
                .map(|i| self.slots[head.wrapping_add(i) & self.mask].load(Ordering::Acquire))
                .collect();
            overflow.push_batch(batch.into_iter().chain(iter::once(key)));
            return true;
        }
    }

    /// Owner only.
    pub(crate) fn pop(&self) -> Option<usize> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Relaxed);
            if head == tail {
                return None;
            }
            let key = self.slots[head & self.mask].load(Ordering::Acquire);
            if self
                .head
                .compare_exchange_weak(head, head.wrapping_add(1), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Some(key);
            }
        }
    }

    /// Moves up to `max` keys (at most half of what is queued, rounded up)
    /// from this ring. The first stolen key is returned, the rest go to
    /// `dst`, which must be owned by the caller.
    pub(crate) fn steal_into(&self, dst: &Self, max: usize, overflow: &GlobalQueue) -> Option<usize> {
        let mut batch = Vec::with_capacity(max.max(1));
        loop {
            let head = self.head.load(Ordering::Acquire);
            let tail = self.tail.load(Ordering::Acquire);
            let len = tail.wrapping_sub(head);
            if len == 0 {
                return None;
            }
            if len > self.capacity() {
                // Torn snapshot: head moved between the two loads.
                std::hint::spin_loop();
                continue;
            }
            let count = (len - len / 2).min(max.max(1));
            batch.clear();
            batch.extend(
                (0..count).map(|i| self.slots[head.wrapping_add(i) & self.mask].load(Ordering::Acquire)),
            );
            if self
                .head
                .compare_exchange(head, head.wrapping_add(count), Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }
        let (&first, rest) = batch.split_first()?;
        for &key in rest {
            dst.push(key, overflow);
        }
        Some(first)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_fifo_for_owner() {
        let queue = LocalQueue::new(8);
        let global = GlobalQueue::default();
        for key in 0..5 {
            assert!(!queue.push(key, &global));
        }
        assert_eq!(queue.len(), 5);
        assert_eq!((0..5).map(|_| queue.pop()).collect::<Vec<_>>(), (0..5).map(Some).collect::<Vec<_>>());
        assert_eq!(queue.pop(), None);
    }

    #[test]
    fn test_overflow_moves_half_plus_one() {
        let queue = LocalQueue::new(8);
        let global = GlobalQueue::default();
        for key in 0..8 {
            assert!(!queue.push(key, &global));
        }
        assert!(queue.push(8, &global));
        assert_eq!(queue.len(), 4);
        assert_eq!(global.len(), 5);
        assert_eq!(global.pop(), Some(0));
        assert_eq!(queue.pop(), Some(4));
    }

    #[test]
    fn test_steal_takes_half_capped() {
        let victim = LocalQueue::new(16);
        let thief = LocalQueue::new(16);
        let global = GlobalQueue::default();
        for key in 0..10 {
            victim.push(key, &global);
        }
        assert_eq!(victim.steal_into(&thief, 2, &global), Some(0));
        assert_eq!(thief.pop(), Some(1));
        assert_eq!(victim.len(), 8);

        let single = LocalQueue::new(4);
        single.push(7, &global);
        assert_eq!(single.steal_into(&thief, 2, &global), Some(7));
        assert_eq!(single.steal_into(&thief, 2, &global), None);
    }

    #[test]
    fn test_concurrent_pop_and_steal_lose_nothing() {
        const TOTAL: usize = 20_000;
        let victim = Arc::new(LocalQueue::new(256));
        let global = Arc::new(GlobalQueue::default());
        let taken = Arc::new(AtomicUsize::new(0));

        let thieves: Vec<_> = (0..3)
            .map(|_| {
                let (victim, global, taken) = (Arc::clone(&victim), Arc::clone(&global), Arc::clone(&taken));
                thread::spawn(move || {
                    let own = LocalQueue::new(256);
                    let mut seen = Vec::new();
                    while taken.load(Ordering::SeqCst) < TOTAL {
                        if let Some(key) = victim.steal_into(&own, 2, &global) {
                            seen.push(key);
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                        while let Some(key) = own.pop() {
                            seen.push(key);
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                        while let Some(key) = global.pop() {
                            seen.push(key);
                            taken.fetch_add(1, Ordering::SeqCst);
                        }
                    }
                    seen
                })
            })
            .collect();

        let mut seen = Vec::new();
        for key in 0..TOTAL {
            victim.push(key, &global);
            if key % 3 == 0 {
                if let Some(key) = victim.pop() {
                    seen.push(key);
                    taken.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
        while taken.load(Ordering::SeqCst) < TOTAL {
            if let Some(key) = victim.pop().or_else(|| global.pop()) {
                seen.push(key);
                taken.fetch_add(1, Ordering::SeqCst);
            }
        }
        for thief in thieves {
            seen.extend(thief.join().unwrap());
        }
        seen.sort_unstable();
        assert_eq!(seen, (0..TOTAL).collect::<Vec<_>>());
    }
}
