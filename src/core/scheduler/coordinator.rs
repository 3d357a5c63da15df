//! Tracks which workers sleep and which steal.
//!
//! All operations are lock-free except the final unpark of a chosen worker.

use std::sync::atomic::{fence, AtomicU64, AtomicUsize, Ordering};

use super::parker::Parker;

const BITS: usize = u64::BITS as usize;

#[derive(Debug)]
pub(crate) struct Coordinator {
    workers: usize,
    sleeping_mask: Box<[AtomicU64]>,
    sleeping: AtomicUsize,
    stealing: AtomicUsize,
    parkers: Box<[Parker]>,
}

impl Coordinator {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            workers,
            sleeping_mask: (0..workers.div_ceil(BITS)).map(|_| AtomicU64::new(0)).collect(),
            sleeping: AtomicUsize::new(0),
            stealing: AtomicUsize::new(0),
            parkers: (0..workers).map(|_| Parker::default()).collect(),
        }
    }

    pub(crate) fn parker(&self, worker: usize) -> &Parker {
        &self.parkers[worker]
    }

    pub(crate) fn sleeping(&self) -> usize {
        self.sleeping.load(Ordering::Relaxed)
    }

    pub(crate) fn stealing(&self) -> usize {
        self.stealing.load(Ordering::Relaxed)
    }

    /// Admits the caller into the stealing phase unless at least half of the
    /// awake workers are already stealing.
    pub(crate) fn allow_stealing(&self) -> bool {
        let stealing = self.stealing.load(Ordering::Acquire);
        let active = self.workers.saturating_sub(self.sleeping.load(Ordering::Acquire));
        if 2 * stealing >= active.max(1) {
            return false;
        }
        self.stealing.fetch_add(1, Ordering::AcqRel);
        true
    }

    /// Leaves the stealing phase. Returns `true` if the caller was the last
    /// stealer.
    pub(crate) fn stop_stealing(&self) -> bool {
        self.stealing.fetch_sub(1, Ordering::AcqRel) == 1
    }

    /// Registers `worker` as asleep. The caller must re-check every queue
    /// after this call and before parking.
    pub(crate) fn notify_sleep(&self, worker: usize) {
        let (word, bit) = (worker / BITS, 1u64 << (worker % BITS));
        self.sleeping.fetch_add(1, Ordering::SeqCst);
        self.sleeping_mask[word].fetch_or(bit, Ordering::SeqCst);
        fence(Ordering::SeqCst);
    }

    /// Registers `worker` as awake. A no-op when a waker already claimed it.
    pub(crate) fn notify_wake_up(&self, worker: usize) {
        let (word, bit) = (worker / BITS, 1u64 << (worker % BITS));
        let previous = self.sleeping_mask[word].fetch_and(!bit, Ordering::AcqRel);
        if previous & bit != 0 {
            self.sleeping.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Wakes one sleeping worker, if any. Call after publishing new work.
    pub(crate) fn wake_up_one(&self) -> Option<usize> {
        fence(Ordering::SeqCst);
        if self.sleeping.load(Ordering::Relaxed) == 0 {
            return None;
        }
        for (word_index, word) in self.sleeping_mask.iter().enumerate() {
            let mut current = word.load(Ordering::Acquire);
            while current != 0 {
                let bit = current.trailing_zeros() as usize;
                let mask = 1u64 << bit;
                match word.compare_exchange_weak(
                    current,
                    current & !mask,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                ) {
                    Ok(_) => {
                        self.sleeping.fetch_sub(1, Ordering::AcqRel);
                        let worker = word_index * BITS + bit;
                        self.parkers[worker].unpark();
                        return Some(worker);
                    }
                    Err(actual) => current = actual,
                }
            }
        }
        None
    }

    /// Unparks every worker regardless of its registration.
    pub(crate) fn wake_up_all(&self) {
        for parker in &self.parkers {
            parker.unpark();
        }
    }
}
