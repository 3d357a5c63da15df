//! Blocks an idle worker thread on a generation counter.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Condvar, Mutex};

/// Futex-style sleep slot of one worker: the worker samples the generation,
/// re-checks for work, then sleeps until the generation changes.
#[derive(Debug, Default)]
pub(crate) struct Parker {
    generation: AtomicU64,
    lock: Mutex<()>,
    cvar: Condvar,
}

impl Parker {
    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Blocks while the generation still equals `observed`.
    pub(crate) fn park(&self, observed: u64) {
        let mut guard = self.lock.lock();
        while self.generation.load(Ordering::Acquire) == observed {
            self.cvar.wait(&mut guard);
        }
    }

    pub(crate) fn unpark(&self) {
        let _guard = self.lock.lock();
        self.generation.fetch_add(1, Ordering::Release);
        self.cvar.notify_one();
    }
}
