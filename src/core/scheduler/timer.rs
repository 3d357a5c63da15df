//! Deadline timer thread.
//!
//! Timed waits register a waker for an instant; a dedicated thread sleeps
//! until the earliest registered instant and wakes the corresponding tasks.
//! Registrations are keyed by `(instant, id)`, so a cancelled wait leaves
//! nothing behind.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::Waker;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::core::error::EngineError;

/// Handle of one registered deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct TimerId {
    at: Instant,
    id: u64,
}

#[derive(Debug, Default)]
struct TimerState {
    entries: BTreeMap<TimerId, Waker>,
    stopped: bool,
}

#[derive(Debug, Default)]
pub(crate) struct Timer {
    state: Mutex<TimerState>,
    changed: Condvar,
    next_id: AtomicU64,
}

impl Timer {
    pub(crate) fn register(&self, at: Instant, waker: Waker) -> TimerId {
        let key = TimerId {
            at,
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        };
        let mut state = self.state.lock();
        let earliest = state.entries.first_key_value().is_none_or(|(first, _)| key < *first);
        state.entries.insert(key, waker);
        drop(state);
        if earliest {
            self.changed.notify_one();
        }
        key
    }

    pub(crate) fn update(&self, key: TimerId, waker: Waker) {
        if let Some(slot) = self.state.lock().entries.get_mut(&key) {
            *slot = waker;
        }
    }

    pub(crate) fn cancel(&self, key: TimerId) {
        self.state.lock().entries.remove(&key);
    }

    pub(crate) fn pending(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub(crate) fn stop(&self) {
        self.state.lock().stopped = true;
        self.changed.notify_all();
    }

    pub(crate) fn spawn(self: &Arc<Self>, name: String) -> Result<JoinHandle<()>, EngineError> {
        let timer = Arc::clone(self);
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || timer.run())
            .map_err(|source| EngineError::ThreadSpawn { name, source })
    }

    fn run(&self) {
        debug!("timer thread started");
        let mut state = self.state.lock();
        loop {
            if state.stopped {
                break;
            }
            let now = Instant::now();
            let mut expired = Vec::new();
            while let Some(entry) = state.entries.first_entry() {
                if entry.key().at > now {
                    break;
                }
                expired.push(entry.remove());
            }
            if !expired.is_empty() {
                drop(state);
                expired.into_iter().for_each(Waker::wake);
                state = self.state.lock();
                continue;
            }
            match state.entries.first_key_value().map(|(key, _)| key.at) {
                Some(at) => {
                    let _timed_out = self.changed.wait_until(&mut state, at);
                }
                None => self.changed.wait(&mut state),
            }
        }
        state.entries.clear();
        debug!("timer thread exiting");
    }
}
