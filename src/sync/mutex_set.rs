//! Per-key critical sections over an unbounded key space.
//!
//! Keys are spread over a fixed number of ways by hash. Each way is a set of
//! currently locked keys plus one wait queue shared by every key that maps
//! to it. Unlocking wakes the whole way, since the woken waiters may be
//! waiting for different keys. Memory stays proportional to the number of
//! keys locked right now, not to the number ever seen.

use std::collections::hash_map::RandomState;
use std::collections::HashSet;
use std::fmt;
use std::hash::{BuildHasher, Hash};
use std::time::Duration;

use parking_lot::Mutex;

use super::wait_queue::WaitQueue;
use crate::core::deadline::Deadline;
use crate::core::task::WakeupSource;

struct Way<K, S> {
    keys: Mutex<HashSet<K, S>>,
    waiters: WaitQueue,
}

/// Set of named mutexes created on demand.
///
/// ```
/// use prometheus_engine::sync::MutexSet;
///
/// let set: MutexSet<String> = MutexSet::new(4);
/// let item = set.lock_for("user:42".to_owned());
/// assert!(item.try_lock());
/// assert!(!set.lock_for("user:42".to_owned()).try_lock());
/// assert!(set.lock_for("user:7".to_owned()).try_lock());
/// item.unlock();
/// set.lock_for("user:7".to_owned()).unlock();
/// ```
pub struct MutexSet<K, S = RandomState> {
    ways: Box<[Way<K, S>]>,
    hasher: S,
}

impl<K, S> fmt::Debug for MutexSet<K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexSet")
            .field("ways", &self.ways.len())
            .finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + Clone> MutexSet<K, RandomState> {
    /// Creates a set spreading keys over `ways` wait queues.
    ///
    /// # Panics
    ///
    /// Panics if `ways` is zero.
    #[must_use]
    pub fn new(ways: usize) -> Self {
        Self::with_hasher(ways, RandomState::new())
    }
}

impl<K: Eq + Hash + Clone> Default for MutexSet<K, RandomState> {
    fn default() -> Self {
        Self::new(1)
    }
}

impl<K, S> MutexSet<K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher + Clone,
{
    /// Creates a set using `hasher` for way selection and the key sets.
    ///
    /// # Panics
    ///
    /// Panics if `ways` is zero.
    #[must_use]
    pub fn with_hasher(ways: usize, hasher: S) -> Self {
        assert!(ways > 0, "MutexSet needs at least one way");
        let ways = (0..ways)
            .map(|_| Way {
                keys: Mutex::new(HashSet::with_hasher(hasher.clone())),
                waiters: WaitQueue::new(),
            })
            .collect();
        Self { ways, hasher }
    }

    /// Number of ways.
    #[must_use]
    pub fn ways(&self) -> usize {
        self.ways.len()
    }

    /// Returns the mutex for `key`. Nothing is locked yet.
    pub fn lock_for(&self, key: K) -> MutexSetItem<'_, K, S> {
        #[allow(clippy::cast_possible_truncation)]
        let way = (self.hasher.hash_one(&key) % self.ways.len() as u64) as usize;
        MutexSetItem {
            way: &self.ways[way],
            key,
        }
    }
}

impl<K, S> Drop for MutexSet<K, S> {
    fn drop(&mut self) {
        debug_assert!(
            self.ways.iter_mut().all(|way| way.keys.get_mut().is_empty()),
            "MutexSet dropped with a key still locked"
        );
    }
}

/// Mutex for one key of a [`MutexSet`].
///
/// The raw `lock`/`unlock` pair mirrors a plain mutex; [`lock_scoped`]
/// returns a guard instead. Waits ignore task cancellation.
///
/// [`lock_scoped`]: Self::lock_scoped
pub struct MutexSetItem<'a, K, S = RandomState> {
    way: &'a Way<K, S>,
    key: K,
}

impl<K: fmt::Debug, S> fmt::Debug for MutexSetItem<'_, K, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MutexSetItem").field("key", &self.key).finish()
    }
}

impl<K, S> MutexSetItem<'_, K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    /// The key this mutex guards.
    pub const fn key(&self) -> &K {
        &self.key
    }

    fn insert(&self) -> bool {
        self.way.keys.lock().insert(self.key.clone())
    }

    async fn lock_until(&self, deadline: Deadline) -> bool {
        loop {
            let mut acquired = false;
            let source = self
                .way
                .waiters
                .wait_until(
                    || {
                        acquired = self.insert();
                        acquired
                    },
                    deadline,
                    false,
                )
                .await;
            if acquired || self.insert() {
                return true;
            }
            if source != WakeupSource::WaitList {
                return false;
            }
        }
    }

    /// Locks the key, parking the task while another holder has it.
    pub async fn lock(&self) {
        if !self.insert() {
            self.lock_until(Deadline::unreachable()).await;
        }
    }

    /// Locks the key if nobody holds it.
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.insert()
    }

    /// Locks the key unless `timeout` passes first.
    pub async fn try_lock_for(&self, timeout: Duration) -> bool {
        self.try_lock_until(Deadline::from_duration(timeout)).await
    }

    /// Locks the key unless `deadline` passes first.
    pub async fn try_lock_until(&self, deadline: Deadline) -> bool {
        self.insert() || self.lock_until(deadline).await
    }

    /// Unlocks the key and wakes every waiter of its way.
    pub fn unlock(&self) {
        let removed = self.way.keys.lock().remove(&self.key);
        debug_assert!(removed, "unlock of a MutexSet key that is not locked");
        self.way.waiters.wake_all();
    }

    /// Locks the key and returns a guard unlocking it on drop.
    pub async fn lock_scoped(&self) -> MutexSetLock<'_, '_, K, S> {
        self.lock().await;
        MutexSetLock { item: self }
    }
}

/// Holds a [`MutexSetItem`] locked; unlocks on drop.
#[must_use = "the key is unlocked as soon as the guard is dropped"]
pub struct MutexSetLock<'i, 'a, K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    item: &'i MutexSetItem<'a, K, S>,
}

impl<K, S> Drop for MutexSetLock<'_, '_, K, S>
where
    K: Eq + Hash + Clone,
    S: BuildHasher,
{
    fn drop(&mut self) {
        self.item.unlock();
    }
}
