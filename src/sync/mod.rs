//! Task-aware synchronization primitives.
//!
//! Everything here parks the waiting task on a [`WaitQueue`] and returns the
//! worker thread to the scheduler. Timeouts are plain return values
//! (`bool`, `Option`, [`FutureStatus`], [`CvStatus`]); misuse such as
//! over-acquiring a semaphore panics.

pub mod condvar;
pub mod future;
pub mod mpsc;
pub mod mutex;
pub mod mutex_set;
pub mod semaphore;
pub mod shared_mutex;
pub mod single_consumer_event;
pub mod wait_any;
pub mod wait_queue;

pub use condvar::{ConditionVariable, CvStatus};
pub use future::{Future, FutureStatus, Promise, SharedFuture};
pub use mutex::{Mutex, MutexLock};
pub use mutex_set::{MutexSet, MutexSetItem, MutexSetLock};
pub use semaphore::{CancellableSemaphore, Semaphore, SemaphoreLock};
pub use shared_mutex::{ExclusiveLock, SharedLock, SharedMutex};
pub use single_consumer_event::SingleConsumerEvent;
pub use wait_any::{wait_any, wait_any_for, wait_any_until, Waitable};
pub use wait_queue::{QueueWaiter, WaitQueue};
