//! Work-stealing scheduler: queues, workers, sleep/wake coordination and
//! the deadline timer.

pub(crate) mod coordinator;
pub(crate) mod global_queue;
pub(crate) mod local_queue;
pub(crate) mod parker;
pub(crate) mod shared;
pub(crate) mod timer;
pub(crate) mod worker;

pub(crate) use shared::Shared;
