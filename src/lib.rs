//! # Prometheus Engine
//!
//! A work-stealing task runtime with task-aware synchronization primitives.
//!
//! Tasks are futures multiplexed over a fixed set of worker threads. A task
//! never blocks its worker: locks, semaphores, futures and queues park the
//! task on a wait queue and hand the thread back to the scheduler.
//!
//! ## Scheduling
//!
//! - Every worker owns a bounded local queue. Overflow moves half of it to a
//!   shared global queue in one batch.
//! - Idle workers pull a fair share from the global queue, then steal from
//!   a random peer. A coordinator caps the number of concurrent stealers.
//! - Workers with nothing to do sleep on a generation counter and are woken
//!   one at a time when new work is pushed.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use prometheus_engine::config::RuntimeConfig;
//! use prometheus_engine::runtime::Runtime;
//! use prometheus_engine::sync::Semaphore;
//!
//! let runtime = Runtime::new(RuntimeConfig::default().with_worker_threads(4)).unwrap();
//! let semaphore = Arc::new(Semaphore::new(2));
//!
//! let total = runtime.block_on(async move {
//!     let handles: Vec<_> = (0..16u64)
//!         .map(|i| {
//!             let semaphore = Arc::clone(&semaphore);
//!             prometheus_engine::spawn(async move {
//!                 let _lock = semaphore.lock(1).await;
//!                 i
//!             })
//!         })
//!         .collect();
//!     let mut total = 0;
//!     for handle in handles {
//!         total += handle.get().await.unwrap();
//!     }
//!     total
//! });
//! assert_eq!(total, 120);
//! ```
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. A cancelled task keeps running until it
//! reaches a cancellable wait, which then reports
//! [`WakeupSource::CancelRequest`](core::WakeupSource::CancelRequest) or an
//! equivalent status. Lock acquisition ([`sync::Semaphore`],
//! [`sync::SharedMutex`], [`sync::Mutex`]) ignores cancellation; use
//! [`sync::CancellableSemaphore`] when a wait should be abandoned.
//!
//! A task can also carry a deadline, set at spawn time with
//! [`Handle::spawn_with_deadline`] or from inside with
//! [`current_task::set_deadline`]. Reaching it requests cancellation with
//! [`CancellationReason::Deadline`](core::CancellationReason::Deadline).

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Scheduler core: tasks, deadlines, errors and statistics.
pub mod core;
/// Configuration models for runtimes and task processors.
pub mod config;
/// Builders to construct runtimes from configuration.
pub mod builders;
/// Runtime lifecycle, spawning and handles.
pub mod runtime;
/// Task-aware synchronization primitives.
pub mod sync;
/// Operations on the currently running task.
pub mod current_task;
/// Shared utilities.
pub mod util;

pub use runtime::{spawn, spawn_critical, Handle, Runtime};
