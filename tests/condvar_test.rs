//! Integration tests for ConditionVariable
//!
//! The condition variable is used with the task Mutex guarding state kept in
//! a `parking_lot::Mutex`, the way application code pairs them.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex as StateLock;
use prometheus_engine::config::RuntimeConfig;
use prometheus_engine::current_task;
use prometheus_engine::sync::{ConditionVariable, CvStatus, Mutex};
use prometheus_engine::{spawn, Runtime};

fn runtime() -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .with_worker_threads(3)
            .with_thread_name("condvar-test"),
    )
    .expect("runtime starts")
}

struct Shared {
    mutex: Mutex,
    cv: ConditionVariable,
    queue: StateLock<Vec<usize>>,
}

impl Shared {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            mutex: Mutex::new(),
            cv: ConditionVariable::new(),
            queue: StateLock::new(Vec::new()),
        })
    }
}

// ============================================================================
// Notification
// ============================================================================

#[test]
fn test_producer_consumer_queue() {
    const ITEMS: usize = 200;

    let runtime = runtime();
    let shared = Shared::new();

    let received = runtime.block_on({
        let shared = Arc::clone(&shared);
        async move {
            let producer = spawn({
                let shared = Arc::clone(&shared);
                async move {
                    for i in 0..ITEMS {
                        let _lock = shared.mutex.lock().await;
                        shared.queue.lock().push(i);
                        shared.cv.notify_one();
                        if i % 16 == 0 {
                            current_task::yield_now().await;
                        }
                    }
                }
            });

            let mut received = Vec::with_capacity(ITEMS);
            while received.len() < ITEMS {
                let mut lock = shared.mutex.lock().await;
                let ready = shared
                    .cv
                    .wait_pred(&mut lock, || !shared.queue.lock().is_empty())
                    .await;
                assert!(ready);
                received.append(&mut shared.queue.lock());
            }
            producer.get().await.unwrap();
            received
        }
    });

    assert_eq!(received, (0..ITEMS).collect::<Vec<_>>());
}

#[test]
fn test_notify_all_wakes_every_waiter() {
    let runtime = runtime();
    let shared = Shared::new();

    let woken = runtime.block_on({
        let shared = Arc::clone(&shared);
        async move {
            let waiters: Vec<_> = (0..5)
                .map(|_| {
                    let shared = Arc::clone(&shared);
                    spawn(async move {
                        let mut lock = shared.mutex.lock().await;
                        shared
                            .cv
                            .wait_pred(&mut lock, || !shared.queue.lock().is_empty())
                            .await
                    })
                })
                .collect();
            current_task::sleep_for(Duration::from_millis(10)).await;
            {
                let _lock = shared.mutex.lock().await;
                shared.queue.lock().push(1);
                shared.cv.notify_all();
            }
            let mut woken = 0;
            for waiter in waiters {
                if waiter.get().await.unwrap() {
                    woken += 1;
                }
            }
            woken
        }
    });

    assert_eq!(woken, 5);
}

// ============================================================================
// Timeout and cancellation
// ============================================================================

#[test]
fn test_wait_for_times_out_and_relocks() {
    let runtime = runtime();
    let shared = Shared::new();

    let (status, elapsed, relocked) = runtime.block_on({
        let shared = Arc::clone(&shared);
        async move {
            let mut lock = shared.mutex.lock().await;
            let started = Instant::now();
            let status = shared.cv.wait_for(&mut lock, Duration::from_millis(20)).await;
            (status, started.elapsed(), lock.owns_lock() && shared.mutex.try_lock().is_none())
        }
    });

    assert_eq!(status, CvStatus::Timeout);
    assert!(elapsed >= Duration::from_millis(20));
    assert!(relocked);
}

#[test]
fn test_cancelled_waiter() {
    let runtime = runtime();
    let shared = Shared::new();

    let (status, pred) = runtime.block_on({
        let shared = Arc::clone(&shared);
        async move {
            let waiter = spawn({
                let shared = Arc::clone(&shared);
                async move {
                    let mut lock = shared.mutex.lock().await;
                    let status = shared.cv.wait(&mut lock).await;
                    let pred = shared
                        .cv
                        .wait_pred(&mut lock, || !shared.queue.lock().is_empty())
                        .await;
                    (status, pred)
                }
            });
            current_task::sleep_for(Duration::from_millis(10)).await;
            waiter.request_cancel();
            waiter.get().await.unwrap()
        }
    });

    assert_eq!(status, CvStatus::Cancelled);
    assert!(!pred);
}
