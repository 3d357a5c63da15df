//! Integration tests for MutexSet
//!
//! Per-key exclusion across tasks, independence of distinct keys sharing a
//! way, and timed locking.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus_engine::config::RuntimeConfig;
use prometheus_engine::current_task;
use prometheus_engine::sync::MutexSet;
use prometheus_engine::{spawn, Runtime};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

fn runtime(workers: usize) -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .with_worker_threads(workers)
            .with_thread_name("mutex-set-test"),
    )
    .expect("runtime starts")
}

/// Yields a random number of times or sleeps for a few microseconds.
async fn jitter(rng: &mut SmallRng) {
    if rng.random_bool(0.5) {
        for _ in 0..rng.random_range(0..4) {
            current_task::yield_now().await;
        }
    } else {
        current_task::sleep_for(Duration::from_micros(rng.random_range(1..200))).await;
    }
}

// ============================================================================
// Exclusion
// ============================================================================

#[test]
fn test_second_locker_waits_for_unlock() {
    let runtime = runtime(2);
    let set = Arc::new(MutexSet::<String>::new(4));

    let (waited, after_unlock) = runtime.block_on({
        let set = Arc::clone(&set);
        async move {
            let item = set.lock_for("order:1".to_owned());
            item.lock().await;

            let second = spawn({
                let set = Arc::clone(&set);
                async move {
                    let started = Instant::now();
                    let item = set.lock_for("order:1".to_owned());
                    item.lock().await;
                    let acquired_at = Instant::now();
                    item.unlock();
                    (started.elapsed(), acquired_at)
                }
            });

            current_task::sleep_for(Duration::from_millis(20)).await;
            let unlocked_at = Instant::now();
            item.unlock();
            let (waited, acquired_at) = second.get().await.unwrap();
            (waited, acquired_at.saturating_duration_since(unlocked_at))
        }
    });

    assert!(waited >= Duration::from_millis(15));
    assert!(after_unlock < Duration::from_secs(1));
}

#[test]
fn test_per_key_mutual_exclusion() {
    const KEYS: usize = 8;
    const TASKS_PER_KEY: usize = 50;

    let runtime = runtime(4);
    let set = Arc::new(MutexSet::<usize>::new(2));
    let inside: Arc<Vec<AtomicUsize>> = Arc::new((0..KEYS).map(|_| AtomicUsize::new(0)).collect());
    let violations = Arc::new(AtomicUsize::new(0));

    runtime.block_on({
        let set = Arc::clone(&set);
        let inside = Arc::clone(&inside);
        let violations = Arc::clone(&violations);
        async move {
            let handles: Vec<_> = (0..KEYS * TASKS_PER_KEY)
                .map(|i| {
                    let set = Arc::clone(&set);
                    let inside = Arc::clone(&inside);
                    let violations = Arc::clone(&violations);
                    spawn(async move {
                        let key = i % KEYS;
                        let item = set.lock_for(key);
                        let _guard = item.lock_scoped().await;
                        if inside[key].fetch_add(1, Ordering::SeqCst) != 0 {
                            violations.fetch_add(1, Ordering::SeqCst);
                        }
                        current_task::yield_now().await;
                        inside[key].fetch_sub(1, Ordering::SeqCst);
                    })
                })
                .collect();
            for handle in handles {
                handle.get().await.unwrap();
            }
        }
    });

    assert_eq!(violations.load(Ordering::SeqCst), 0);
}

#[test]
fn test_distinct_keys_run_concurrently() {
    let runtime = runtime(2);
    let set = Arc::new(MutexSet::<u32>::new(1));

    let acquired = runtime.block_on({
        let set = Arc::clone(&set);
        async move {
            let first = set.lock_for(1);
            first.lock().await;
            let other = spawn({
                let set = Arc::clone(&set);
                async move {
                    let item = set.lock_for(2);
                    let acquired = item.try_lock_for(Duration::from_secs(5)).await;
                    if acquired {
                        item.unlock();
                    }
                    acquired
                }
            });
            let acquired = other.get().await.unwrap();
            first.unlock();
            acquired
        }
    });

    assert!(acquired);
}

// ============================================================================
// Timed locking
// ============================================================================

#[test]
fn test_try_lock_for_times_out_on_held_key() {
    let runtime = runtime(2);
    let set = Arc::new(MutexSet::<&'static str>::new(4));

    let (acquired, elapsed) = runtime.block_on({
        let set = Arc::clone(&set);
        async move {
            let holder = set.lock_for("job");
            assert!(holder.try_lock());
            let contender = set.lock_for("job");
            let started = Instant::now();
            let acquired = contender.try_lock_for(Duration::from_millis(25)).await;
            let elapsed = started.elapsed();
            holder.unlock();
            (acquired, elapsed)
        }
    });

    assert!(!acquired);
    assert!(elapsed >= Duration::from_millis(20));
    assert!(set.lock_for("job").try_lock());
    set.lock_for("job").unlock();
}

// ============================================================================
// Randomized interleavings
// ============================================================================

#[test]
fn test_randomized_lock_unlock_never_loses_wakeup() {
    const KEYS: usize = 4;
    const TASKS: u64 = 32;
    const ROUNDS: usize = 20;

    let runtime = runtime(4);
    let set = Arc::new(MutexSet::<usize>::new(2));
    let inside: Arc<Vec<AtomicUsize>> = Arc::new((0..KEYS).map(|_| AtomicUsize::new(0)).collect());
    let entries: Arc<Vec<AtomicUsize>> = Arc::new((0..KEYS).map(|_| AtomicUsize::new(0)).collect());
    let violations = Arc::new(AtomicUsize::new(0));

    runtime.block_on({
        let set = Arc::clone(&set);
        let inside = Arc::clone(&inside);
        let entries = Arc::clone(&entries);
        let violations = Arc::clone(&violations);
        async move {
            let handles: Vec<_> = (0..TASKS)
                .map(|seed| {
                    let set = Arc::clone(&set);
                    let inside = Arc::clone(&inside);
                    let entries = Arc::clone(&entries);
                    let violations = Arc::clone(&violations);
                    spawn(async move {
                        let mut rng = SmallRng::seed_from_u64(0xbeef ^ seed);
                        for _ in 0..ROUNDS {
                            let key = rng.random_range(0..KEYS);
                            let item = set.lock_for(key);
                            jitter(&mut rng).await;
                            assert!(
                                item.try_lock_for(Duration::from_secs(5)).await,
                                "lock of key {key} timed out"
                            );
                            if inside[key].fetch_add(1, Ordering::SeqCst) != 0 {
                                violations.fetch_add(1, Ordering::SeqCst);
                            }
                            entries[key].fetch_add(1, Ordering::SeqCst);
                            jitter(&mut rng).await;
                            inside[key].fetch_sub(1, Ordering::SeqCst);
                            item.unlock();
                        }
                    })
                })
                .collect();
            for handle in handles {
                handle.get().await.unwrap();
            }
        }
    });

    assert_eq!(violations.load(Ordering::SeqCst), 0);
    let total: usize = entries.iter().map(|count| count.load(Ordering::SeqCst)).sum();
    assert_eq!(total, TASKS as usize * ROUNDS);
    for key in 0..KEYS {
        assert!(set.lock_for(key).try_lock());
        set.lock_for(key).unlock();
    }
}
