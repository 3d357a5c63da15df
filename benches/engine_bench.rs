//! Benchmarks for the task engine.
//!
//! Benchmarks cover:
//! - Spawn/join throughput with work stealing
//! - Uncontended and contended semaphore cycles
//! - Promise/Future handoff between tasks
//! - mpsc queue throughput

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use prometheus_engine::config::RuntimeConfig;
use prometheus_engine::core::Deadline;
use prometheus_engine::sync::{mpsc, Promise, Semaphore};
use prometheus_engine::{spawn, Runtime};

// ============================================================================
// Helper Functions
// ============================================================================

fn build_runtime(workers: usize) -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .with_worker_threads(workers)
            .with_thread_name("bench-worker"),
    )
    .expect("runtime starts")
}

// ============================================================================
// Scheduler Benchmarks
// ============================================================================

fn bench_spawn_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_join");

    for workers in [1, 4] {
        let runtime = build_runtime(workers);
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                runtime.block_on(async {
                    let handles: Vec<_> = (0..1_000u64).map(|i| spawn(async move { i })).collect();
                    let mut sum = 0;
                    for handle in handles {
                        sum += handle.get().await.unwrap();
                    }
                    black_box(sum)
                })
            });
        });
    }

    group.finish();
}

// ============================================================================
// Synchronization Benchmarks
// ============================================================================

fn bench_semaphore_uncontended(c: &mut Criterion) {
    let semaphore = Semaphore::new(1);
    c.bench_function("semaphore_try_acquire_release", |b| {
        b.iter(|| {
            assert!(semaphore.try_acquire(black_box(1)));
            semaphore.release(1);
        });
    });
}

fn bench_semaphore_contended(c: &mut Criterion) {
    let mut group = c.benchmark_group("semaphore_contended");
    let runtime = build_runtime(4);

    for capacity in [1, 8] {
        group.throughput(Throughput::Elements(1_000));
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            b.iter(|| {
                let semaphore = Arc::new(Semaphore::new(capacity));
                runtime.block_on(async move {
                    let handles: Vec<_> = (0..1_000)
                        .map(|_| {
                            let semaphore = Arc::clone(&semaphore);
                            spawn(async move {
                                let _lock = semaphore.lock(1).await;
                            })
                        })
                        .collect();
                    for handle in handles {
                        handle.get().await.unwrap();
                    }
                });
            });
        });
    }

    group.finish();
}

fn bench_promise_handoff(c: &mut Criterion) {
    let runtime = build_runtime(2);
    c.bench_function("promise_handoff", |b| {
        b.iter(|| {
            runtime.block_on(async {
                let promise = Promise::new();
                let mut future = promise.get_future().unwrap();
                spawn(async move { promise.set_value(black_box(1u64)).unwrap() }).detach();
                future.get().await.unwrap()
            })
        });
    });
}

fn bench_mpsc_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpsc_throughput");
    let runtime = build_runtime(4);

    for max_len in [16, 1_024] {
        group.throughput(Throughput::Elements(10_000));
        group.bench_with_input(BenchmarkId::from_parameter(max_len), &max_len, |b, &max_len| {
            b.iter(|| {
                runtime.block_on(async move {
                    let (producer, consumer) = mpsc::channel(max_len);
                    spawn(async move {
                        for i in 0..10_000u64 {
                            producer.push(i, Deadline::unreachable()).await.unwrap();
                        }
                    })
                    .detach();
                    let mut sum = 0;
                    while let Some(value) = consumer.pop(Deadline::unreachable()).await {
                        sum += value;
                    }
                    black_box(sum)
                })
            });
        });
    }

    group.finish();
}

criterion_group!(scheduler_benches, bench_spawn_join);

criterion_group!(
    sync_benches,
    bench_semaphore_uncontended,
    bench_semaphore_contended,
    bench_promise_handoff,
    bench_mpsc_throughput
);

criterion_main!(scheduler_benches, sync_benches);
