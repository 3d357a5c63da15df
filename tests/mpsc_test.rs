//! Integration tests for the bounded mpsc queue
//!
//! Ordering, back-pressure, deadlines and detection of a vanished peer.

use std::time::{Duration, Instant};

use prometheus_engine::config::RuntimeConfig;
use prometheus_engine::core::Deadline;
use prometheus_engine::current_task;
use prometheus_engine::sync::mpsc;
use prometheus_engine::{spawn, Runtime};

fn runtime() -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .with_worker_threads(3)
            .with_thread_name("mpsc-test"),
    )
    .expect("runtime starts")
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_many_producers_deliver_everything() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: usize = 250;

    let runtime = runtime();
    let mut received = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(16);
        for p in 0..PRODUCERS {
            let producer = producer.clone();
            spawn(async move {
                for i in 0..PER_PRODUCER {
                    producer
                        .push(p * PER_PRODUCER + i, Deadline::unreachable())
                        .await
                        .unwrap();
                }
            })
            .detach();
        }
        drop(producer);

        let mut received = Vec::new();
        while let Some(value) = consumer.pop(Deadline::unreachable()).await {
            received.push(value);
        }
        received
    });

    received.sort_unstable();
    assert_eq!(received, (0..PRODUCERS * PER_PRODUCER).collect::<Vec<_>>());
}

#[test]
fn test_single_producer_keeps_order() {
    let runtime = runtime();
    let received = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(2);
        spawn(async move {
            for i in 0..50 {
                producer.push(i, Deadline::unreachable()).await.unwrap();
            }
        })
        .detach();
        let mut received = Vec::new();
        while let Some(value) = consumer.pop(Deadline::unreachable()).await {
            received.push(value);
        }
        received
    });

    assert_eq!(received, (0..50).collect::<Vec<_>>());
}

// ============================================================================
// Back-pressure and deadlines
// ============================================================================

#[test]
fn test_push_times_out_on_full_queue() {
    let runtime = runtime();
    let (outcome, elapsed, len) = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(1);
        producer.push_noblock("first").unwrap();
        let started = Instant::now();
        let outcome = producer
            .push("second", Deadline::from_duration(Duration::from_millis(20)))
            .await;
        (outcome, started.elapsed(), consumer.len())
    });

    assert_eq!(outcome, Err("second"));
    assert!(elapsed >= Duration::from_millis(20));
    assert_eq!(len, 1);
}

#[test]
fn test_push_resumes_when_consumer_pops() {
    let runtime = runtime();
    let popped = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(1);
        producer.push_noblock(1).unwrap();
        let pusher = spawn(async move {
            producer.push(2, Deadline::unreachable()).await.is_ok()
        });
        current_task::sleep_for(Duration::from_millis(10)).await;
        let first = consumer.pop_noblock();
        assert!(pusher.get().await.unwrap());
        let second = consumer.pop(Deadline::from_duration(Duration::from_secs(5))).await;
        (first, second)
    });

    assert_eq!(popped, (Some(1), Some(2)));
}

#[test]
fn test_pop_times_out_on_empty_queue() {
    let runtime = runtime();
    let (value, elapsed) = runtime.block_on(async {
        let (_producer, consumer) = mpsc::channel::<u8>(4);
        let started = Instant::now();
        let value = consumer
            .pop(Deadline::from_duration(Duration::from_millis(20)))
            .await;
        (value, started.elapsed())
    });

    assert_eq!(value, None);
    assert!(elapsed >= Duration::from_millis(20));
}

// ============================================================================
// Peer detection
// ============================================================================

#[test]
fn test_blocked_push_fails_when_consumer_drops() {
    let runtime = runtime();
    let outcome = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(0);
        let pusher = spawn(async move { producer.push(9, Deadline::unreachable()).await });
        current_task::sleep_for(Duration::from_millis(10)).await;
        drop(consumer);
        pusher.get().await.unwrap()
    });

    assert_eq!(outcome, Err(9));
}

#[test]
fn test_pop_drains_after_producers_leave() {
    let runtime = runtime();
    let drained = runtime.block_on(async {
        let (producer, consumer) = mpsc::channel(4);
        producer.push_noblock('a').unwrap();
        producer.push_noblock('b').unwrap();
        drop(producer);
        assert!(!consumer.has_producers());
        let mut drained = Vec::new();
        while let Some(value) = consumer.pop(Deadline::unreachable()).await {
            drained.push(value);
        }
        drained
    });

    assert_eq!(drained, vec!['a', 'b']);
}
