//! Integration tests for SingleConsumerEvent
//!
//! Signal delivery, auto-reset and manual-reset behavior, timeouts and
//! cancellation of the waiting task.

use std::sync::Arc;
use std::time::{Duration, Instant};

use prometheus_engine::config::RuntimeConfig;
use prometheus_engine::current_task;
use prometheus_engine::sync::SingleConsumerEvent;
use prometheus_engine::{spawn, Runtime};

fn runtime() -> Runtime {
    Runtime::new(
        RuntimeConfig::new()
            .with_worker_threads(2)
            .with_thread_name("event-test"),
    )
    .expect("runtime starts")
}

// ============================================================================
// Delivery
// ============================================================================

#[test]
fn test_send_wakes_waiter() {
    let runtime = runtime();
    let event = Arc::new(SingleConsumerEvent::new());

    let (received, elapsed) = runtime.block_on({
        let event = Arc::clone(&event);
        async move {
            let started = Instant::now();
            spawn({
                let event = Arc::clone(&event);
                async move {
                    current_task::sleep_for(Duration::from_millis(10)).await;
                    event.send();
                }
            })
            .detach();
            (event.wait().await, started.elapsed())
        }
    });

    assert!(received);
    assert!(elapsed >= Duration::from_millis(10));
    assert!(!event.is_ready());
}

#[test]
fn test_signal_sent_before_wait_is_kept() {
    let runtime = runtime();
    let event = Arc::new(SingleConsumerEvent::new());
    event.send();

    let (first, second) = runtime.block_on({
        let event = Arc::clone(&event);
        async move {
            let first = event.wait_for(Duration::from_millis(10)).await;
            let second = event.wait_for(Duration::from_millis(10)).await;
            (first, second)
        }
    });

    assert!(first);
    assert!(!second);
}

#[test]
fn test_manual_reset_event_stays_signaled() {
    let runtime = runtime();
    let event = Arc::new(SingleConsumerEvent::without_auto_reset());
    event.send();

    let both = runtime.block_on({
        let event = Arc::clone(&event);
        async move { event.wait().await && event.wait().await }
    });

    assert!(both);
    assert!(event.is_ready());
    event.reset();
    assert!(!event.is_ready());
}

#[test]
fn test_ping_pong_between_tasks() {
    const ROUNDS: usize = 200;

    let runtime = runtime();
    let ping = Arc::new(SingleConsumerEvent::new());
    let pong = Arc::new(SingleConsumerEvent::new());

    let rounds = runtime.block_on({
        let ping = Arc::clone(&ping);
        let pong = Arc::clone(&pong);
        async move {
            let responder = spawn({
                let ping = Arc::clone(&ping);
                let pong = Arc::clone(&pong);
                async move {
                    for _ in 0..ROUNDS {
                        assert!(ping.wait_for(Duration::from_secs(5)).await);
                        pong.send();
                    }
                }
            });
            let mut rounds = 0;
            for _ in 0..ROUNDS {
                ping.send();
                assert!(pong.wait_for(Duration::from_secs(5)).await);
                rounds += 1;
            }
            responder.get().await.unwrap();
            rounds
        }
    });

    assert_eq!(rounds, ROUNDS);
}

// ============================================================================
// Timeouts and cancellation
// ============================================================================

#[test]
fn test_wait_for_times_out() {
    let runtime = runtime();
    let event = SingleConsumerEvent::new();

    let (received, elapsed) = runtime.block_on(async move {
        let started = Instant::now();
        (event.wait_for(Duration::from_millis(30)).await, started.elapsed())
    });

    assert!(!received);
    assert!(elapsed >= Duration::from_millis(25));
}

#[test]
fn test_cancelled_waiter_gives_up() {
    let runtime = runtime();
    let event = Arc::new(SingleConsumerEvent::new());

    let outcome = runtime.block_on({
        let event = Arc::clone(&event);
        async move {
            let waiter = spawn({
                let event = Arc::clone(&event);
                async move { event.wait().await }
            });
            current_task::sleep_for(Duration::from_millis(10)).await;
            waiter.request_cancel();
            waiter.get().await
        }
    });

    assert!(!outcome.unwrap());
}
