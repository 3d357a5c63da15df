//! Tests for error types

use prometheus_engine::core::{CancellationReason, EngineError, FutureError, SemaphoreError};

#[test]
fn test_engine_error_messages() {
    let err = EngineError::InvalidConfig("worker_threads must be greater than 0".into());
    assert_eq!(
        err.to_string(),
        "invalid configuration: worker_threads must be greater than 0"
    );
    let err = EngineError::UnknownTaskProcessor("fs".into());
    assert_eq!(err.to_string(), "unknown task processor: fs");
}

#[test]
fn test_thread_spawn_error_keeps_source() {
    let err = EngineError::ThreadSpawn {
        name: "engine-worker-3".into(),
        source: std::io::Error::other("out of threads"),
    };
    assert!(err.to_string().contains("engine-worker-3"));
    assert!(std::error::Error::source(&err).is_some());
}

#[test]
fn test_future_error_messages() {
    assert_eq!(
        FutureError::PromiseAlreadySatisfied.to_string(),
        "promise already satisfied"
    );
    assert_eq!(FutureError::AlreadyRetrieved.to_string(), "future already retrieved");
    assert_eq!(FutureError::BrokenPromise.to_string(), "broken promise");
    assert_eq!(
        FutureError::TaskCancelled(CancellationReason::Overload).to_string(),
        "task cancelled: task processor overload"
    );
}

#[test]
fn test_exception_is_transparent() {
    let err = FutureError::from(anyhow::anyhow!("backend down"));
    assert_eq!(err.to_string(), "backend down");
}

#[test]
fn test_semaphore_error_messages() {
    assert_eq!(SemaphoreError::Cancelled.to_string(), "semaphore wait cancelled");
    assert_eq!(
        SemaphoreError::Unreachable {
            requested: 5,
            capacity: 2
        }
        .to_string(),
        "requested 5 tokens from a semaphore of capacity 2"
    );
}

#[test]
fn test_future_error_duplicate_keeps_message() {
    let err = FutureError::Exception(anyhow::anyhow!("disk full").context("writing snapshot"));
    let copy = err.duplicate();
    assert!(matches!(copy, FutureError::Exception(_)));
    assert_eq!(copy.to_string(), "writing snapshot: disk full");

    let cancelled = FutureError::TaskCancelled(CancellationReason::Deadline).duplicate();
    assert!(matches!(
        cancelled,
        FutureError::TaskCancelled(CancellationReason::Deadline)
    ));
    assert_eq!(cancelled.to_string(), "task cancelled: task deadline reached");
}
