//! Tests for configuration validation

use std::time::Duration;

use prometheus_engine::config::{EngineConfig, OverloadAction, OverloadConfig, RuntimeConfig};

#[test]
fn test_runtime_config_defaults_validate() {
    let cfg = RuntimeConfig::default();
    assert!(cfg.validate().is_ok());
    assert!(cfg.worker_threads >= 1);
    assert_eq!(cfg.local_queue_capacity, 256);
    assert_eq!(cfg.overload.action, OverloadAction::Ignore);
}

#[test]
fn test_runtime_config_rejects_zero_workers() {
    let cfg = RuntimeConfig::new().with_worker_threads(0);
    assert!(cfg.validate().unwrap_err().contains("worker_threads"));
}

#[test]
fn test_runtime_config_rejects_odd_queue_capacity() {
    let cfg = RuntimeConfig::new().with_local_queue_capacity(100);
    assert!(cfg.validate().is_err());
    assert!(RuntimeConfig::new().with_local_queue_capacity(128).validate().is_ok());
}

#[test]
fn test_runtime_config_rejects_small_stack() {
    let cfg = RuntimeConfig::new().with_thread_stack_size(4096);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_runtime_config_rejects_zero_steal_attempts() {
    let cfg = RuntimeConfig::new().with_stealing(2, 0);
    assert!(cfg.validate().unwrap_err().contains("steal_attempts"));
    assert!(RuntimeConfig::new().with_stealing(2, 1).validate().is_ok());
}

#[test]
fn test_runtime_config_rejects_zero_global_bulk_max() {
    let cfg = RuntimeConfig::new().with_global_bulk_max(0);
    assert!(cfg.validate().unwrap_err().contains("global_bulk_max"));
}

#[test]
fn test_runtime_config_from_env_reads_global_bulk_max() {
    std::env::set_var("ENGINE_GLOBAL_BULK_MAX", "7");
    let cfg = RuntimeConfig::from_env();
    std::env::remove_var("ENGINE_GLOBAL_BULK_MAX");
    assert_eq!(cfg.unwrap().global_bulk_max, 7);
}

#[test]
fn test_runtime_config_builders() {
    let cfg = RuntimeConfig::new()
        .with_worker_threads(6)
        .with_thread_name("fs-worker")
        .with_global_queue_interval(31)
        .with_stealing(4, 2)
        .with_global_bulk_max(16)
        .with_shutdown_timeout(Duration::from_millis(1500))
        .with_overload(OverloadConfig {
            wait_queue_length_limit: 1000,
            wait_queue_time_limit_ms: 50,
            action: OverloadAction::Cancel,
        });
    assert_eq!(cfg.worker_threads, 6);
    assert_eq!(cfg.thread_name, "fs-worker");
    assert_eq!(cfg.global_queue_interval, 31);
    assert_eq!((cfg.steal_batch, cfg.steal_attempts), (4, 2));
    assert_eq!(cfg.global_bulk_max, 16);
    assert_eq!(cfg.shutdown_timeout(), Duration::from_millis(1500));
    assert_eq!(cfg.overload.action, OverloadAction::Cancel);
    assert!(cfg.validate().is_ok());
}

#[test]
fn test_runtime_config_from_json_fills_defaults() {
    let cfg = RuntimeConfig::from_json_str(
        r#"{"worker_threads": 3, "overload": {"wait_queue_length_limit": 10, "action": "cancel"}}"#,
    )
    .unwrap();
    assert_eq!(cfg.worker_threads, 3);
    assert_eq!(cfg.thread_name, RuntimeConfig::default().thread_name);
    assert_eq!(cfg.overload.wait_queue_length_limit, 10);
    assert_eq!(cfg.overload.action, OverloadAction::Cancel);
}

#[test]
fn test_runtime_config_from_json_rejects_invalid() {
    assert!(RuntimeConfig::from_json_str(r#"{"worker_threads": 0}"#).is_err());
    assert!(RuntimeConfig::from_json_str("not json").unwrap_err().starts_with("parse error"));
}

#[test]
fn test_engine_config_validation() {
    let cfg = EngineConfig::from_json_str(
        r#"{
            "task_processors": {
                "main-task-processor": {"worker_threads": 4},
                "fs-task-processor": {"worker_threads": 2, "thread_name": "fs-worker"}
            },
            "default_task_processor": "main-task-processor"
        }"#,
    )
    .unwrap();
    assert_eq!(cfg.task_processors.len(), 2);
    assert_eq!(cfg.task_processors["fs-task-processor"].thread_name, "fs-worker");
}

#[test]
fn test_engine_config_requires_known_default() {
    let err = EngineConfig::from_json_str(
        r#"{"task_processors": {"main": {}}, "default_task_processor": "other"}"#,
    )
    .unwrap_err();
    assert!(err.contains("other"));
}

#[test]
fn test_engine_config_reports_bad_processor() {
    let err = EngineConfig::from_json_str(
        r#"{"task_processors": {"main": {"worker_threads": 0}}, "default_task_processor": "main"}"#,
    )
    .unwrap_err();
    assert!(err.contains("main"));
}
