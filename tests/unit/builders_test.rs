//! Tests for building task processors from configuration

use prometheus_engine::builders::build_runtimes;
use prometheus_engine::config::EngineConfig;
use prometheus_engine::core::EngineError;

fn engine_config() -> EngineConfig {
    EngineConfig::from_json_str(
        r#"{
            "task_processors": {
                "main-task-processor": {"worker_threads": 2, "thread_name": "main-worker"},
                "fs-task-processor": {"worker_threads": 1, "thread_name": "fs-worker"}
            },
            "default_task_processor": "main-task-processor"
        }"#,
    )
    .unwrap()
}

#[test]
fn test_build_runtimes_from_config() {
    let processors = build_runtimes(&engine_config()).unwrap();
    assert_eq!(processors.names(), vec!["fs-task-processor", "main-task-processor"]);
    assert_eq!(processors.default_name(), "main-task-processor");
    assert_eq!(processors.default_processor().stats().worker_count, 2);

    let fs = processors.get("fs-task-processor").unwrap();
    let value = fs.block_on(async { 5 });
    assert_eq!(value, 5);

    processors.shutdown();
}

#[test]
fn test_unknown_processor() {
    let processors = build_runtimes(&engine_config()).unwrap();
    assert!(matches!(
        processors.get("gpu-task-processor"),
        Err(EngineError::UnknownTaskProcessor(name)) if name == "gpu-task-processor"
    ));
}

#[test]
fn test_invalid_engine_config_is_rejected() {
    let mut cfg = engine_config();
    cfg.default_task_processor = "missing".into();
    assert!(matches!(build_runtimes(&cfg), Err(EngineError::InvalidConfig(_))));
}
