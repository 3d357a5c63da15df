//! Task processor (runtime) configuration structures.

use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// What to do with tasks when a task processor is overloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverloadAction {
    /// Only count the overload.
    #[default]
    Ignore,
    /// Cancel non-critical tasks with `CancellationReason::Overload`.
    Cancel,
}

/// Overload detection limits. Zero disables a limit.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OverloadConfig {
    /// Approximate number of queued tasks at which a newly scheduled task
    /// counts as overloaded.
    pub wait_queue_length_limit: usize,
    /// Time a task may sit on the ready queues before it counts as
    /// overloaded, in milliseconds.
    pub wait_queue_time_limit_ms: u64,
    /// Reaction to overload.
    pub action: OverloadAction,
}

/// Configuration of one task processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of worker threads.
    pub worker_threads: usize,
    /// Thread name prefix; workers are `{thread_name}-{index}`.
    pub thread_name: String,
    /// Stack size of worker threads in bytes.
    pub thread_stack_size: usize,
    /// Capacity of each worker's local queue (power of two).
    pub local_queue_capacity: usize,
    /// Every this many scheduling ticks a worker checks the global queue
    /// before its local queue.
    pub global_queue_interval: u32,
    /// Maximum tasks taken from a victim in one steal.
    pub steal_batch: usize,
    /// Rounds over all workers before a thief gives up.
    pub steal_attempts: usize,
    /// Cap on tasks moved from the global queue in one bulk pop.
    pub global_bulk_max: usize,
    /// How long shutdown waits for cancelled tasks to finish, in
    /// milliseconds.
    pub shutdown_timeout_ms: u64,
    /// Overload detection.
    pub overload: OverloadConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            worker_threads: num_cpus::get().max(1),
            thread_name: "engine-worker".into(),
            thread_stack_size: 2 * 1024 * 1024,
            local_queue_capacity: 256,
            global_queue_interval: 61,
            steal_batch: 2,
            steal_attempts: 4,
            global_bulk_max: 32,
            shutdown_timeout_ms: 5_000,
            overload: OverloadConfig::default(),
        }
    }
}

impl RuntimeConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of worker threads.
    #[must_use]
    pub const fn with_worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    /// Set the worker thread stack size.
    #[must_use]
    pub const fn with_thread_stack_size(mut self, bytes: usize) -> Self {
        self.thread_stack_size = bytes;
        self
    }

    /// Set the local queue capacity.
    #[must_use]
    pub const fn with_local_queue_capacity(mut self, capacity: usize) -> Self {
        self.local_queue_capacity = capacity;
        self
    }

    /// Set how often the global queue takes priority over the local one.
    #[must_use]
    pub const fn with_global_queue_interval(mut self, interval: u32) -> Self {
        self.global_queue_interval = interval;
        self
    }

    /// Set the steal batch size and the number of steal rounds.
    #[must_use]
    pub const fn with_stealing(mut self, batch: usize, attempts: usize) -> Self {
        self.steal_batch = batch;
        self.steal_attempts = attempts;
        self
    }

    /// Set the cap on tasks moved from the global queue in one bulk pop.
    #[must_use]
    pub const fn with_global_bulk_max(mut self, max: usize) -> Self {
        self.global_bulk_max = max;
        self
    }

    /// Set the shutdown grace period.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set overload limits.
    #[must_use]
    pub fn with_overload(mut self, overload: OverloadConfig) -> Self {
        self.overload = overload;
        self
    }

    /// Shutdown grace period.
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.worker_threads == 0 {
            return Err("worker_threads must be greater than 0".into());
        }
        if self.thread_name.is_empty() {
            return Err("thread_name must not be empty".into());
        }
        if self.thread_stack_size < 64 * 1024 {
            return Err("thread_stack_size must be at least 64 KiB".into());
        }
        if self.local_queue_capacity < 2 || !self.local_queue_capacity.is_power_of_two() {
            return Err("local_queue_capacity must be a power of two and at least 2".into());
        }
        if self.global_queue_interval == 0 {
            return Err("global_queue_interval must be greater than 0".into());
        }
        if self.steal_batch == 0 {
            return Err("steal_batch must be greater than 0".into());
        }
        if self.steal_attempts == 0 {
            return Err("steal_attempts must be greater than 0".into());
        }
        if self.global_bulk_max == 0 {
            return Err("global_bulk_max must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse a configuration from a JSON string and validate it.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Build a configuration from `ENGINE_*` environment variables, loading
    /// a `.env` file first when present. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, String> {
        let _ = dotenvy::dotenv();
        let mut cfg = Self::default();
        if let Some(v) = env_var("ENGINE_WORKER_THREADS")? {
            cfg.worker_threads = v;
        }
        if let Ok(name) = std::env::var("ENGINE_THREAD_NAME") {
            cfg.thread_name = name;
        }
        if let Some(v) = env_var("ENGINE_THREAD_STACK_SIZE")? {
            cfg.thread_stack_size = v;
        }
        if let Some(v) = env_var("ENGINE_LOCAL_QUEUE_CAPACITY")? {
            cfg.local_queue_capacity = v;
        }
        if let Some(v) = env_var("ENGINE_GLOBAL_QUEUE_INTERVAL")? {
            cfg.global_queue_interval = v;
        }
        if let Some(v) = env_var("ENGINE_STEAL_BATCH")? {
            cfg.steal_batch = v;
        }
        if let Some(v) = env_var("ENGINE_STEAL_ATTEMPTS")? {
            cfg.steal_attempts = v;
        }
        if let Some(v) = env_var("ENGINE_GLOBAL_BULK_MAX")? {
            cfg.global_bulk_max = v;
        }
        if let Some(v) = env_var("ENGINE_SHUTDOWN_TIMEOUT_MS")? {
            cfg.shutdown_timeout_ms = v;
        }
        if let Some(v) = env_var("ENGINE_OVERLOAD_QUEUE_LENGTH_LIMIT")? {
            cfg.overload.wait_queue_length_limit = v;
        }
        if let Some(v) = env_var("ENGINE_OVERLOAD_QUEUE_TIME_LIMIT_MS")? {
            cfg.overload.wait_queue_time_limit_ms = v;
        }
        if let Ok(action) = std::env::var("ENGINE_OVERLOAD_ACTION") {
            cfg.overload.action = match action.as_str() {
                "cancel" => OverloadAction::Cancel,
                "ignore" => OverloadAction::Ignore,
                other => return Err(format!("ENGINE_OVERLOAD_ACTION: unknown action `{other}`")),
            };
        }
        cfg.validate()?;
        Ok(cfg)
    }
}

fn env_var<T: FromStr>(key: &str) -> Result<Option<T>, String>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| format!("{key}: {e}")),
        Err(_) => Ok(None),
    }
}

/// Root configuration: named task processors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Map of task processor name to configuration.
    pub task_processors: HashMap<String, RuntimeConfig>,
    /// Name of the processor used when none is specified.
    pub default_task_processor: String,
}

impl EngineConfig {
    /// Validate all task processors and the default name.
    pub fn validate(&self) -> Result<(), String> {
        if self.task_processors.is_empty() {
            return Err("at least one task processor must be defined".into());
        }
        if !self.task_processors.contains_key(&self.default_task_processor) {
            return Err(format!(
                "default task processor `{}` is not defined",
                self.default_task_processor
            ));
        }
        for (name, processor) in &self.task_processors {
            processor
                .validate()
                .map_err(|e| format!("task processor `{name}` invalid: {e}"))?;
        }
        Ok(())
    }

    /// Parse engine configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }
}
