//! Builds every configured task processor.

use std::collections::HashMap;

use tracing::info;

use crate::config::EngineConfig;
use crate::core::error::EngineError;
use crate::runtime::Runtime;

/// Named runtimes built from an [`EngineConfig`].
#[derive(Debug)]
pub struct TaskProcessors {
    runtimes: HashMap<String, Runtime>,
    default: String,
}

impl TaskProcessors {
    /// Runtime registered under `name`.
    ///
    /// # Errors
    ///
    /// [`EngineError::UnknownTaskProcessor`] if no such runtime exists.
    pub fn get(&self, name: &str) -> Result<&Runtime, EngineError> {
        self.runtimes
            .get(name)
            .ok_or_else(|| EngineError::UnknownTaskProcessor(name.to_owned()))
    }

    /// Runtime named by `default_task_processor`.
    ///
    /// # Panics
    ///
    /// Never after a successful [`build_runtimes`], which checks that the
    /// default exists.
    #[must_use]
    pub fn default_processor(&self) -> &Runtime {
        &self.runtimes[&self.default]
    }

    /// Name of the default runtime.
    #[must_use]
    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Names of all runtimes, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.runtimes.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Shuts every runtime down.
    pub fn shutdown(&self) {
        for (name, runtime) in &self.runtimes {
            info!(task_processor = %name, "shutting down task processor");
            runtime.shutdown();
        }
    }
}

/// Validate `cfg` and start one runtime per configured task processor.
///
/// # Errors
///
/// - [`EngineError::InvalidConfig`] if the configuration is invalid
/// - [`EngineError::ThreadSpawn`] if a runtime cannot start its threads;
///   runtimes started before the failure are shut down
pub fn build_runtimes(cfg: &EngineConfig) -> Result<TaskProcessors, EngineError> {
    cfg.validate().map_err(EngineError::InvalidConfig)?;

    let mut runtimes = HashMap::with_capacity(cfg.task_processors.len());
    for (name, runtime_cfg) in &cfg.task_processors {
        let runtime = Runtime::new(runtime_cfg.clone())?;
        info!(
            task_processor = %name,
            worker_threads = runtime_cfg.worker_threads,
            "task processor started"
        );
        runtimes.insert(name.clone(), runtime);
    }

    Ok(TaskProcessors {
        runtimes,
        default: cfg.default_task_processor.clone(),
    })
}
