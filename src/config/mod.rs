//! Configuration models for task processors, queues and overload handling.

pub mod runtime;

pub use runtime::{EngineConfig, OverloadAction, OverloadConfig, RuntimeConfig};
