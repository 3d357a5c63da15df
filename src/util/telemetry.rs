//! Telemetry helpers for structured logging.
//!
//! The engine logs through `tracing` with `worker_id`, `task_id` and
//! `runtime` fields. Applications may install their own subscriber; these
//! helpers install a formatting subscriber when none is set.

use tracing_subscriber::EnvFilter;

/// Install an env-filtered subscriber (`RUST_LOG`) unless one is already set.
pub fn init_tracing() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .try_init();
}

/// Like [`init_tracing`] but with an explicit filter directive such as
/// `"prometheus_engine=debug"`. Falls back to `RUST_LOG` if the directive
/// does not parse.
pub fn init_tracing_with_filter(directive: &str) {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|_| EnvFilter::from_default_env());
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .try_init();
}
