//! Tests for telemetry helpers

use prometheus_engine::util::{init_tracing, init_tracing_with_filter};

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing_with_filter("prometheus_engine=debug");
    init_tracing();
    init_tracing_with_filter("not a [valid filter");
    tracing::info!(component = "util_test", "tracing initialised");
}
