//! Metric instrument factories for tui-worker-pool.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! All instruments are created lazily from the `"tui-worker-pool"` meter;
//! without an OTLP endpoint they are no-ops.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for tui-worker-pool instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("tui-worker-pool")
}

/// Counter: tasks offered to the task channel.
/// Labels: `result` ("ok" | "full" | "closed").
pub fn tasks_submitted() -> Counter<u64> {
    meter()
        .u64_counter("workpool.tasks.submitted")
        .with_description("Number of tasks offered to the task channel")
        .build()
}

/// Counter: tasks a worker finished, successfully or not.
/// Labels: `result` ("ok" | "error").
pub fn tasks_finished() -> Counter<u64> {
    meter()
        .u64_counter("workpool.tasks.finished")
        .with_description("Number of tasks finished by workers")
        .build()
}

/// Counter: records a log sink failed to accept.
/// Labels: `sink`.
pub fn sink_failures() -> Counter<u64> {
    meter()
        .u64_counter("workpool.sink.failures")
        .with_description("Number of log records a sink failed to accept")
        .build()
}

/// Histogram: time a worker spent on one task, in milliseconds.
pub fn task_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("workpool.task.duration_ms")
        .with_description("Task duration in milliseconds")
        .with_unit("ms")
        .build()
}
