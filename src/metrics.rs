//! Metric instrument factories for taskq.
//!
//! Uses the OTel Meter API with the globally-registered `MeterProvider`.
//! Until a provider is installed the global meter is a no-op, so
//! instruments are always safe to record against.

use opentelemetry::metrics::{Counter, Histogram, Meter};

/// Returns the shared meter for taskq instruments.
fn meter() -> Meter {
    opentelemetry::global::meter("taskq")
}

/// Counter: tasks that completed successfully.
pub fn task_success() -> Counter<u64> {
    meter()
        .u64_counter("taskq.task.success")
        .with_description("Successful tasks")
        .build()
}

/// Counter: tasks that failed, were canceled, or panicked.
pub fn task_failure() -> Counter<u64> {
    meter()
        .u64_counter("taskq.task.failure")
        .with_description("Failed tasks")
        .build()
}

/// Histogram: task execution duration in milliseconds.
pub fn task_exec_duration_ms() -> Histogram<f64> {
    meter()
        .f64_histogram("taskq.task.exec_duration_ms")
        .with_description("Task execution duration")
        .with_unit("ms")
        .build()
}

/// Counter: queue-level operations (publish, receive).
/// Labels: `operation`.
pub fn queue_operations() -> Counter<u64> {
    meter()
        .u64_counter("taskq.queue.operations")
        .with_description("Number of queue operations")
        .build()
}
