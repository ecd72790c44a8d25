//! Task execution span helpers.
//!
//! Provides span creation and state-transition recording for tasks
//! flowing through the worker pool.

use tracing::Span;

use crate::model::{Task, WorkerId};

/// Start a span for one worker executing one task.
///
/// The `task.state` field is declared empty and can be updated via
/// [`record_state_transition`].
pub fn start_task_span(worker: WorkerId, task: &Task) -> Span {
    tracing::info_span!(
        "task.execute",
        "worker.id" = worker.0,
        "task.id" = %task.id,
        "task.payload" = %task.payload,
        "task.state" = tracing::field::Empty,
    )
}

/// Record a state transition on the given span.
///
/// Updates `task.state` and emits a tracing `info` event scoped to the span.
pub fn record_state_transition(span: &Span, from: &str, to: &str) {
    span.record("task.state", to);
    span.in_scope(|| {
        tracing::info!(from = from, to = to, "state_transition");
    });
}
