//! Core data model.
//!
//! A task is an opaque payload typed by the user. Workers are addressed by a
//! stable identity in `1..=N` and report progress with notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work submitted from the text input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier, used to correlate log records.
    pub id: TaskId,

    /// The text the user typed. Never interpreted by the pool.
    pub payload: String,

    pub submitted_at: DateTime<Utc>,
}

impl Task {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            id: TaskId::new(),
            payload: payload.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Newtype for task IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Short display: first 8 chars of UUID
        write!(f, "{}", &self.0.to_string()[..8])
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Worker identity
// ---------------------------------------------------------------------------

/// Identity of a worker, 1-based. Also the address of its UI slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct WorkerId(pub usize);

impl WorkerId {
    /// Position of this worker's slot in a zero-based collection of
    /// `pool_size` slots, or `None` if the identity is out of range.
    pub fn slot_index(self, pool_size: usize) -> Option<usize> {
        (1..=pool_size).contains(&self.0).then(|| self.0 - 1)
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:03}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Notification
// ---------------------------------------------------------------------------

/// A worker's report that it started or finished a task.
///
/// Built by the worker, consumed exactly once by the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerNotification {
    pub worker_id: WorkerId,
    pub status_text: String,
    pub busy: bool,
}

impl WorkerNotification {
    pub fn started(worker_id: WorkerId, task: &Task) -> Self {
        Self {
            worker_id,
            status_text: format!("Doing work... {:?}", task.payload),
            busy: true,
        }
    }

    pub fn finished(worker_id: WorkerId, task: &Task) -> Self {
        Self {
            worker_id,
            status_text: format!("Finished: {:?}", task.payload),
            busy: false,
        }
    }

    pub fn failed(worker_id: WorkerId, task: &Task, reason: &str) -> Self {
        Self {
            worker_id,
            status_text: format!("Failed: {:?} ({reason})", task.payload),
            busy: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_id_maps_to_slot_index() {
        assert_eq!(WorkerId(1).slot_index(5), Some(0));
        assert_eq!(WorkerId(5).slot_index(5), Some(4));
        assert_eq!(WorkerId(0).slot_index(5), None);
        assert_eq!(WorkerId(6).slot_index(5), None);
    }

    #[test]
    fn worker_id_displays_zero_padded() {
        assert_eq!(WorkerId(1).to_string(), "001");
        assert_eq!(WorkerId(42).to_string(), "042");
    }

    #[test]
    fn notifications_quote_the_payload() {
        let task = Task::new("build-report");
        let started = WorkerNotification::started(WorkerId(1), &task);
        assert!(started.busy);
        assert_eq!(started.status_text, "Doing work... \"build-report\"");

        let finished = WorkerNotification::finished(WorkerId(1), &task);
        assert!(!finished.busy);
        assert_eq!(finished.status_text, "Finished: \"build-report\"");

        let failed = WorkerNotification::failed(WorkerId(2), &task, "timed out");
        assert!(!failed.busy);
        assert!(failed.status_text.contains("timed out"));
    }
}
