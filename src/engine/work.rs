//! The unit of work a worker performs for each task.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use crate::model::Task;

/// Why a unit of work did not complete.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    #[error("{0}")]
    Failed(String),

    #[error("timed out after {}ms", .0.as_millis())]
    TimedOut(Duration),

    #[error("panicked: {0}")]
    Panicked(String),
}

/// Capability a worker calls to process one task.
///
/// Implementations run on their own tokio task, so a panic is reported as
/// [`WorkError::Panicked`] rather than taking the worker down.
pub trait WorkUnit: Send + Sync + 'static {
    fn perform(&self, task: &Task) -> impl Future<Output = Result<(), WorkError>> + Send;
}

/// Stand-in for real work: sleeps for a fixed duration.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedWork {
    pub duration: Duration,
}

impl SimulatedWork {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }
}

impl Default for SimulatedWork {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl WorkUnit for SimulatedWork {
    async fn perform(&self, _task: &Task) -> Result<(), WorkError> {
        tokio::time::sleep(self.duration).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn simulated_work_takes_its_duration() {
        let work = SimulatedWork::new(Duration::from_secs(5));
        let started = tokio::time::Instant::now();
        work.perform(&Task::new("x")).await.unwrap();
        assert!(started.elapsed() >= Duration::from_secs(5));
    }

    #[test]
    fn timeout_error_reports_milliseconds() {
        let err = WorkError::TimedOut(Duration::from_millis(1500));
        assert_eq!(err.to_string(), "timed out after 1500ms");
    }
}
