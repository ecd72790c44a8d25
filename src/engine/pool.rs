//! Worker pool: a fixed set of workers draining the task channel.
//!
//! Workers never touch UI state. They report through the event stream:
//! one `started` notification before the work and one finish notification
//! after it, whatever the outcome.

use std::sync::Arc;
use std::time::{Duration, Instant};

use opentelemetry::KeyValue;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, warn};

use crate::event::EventSender;
use crate::model::{Task, WorkerId, WorkerNotification};
use crate::queue::{ChannelClosed, TaskChannel};
use crate::telemetry::metrics;
use crate::telemetry::work::{record_state_transition, start_task_span};

use super::work::{WorkError, WorkUnit};

/// Configuration for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Number of workers. Fixed for the life of the pool.
    pub size: usize,
    /// Upper bound on a single unit of work. `None` waits indefinitely.
    pub work_timeout: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            size: 5,
            work_timeout: None,
        }
    }
}

/// Handle to the running workers.
pub struct WorkerPool {
    workers: Vec<(WorkerId, JoinHandle<()>)>,
}

impl WorkerPool {
    /// Spawn `config.size` workers with identities `1..=size`. They block
    /// on the channel until work arrives.
    pub fn spawn<W: WorkUnit>(
        config: PoolConfig,
        channel: TaskChannel,
        events: EventSender,
        unit: Arc<W>,
    ) -> Self {
        let workers = (1..=config.size)
            .map(|n| {
                let worker = Worker {
                    id: WorkerId(n),
                    channel: channel.clone(),
                    events: events.clone(),
                    unit: Arc::clone(&unit),
                    timeout: config.work_timeout,
                };
                (worker.id, tokio::spawn(worker.run()))
            })
            .collect();

        info!(size = config.size, "worker pool started");
        Self { workers }
    }

    pub fn size(&self) -> usize {
        self.workers.len()
    }

    /// True once every worker has exited.
    pub fn is_finished(&self) -> bool {
        self.workers.iter().all(|(_, handle)| handle.is_finished())
    }

    /// Wait for every worker to observe channel closure and exit.
    pub async fn join(self) {
        for (id, handle) in self.workers {
            if let Err(e) = handle.await {
                error!(worker = %id, "worker task aborted: {e}");
            }
        }
        info!("worker pool stopped");
    }
}

struct Worker<W> {
    id: WorkerId,
    channel: TaskChannel,
    events: EventSender,
    unit: Arc<W>,
    timeout: Option<Duration>,
}

impl<W: WorkUnit> Worker<W> {
    async fn run(self) {
        debug!(worker = %self.id, "worker waiting for tasks");

        loop {
            let task = match self.channel.claim().await {
                Ok(task) => task,
                Err(ChannelClosed) => break,
            };
            if !self.process(task).await {
                warn!(worker = %self.id, "event stream closed, worker exiting");
                break;
            }
        }

        debug!(worker = %self.id, "worker observed channel closure");
    }

    /// Run one task end to end. Returns `false` if the UI is gone.
    async fn process(&self, task: Task) -> bool {
        let span = start_task_span(self.id, &task);

        async {
            record_state_transition(&span, "queued", "running");
            if !self.events.notify(WorkerNotification::started(self.id, &task)) {
                return false;
            }

            let start = Instant::now();
            let result = self.execute(&task).await;
            let duration_ms = start.elapsed().as_millis() as u64;
            metrics::task_duration_ms().record(duration_ms as f64, &[]);

            let notification = match result {
                Ok(()) => {
                    record_state_transition(&span, "running", "completed");
                    info!(worker = %self.id, task = %task.payload, duration_ms, "task finished");
                    metrics::tasks_finished().add(1, &[KeyValue::new("result", "ok")]);
                    WorkerNotification::finished(self.id, &task)
                }
                Err(e) => {
                    record_state_transition(&span, "running", "failed");
                    warn!(worker = %self.id, task = %task.payload, duration_ms, error = %e, "task failed");
                    metrics::tasks_finished().add(1, &[KeyValue::new("result", "error")]);
                    WorkerNotification::failed(self.id, &task, &e.to_string())
                }
            };
            self.events.notify(notification)
        }
        .instrument(span.clone())
        .await
    }

    /// Perform the unit of work on its own task so that a panic or a
    /// timeout is contained to this one task.
    async fn execute(&self, task: &Task) -> Result<(), WorkError> {
        let unit = Arc::clone(&self.unit);
        let owned = task.clone();
        let mut handle = tokio::spawn(async move { unit.perform(&owned).await });

        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, &mut handle).await {
                Ok(joined) => joined,
                Err(_) => {
                    handle.abort();
                    return Err(WorkError::TimedOut(limit));
                }
            },
            None => handle.await,
        };

        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => Err(WorkError::Panicked(panic_message(e.into_panic()))),
            Err(e) => Err(WorkError::Failed(e.to_string())),
        }
    }
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
