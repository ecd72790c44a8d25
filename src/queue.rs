//! Task channel: the bounded FIFO between the UI and the worker pool.
//!
//! The UI is the only producer, the workers are the consumers. A task is
//! handed to exactly one worker. Closing is one-way: pending and future
//! claims return [`ChannelClosed`] even if tasks are still buffered.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Mutex, mpsc, watch};
use tracing::debug;

use crate::model::Task;
use crate::telemetry::metrics;
use opentelemetry::KeyValue;

#[derive(Debug, Error)]
pub enum QueueError {
    /// Non-blocking submit found no free space. The task is handed back.
    #[error("task queue is full")]
    Full(Box<Task>),

    /// The channel was closed; this is the normal shutdown signal.
    #[error("task queue is closed")]
    Closed,
}

/// The only way a claim ends without a task: the channel was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("task queue is closed")]
pub struct ChannelClosed;

/// Shared handle to the task channel. Clones refer to the same queue.
#[derive(Debug, Clone)]
pub struct TaskChannel {
    tx: mpsc::Sender<Task>,
    rx: Arc<Mutex<mpsc::Receiver<Task>>>,
    closed: Arc<watch::Sender<bool>>,
}

impl TaskChannel {
    /// Create a channel holding at most `capacity` queued tasks (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let (closed, _) = watch::channel(false);
        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            closed: Arc::new(closed),
        }
    }

    /// Maximum number of queued (unclaimed) tasks.
    pub fn capacity(&self) -> usize {
        self.tx.max_capacity()
    }

    /// Number of tasks waiting to be claimed.
    pub fn len(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Queue a task without waiting. Fails with `Full` when the queue is at
    /// capacity, or `Closed` after [`close`](Self::close).
    pub fn try_submit(&self, task: Task) -> Result<(), QueueError> {
        if self.is_closed() {
            record_submit("closed");
            return Err(QueueError::Closed);
        }
        let result = self.tx.try_send(task).map_err(|e| match e {
            mpsc::error::TrySendError::Full(task) => QueueError::Full(Box::new(task)),
            mpsc::error::TrySendError::Closed(_) => QueueError::Closed,
        });
        record_submit(match &result {
            Ok(()) => "ok",
            Err(QueueError::Full(_)) => "full",
            Err(QueueError::Closed) => "closed",
        });
        result
    }

    /// Queue a task, waiting for space. Returns `Closed` if the channel is
    /// closed before space frees up; the task is dropped in that case.
    pub async fn submit(&self, task: Task) -> Result<(), QueueError> {
        let mut closed = self.closed.subscribe();
        if *closed.borrow_and_update() {
            record_submit("closed");
            return Err(QueueError::Closed);
        }
        let result = tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(QueueError::Closed),
            sent = self.tx.send(task) => sent.map_err(|_| QueueError::Closed),
        };
        record_submit(if result.is_ok() { "ok" } else { "closed" });
        result
    }

    /// Wait for the next task. Each task is returned to exactly one caller.
    pub async fn claim(&self) -> Result<Task, ChannelClosed> {
        let mut closed = self.closed.subscribe();
        tokio::select! {
            biased;
            _ = closed.wait_for(|c| *c) => Err(ChannelClosed),
            task = async { self.rx.lock().await.recv().await } => task.ok_or(ChannelClosed),
        }
    }

    /// Close the channel. Idempotent; returns `true` only for the call that
    /// actually closed it. Tasks still queued are abandoned.
    pub fn close(&self) -> bool {
        let was_closed = self.closed.send_replace(true);
        if !was_closed {
            debug!(abandoned = self.len(), "task channel closed");
        }
        !was_closed
    }
}

fn record_submit(result: &'static str) {
    metrics::tasks_submitted().add(1, &[KeyValue::new("result", result)]);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::time::Duration;

    #[tokio::test]
    async fn claims_in_fifo_order() {
        let channel = TaskChannel::new(3);
        for payload in ["a", "b", "c"] {
            channel.try_submit(Task::new(payload)).unwrap();
        }
        assert_eq!(channel.len(), 3);

        for expected in ["a", "b", "c"] {
            assert_eq!(channel.claim().await.unwrap().payload, expected);
        }
        assert!(channel.is_empty());
    }

    #[tokio::test]
    async fn try_submit_reports_full_and_returns_the_task() {
        let channel = TaskChannel::new(1);
        channel.try_submit(Task::new("first")).unwrap();

        match channel.try_submit(Task::new("second")) {
            Err(QueueError::Full(task)) => assert_eq!(task.payload, "second"),
            other => panic!("expected Full, got {other:?}"),
        }
        // The rejected task did not displace the queued one.
        assert_eq!(channel.claim().await.unwrap().payload, "first");
    }

    #[tokio::test]
    async fn blocking_submit_waits_for_space() {
        let channel = TaskChannel::new(1);
        channel.try_submit(Task::new("first")).unwrap();

        let blocked = tokio::time::timeout(
            Duration::from_millis(50),
            channel.submit(Task::new("second")),
        )
        .await;
        assert!(blocked.is_err(), "submit should wait while the queue is full");

        let producer = channel.clone();
        let handle = tokio::spawn(async move { producer.submit(Task::new("third")).await });
        assert_eq!(channel.claim().await.unwrap().payload, "first");
        handle.await.unwrap().unwrap();
        assert_eq!(channel.claim().await.unwrap().payload, "third");
    }

    #[tokio::test]
    async fn close_releases_a_waiting_submit() {
        let channel = TaskChannel::new(1);
        channel.try_submit(Task::new("first")).unwrap();

        let producer = channel.clone();
        let waiting = tokio::spawn(async move { producer.submit(Task::new("second")).await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiting.is_finished(), "submit should wait while the queue is full");

        assert!(channel.close());
        let released = tokio::time::timeout(Duration::from_secs(1), waiting)
            .await
            .expect("close did not release the waiting submit")
            .unwrap();
        assert!(matches!(released, Err(QueueError::Closed)));
        assert_eq!(channel.len(), 1);
    }

    #[tokio::test]
    async fn close_releases_waiting_claims() {
        let channel = TaskChannel::new(2);
        let mut waiters = Vec::new();
        for _ in 0..3 {
            let c = channel.clone();
            waiters.push(tokio::spawn(async move { c.claim().await }));
        }
        tokio::task::yield_now().await;

        assert!(channel.close());
        for waiter in waiters {
            assert_eq!(waiter.await.unwrap(), Err(ChannelClosed));
        }
    }

    #[tokio::test]
    async fn close_is_idempotent_and_rejects_later_work() {
        let channel = TaskChannel::new(2);
        channel.try_submit(Task::new("queued")).unwrap();

        assert!(channel.close());
        assert!(!channel.close());
        assert!(channel.is_closed());

        assert!(matches!(
            channel.try_submit(Task::new("late")),
            Err(QueueError::Closed)
        ));
        assert!(matches!(
            channel.submit(Task::new("late")).await,
            Err(QueueError::Closed)
        ));
        // Buffered work is not handed out after closure.
        assert_eq!(channel.claim().await, Err(ChannelClosed));
    }

    #[tokio::test]
    async fn each_task_is_claimed_once() {
        let channel = TaskChannel::new(16);
        let mut claimers = Vec::new();
        for _ in 0..4 {
            let c = channel.clone();
            claimers.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                while let Ok(task) = c.claim().await {
                    seen.push(task.id);
                }
                seen
            }));
        }

        let mut submitted = HashSet::new();
        for i in 0..40 {
            let task = Task::new(format!("task-{i}"));
            submitted.insert(task.id);
            channel.submit(task).await.unwrap();
        }
        while !channel.is_empty() {
            tokio::task::yield_now().await;
        }
        channel.close();

        let mut claimed = Vec::new();
        for claimer in claimers {
            claimed.extend(claimer.await.unwrap());
        }
        let unique: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(claimed.len(), unique.len(), "a task was claimed twice");
        assert_eq!(unique, submitted);
    }
}
