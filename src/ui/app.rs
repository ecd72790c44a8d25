//! UI state machine.
//!
//! [`App`] owns every piece of visual state and changes it only in
//! [`App::handle`], one event at a time. Nothing in here blocks: task
//! submission is non-blocking and a full queue becomes a notice.

use tracing::{debug, info, trace, warn};

use crate::event::AppEvent;
use crate::model::{Task, WorkerId, WorkerNotification};
use crate::queue::{QueueError, TaskChannel};

use super::input::TextInput;
use super::spinner::{Spinner, slot_color};

pub const PLACEHOLDER: &str = "Provide a task...";
pub const QUEUE_FULL_NOTICE: &str = "task queue is full, try again shortly";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Accepting input and events.
    Running,
    /// Cancel was requested. Only worker notifications and ticks apply.
    Terminating,
}

/// Visual state for one worker.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    pub id: WorkerId,
    /// True iff the indicator is animating.
    pub busy: bool,
    pub status_text: String,
    pub indicator: Spinner,
}

impl WorkerSlot {
    fn new(index: usize) -> Self {
        Self {
            id: WorkerId(index + 1),
            busy: false,
            status_text: String::new(),
            indicator: Spinner::new(slot_color(index)),
        }
    }

    fn apply(&mut self, notification: WorkerNotification) {
        if notification.busy && !self.busy {
            self.indicator.reset();
        }
        self.busy = notification.busy;
        self.status_text = notification.status_text;
    }
}

pub struct App {
    slots: Vec<WorkerSlot>,
    input: TextInput,
    mode: Mode,
    channel: TaskChannel,
    notice: Option<String>,
}

impl App {
    /// One slot per worker, addressed by `WorkerId(1..=pool_size)`.
    pub fn new(pool_size: usize, channel: TaskChannel, input_char_limit: usize) -> Self {
        Self {
            slots: (0..pool_size).map(WorkerSlot::new).collect(),
            input: TextInput::new(input_char_limit, PLACEHOLDER),
            mode: Mode::Running,
            channel,
            notice: None,
        }
    }

    /// Apply exactly one transition for `event`.
    pub fn handle(&mut self, event: AppEvent) {
        if matches!(event, AppEvent::Tick) {
            trace!(event = event.kind(), "ui event");
        } else {
            debug!(event = event.kind(), mode = ?self.mode, "ui event");
        }

        match event {
            AppEvent::Keystroke(key) => {
                if self.mode == Mode::Running {
                    self.input.handle_key(key);
                }
            }
            AppEvent::Submit => {
                if self.mode == Mode::Running {
                    self.submit();
                }
            }
            AppEvent::Cancel => self.cancel(),
            AppEvent::Worker(notification) => self.apply_notification(notification),
            AppEvent::Tick => {
                for slot in self.slots.iter_mut().filter(|s| s.busy) {
                    slot.indicator.advance();
                }
            }
        }
    }

    fn submit(&mut self) {
        if self.input.is_empty() {
            return;
        }
        let task = Task::new(self.input.take());
        let (id, payload) = (task.id, task.payload.clone());
        match self.channel.try_submit(task) {
            Ok(()) => {
                self.notice = None;
                info!(task.id = %id, task.payload = %payload, queued = self.channel.len(), "task submitted");
            }
            Err(QueueError::Full(task)) => {
                self.input.set_value(&task.payload);
                self.notice = Some(QUEUE_FULL_NOTICE.to_string());
                warn!(task.payload = %task.payload, capacity = self.channel.capacity(), "task queue full, submission rejected");
            }
            Err(QueueError::Closed) => {
                warn!(task.payload = %payload, "task queue closed, submission dropped");
            }
        }
    }

    fn cancel(&mut self) {
        if self.mode == Mode::Terminating {
            return;
        }
        self.mode = Mode::Terminating;
        self.notice = None;
        self.channel.close();
        info!(busy = self.busy_count(), "shutdown requested");
    }

    fn apply_notification(&mut self, notification: WorkerNotification) {
        let Some(index) = notification.worker_id.slot_index(self.slots.len()) else {
            warn!(
                worker = notification.worker_id.0,
                slots = self.slots.len(),
                "notification for unknown worker ignored"
            );
            return;
        };
        debug!(
            worker = %notification.worker_id,
            busy = notification.busy,
            status = %notification.status_text,
            "slot updated"
        );
        self.slots[index].apply(notification);
    }

    pub fn slots(&self) -> &[WorkerSlot] {
        &self.slots
    }

    pub fn input(&self) -> &TextInput {
        &self.input
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn notice(&self) -> Option<&str> {
        self.notice.as_deref()
    }

    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| s.busy).count()
    }

    pub fn queued(&self) -> usize {
        self.channel.len()
    }

    pub fn queue_capacity(&self) -> usize {
        self.channel.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn typed(app: &mut App, s: &str) {
        for c in s.chars() {
            app.handle(AppEvent::Keystroke(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
        }
    }

    fn notification(id: usize, text: &str, busy: bool) -> AppEvent {
        AppEvent::Worker(WorkerNotification {
            worker_id: WorkerId(id),
            status_text: text.to_string(),
            busy,
        })
    }

    #[tokio::test]
    async fn submit_queues_the_input_and_clears_it() {
        let channel = TaskChannel::new(2);
        let mut app = App::new(2, channel.clone(), 156);
        typed(&mut app, "build-report");
        app.handle(AppEvent::Submit);

        assert!(app.input().is_empty());
        assert_eq!(channel.claim().await.unwrap().payload, "build-report");
    }

    #[test]
    fn empty_submit_is_ignored() {
        let channel = TaskChannel::new(1);
        let mut app = App::new(1, channel.clone(), 156);
        app.handle(AppEvent::Submit);
        assert!(channel.is_empty());
    }

    #[test]
    fn full_queue_keeps_the_input_and_shows_a_notice() {
        let channel = TaskChannel::new(1);
        let mut app = App::new(1, channel.clone(), 156);
        typed(&mut app, "a");
        app.handle(AppEvent::Submit);
        typed(&mut app, "b");
        app.handle(AppEvent::Submit);

        assert_eq!(channel.len(), 1);
        assert_eq!(app.input().value(), "b");
        assert_eq!(app.notice(), Some(QUEUE_FULL_NOTICE));
    }

    #[test]
    fn notification_updates_only_its_slot() {
        let mut app = App::new(3, TaskChannel::new(3), 156);
        app.handle(notification(2, "Doing work... \"x\"", true));

        assert!(!app.slots()[0].busy);
        assert!(app.slots()[1].busy);
        assert_eq!(app.slots()[1].status_text, "Doing work... \"x\"");
        assert!(!app.slots()[2].busy);
    }

    #[test]
    fn out_of_range_worker_is_ignored() {
        let mut app = App::new(2, TaskChannel::new(2), 156);
        app.handle(notification(0, "bogus", true));
        app.handle(notification(3, "bogus", true));
        assert_eq!(app.busy_count(), 0);
        assert!(app.slots().iter().all(|s| s.status_text.is_empty()));
    }

    #[test]
    fn tick_advances_busy_slots_only() {
        let mut app = App::new(2, TaskChannel::new(2), 156);
        app.handle(notification(1, "busy", true));
        app.handle(AppEvent::Tick);

        assert_eq!(app.slots()[0].indicator.render(), "⣽");
        assert_eq!(app.slots()[1].indicator.render(), "⣾");
    }

    #[test]
    fn restarting_a_slot_resets_its_indicator() {
        let mut app = App::new(1, TaskChannel::new(1), 156);
        app.handle(notification(1, "one", true));
        app.handle(AppEvent::Tick);
        app.handle(notification(1, "done", false));
        app.handle(AppEvent::Tick);
        assert_eq!(app.slots()[0].indicator.render(), "⣽");

        app.handle(notification(1, "two", true));
        assert_eq!(app.slots()[0].indicator.render(), "⣾");
    }

    #[test]
    fn cancel_closes_the_channel_and_freezes_input() {
        let channel = TaskChannel::new(2);
        let mut app = App::new(2, channel.clone(), 156);
        app.handle(notification(1, "busy", true));
        app.handle(AppEvent::Cancel);

        assert_eq!(app.mode(), Mode::Terminating);
        assert!(channel.is_closed());

        typed(&mut app, "late");
        app.handle(AppEvent::Submit);
        assert!(app.input().is_empty());

        // Workers still report while draining.
        app.handle(notification(1, "Finished", false));
        assert_eq!(app.busy_count(), 0);
    }
}
