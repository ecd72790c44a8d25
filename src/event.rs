//! The unified event stream consumed by the UI.
//!
//! Keystrokes, worker notifications and animation ticks all arrive on one
//! channel. The UI is its only consumer, so UI state is mutated by exactly
//! one task and needs no locks.

use crossterm::event::{Event as TermEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::model::WorkerNotification;

/// Everything the UI state machine reacts to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppEvent {
    /// A key that edits the text input.
    Keystroke(KeyEvent),
    /// Enter: turn the input into a task.
    Submit,
    /// Esc or Ctrl-C.
    Cancel,
    /// A worker started or finished something.
    Worker(WorkerNotification),
    /// Advance busy indicators by one frame.
    Tick,
}

impl AppEvent {
    /// Translate a raw terminal event. Returns `None` for events the UI
    /// has no transition for (mouse, focus, key releases, resize).
    pub fn from_terminal(event: TermEvent) -> Option<Self> {
        let TermEvent::Key(key) = event else {
            return None;
        };
        if key.kind != KeyEventKind::Press {
            return None;
        }
        match key.code {
            KeyCode::Esc => Some(Self::Cancel),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                Some(Self::Cancel)
            }
            KeyCode::Enter => Some(Self::Submit),
            _ => Some(Self::Keystroke(key)),
        }
    }

    /// Short name used in log records.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Keystroke(_) => "keystroke",
            Self::Submit => "submit",
            Self::Cancel => "cancel",
            Self::Worker(_) => "worker",
            Self::Tick => "tick",
        }
    }
}

/// Sending half of the event stream. Cheap to clone; one per producer.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: UnboundedSender<AppEvent>,
}

impl EventSender {
    /// Queue an event for the UI. Returns `false` once the UI has gone away.
    pub fn send(&self, event: AppEvent) -> bool {
        self.tx.send(event).is_ok()
    }

    pub fn notify(&self, notification: WorkerNotification) -> bool {
        self.send(AppEvent::Worker(notification))
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Create the event stream. Unbounded so that producers (workers, the
/// ticker, the input reader) never wait on the UI; events from a single
/// producer arrive in the order it sent them.
pub fn event_stream() -> (EventSender, UnboundedReceiver<AppEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, rx)
}
