//! Integration tests for the UI event loop, driven on a test backend.

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use tokio::sync::Semaphore;
use tui_worker_pool::engine::{PoolConfig, WorkError, WorkUnit, WorkerPool};
use tui_worker_pool::event::{AppEvent, EventSender, event_stream};
use tui_worker_pool::model::{Task, WorkerId, WorkerNotification};
use tui_worker_pool::queue::TaskChannel;
use tui_worker_pool::ui::{App, Mode, event_loop, view};

/// Signals when work starts, then waits for the gate.
struct Gated {
    started: Arc<Semaphore>,
    gate: Arc<Semaphore>,
}

impl WorkUnit for Gated {
    async fn perform(&self, _task: &Task) -> Result<(), WorkError> {
        self.started.add_permits(1);
        let permit = self
            .gate
            .acquire()
            .await
            .map_err(|e| WorkError::Failed(e.to_string()))?;
        permit.forget();
        Ok(())
    }
}

fn type_task(events: &EventSender, payload: &str) {
    for c in payload.chars() {
        events.send(AppEvent::Keystroke(KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)));
    }
    events.send(AppEvent::Submit);
}

fn screen(terminal: &Terminal<TestBackend>) -> String {
    let buffer = terminal.backend().buffer();
    let width = buffer.area.width as usize;
    buffer
        .content
        .chunks(width)
        .map(|row| row.iter().map(|cell| cell.symbol()).collect::<String>())
        .collect::<Vec<_>>()
        .join("\n")
}

#[tokio::test]
async fn cancel_waits_for_busy_workers_then_exits() {
    let started = Arc::new(Semaphore::new(0));
    let gate = Arc::new(Semaphore::new(0));
    let channel = TaskChannel::new(5);
    let (events, rx) = event_stream();
    let pool = WorkerPool::spawn(
        PoolConfig {
            size: 5,
            work_timeout: None,
        },
        channel.clone(),
        events.clone(),
        Arc::new(Gated {
            started: Arc::clone(&started),
            gate: Arc::clone(&gate),
        }),
    );
    let app = App::new(5, channel.clone(), 156);

    let ui = tokio::spawn(async move {
        let mut terminal = Terminal::new(TestBackend::new(80, 10)).unwrap();
        let (mut app, mut rx) = (app, rx);
        event_loop(&mut terminal, &mut app, &mut rx, pool).await.unwrap();
        (terminal, app)
    });

    for payload in ["alpha", "beta", "gamma"] {
        type_task(&events, payload);
    }
    started.acquire_many(3).await.unwrap().forget();

    // A bogus identity must not disturb anything.
    events.notify(WorkerNotification {
        worker_id: WorkerId(42),
        status_text: "bogus".to_string(),
        busy: true,
    });
    events.send(AppEvent::Cancel);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(channel.is_closed());
    assert!(!ui.is_finished(), "ui exited while workers were busy");

    gate.add_permits(3);
    let (terminal, app) = tokio::time::timeout(Duration::from_secs(5), ui)
        .await
        .expect("ui did not exit after the pool drained")
        .unwrap();

    assert_eq!(app.mode(), Mode::Terminating);
    assert_eq!(app.busy_count(), 0);
    let mut finished: Vec<_> = app
        .slots()
        .iter()
        .filter(|s| s.status_text.starts_with("Finished"))
        .map(|s| s.status_text.clone())
        .collect();
    finished.sort();
    assert_eq!(
        finished,
        ["Finished: \"alpha\"", "Finished: \"beta\"", "Finished: \"gamma\""]
    );

    let screen = screen(&terminal);
    assert!(screen.contains("shutting down, waiting for 0 busy worker(s)"), "{screen}");
    assert!(!screen.contains("bogus"));
}

#[test]
fn rendering_twice_yields_the_same_frame() {
    let mut app = App::new(3, TaskChannel::new(3), 156);
    app.handle(AppEvent::Worker(WorkerNotification {
        worker_id: WorkerId(2),
        status_text: "Doing work... \"x\"".to_string(),
        busy: true,
    }));
    app.handle(AppEvent::Tick);

    let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
    terminal.draw(|frame| view::render(frame, &app)).unwrap();
    let first = terminal.backend().buffer().clone();
    terminal.draw(|frame| view::render(frame, &app)).unwrap();
    assert_eq!(&first, terminal.backend().buffer());

    let screen = screen(&terminal);
    assert!(screen.contains("Agent 002: ⣽ Doing work... \"x\""), "{screen}");
    assert!(screen.contains("Provide a task..."));
}
