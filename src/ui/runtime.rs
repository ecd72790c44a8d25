//! Terminal runtime: owns the terminal and drives the event loop.
//!
//! Three producers feed the event stream: an input thread reading the
//! terminal, a ticker task, and the workers. The loop draws, waits for the
//! next event, and applies it. After cancel it keeps applying events until
//! every worker has exited.

use std::io::{self, Stdout, stdout};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crossterm::ExecutableCommand;
use crossterm::event;
use crossterm::terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode};
use ratatui::Terminal;
use ratatui::backend::{Backend, CrosstermBackend};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::engine::WorkerPool;
use crate::event::{AppEvent, EventSender};

use super::app::{App, Mode};
use super::view;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Raw mode plus the alternate screen, restored on drop.
struct TerminalSession {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl TerminalSession {
    fn enter() -> io::Result<Self> {
        enable_raw_mode()?;
        if let Err(e) = stdout().execute(EnterAlternateScreen) {
            let _ = disable_raw_mode();
            return Err(e);
        }
        match Terminal::new(CrosstermBackend::new(stdout())) {
            Ok(terminal) => Ok(Self { terminal }),
            Err(e) => {
                let _ = stdout().execute(LeaveAlternateScreen);
                let _ = disable_raw_mode();
                Err(e)
            }
        }
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = stdout().execute(LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Run the interactive console until cancel has been requested and every
/// worker has exited. The terminal is restored on every exit path.
pub async fn run(
    mut app: App,
    pool: WorkerPool,
    events: EventSender,
    mut rx: UnboundedReceiver<AppEvent>,
    tick_interval: Duration,
) -> io::Result<()> {
    let mut session = TerminalSession::enter()?;
    info!(workers = pool.size(), "console started");

    let stop = Arc::new(AtomicBool::new(false));
    let reader = spawn_input_reader(events.clone(), Arc::clone(&stop));
    let ticker = spawn_ticker(events, tick_interval);

    let result = event_loop(&mut session.terminal, &mut app, &mut rx, pool).await;

    stop.store(true, Ordering::Relaxed);
    ticker.abort();
    if reader.join().is_err() {
        error!("input reader panicked");
    }
    drop(session);
    info!("console stopped");
    result
}

/// Draw, wait for an event, apply it; repeat. Returns once the app is
/// terminating and the pool has drained.
pub async fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    rx: &mut UnboundedReceiver<AppEvent>,
    pool: WorkerPool,
) -> io::Result<()> {
    let drained = pool.join();
    tokio::pin!(drained);
    let mut events_open = true;

    loop {
        terminal.draw(|frame| view::render(frame, app))?;
        tokio::select! {
            biased;
            event = rx.recv(), if events_open => match event {
                Some(event) => app.handle(event),
                None => {
                    // Every producer is gone; nothing can cancel any more.
                    events_open = false;
                    app.handle(AppEvent::Cancel);
                }
            },
            () = &mut drained, if app.mode() == Mode::Terminating => break,
        }
    }

    // Finish notifications sent just before the workers exited.
    while let Ok(event) = rx.try_recv() {
        app.handle(event);
    }
    terminal.draw(|frame| view::render(frame, app))?;
    Ok(())
}

fn spawn_ticker(events: EventSender, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticks = tokio::time::interval(interval);
        ticks.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            ticks.tick().await;
            if !events.send(AppEvent::Tick) {
                break;
            }
        }
    })
}

/// Terminal reads block, so they get their own thread.
fn spawn_input_reader(events: EventSender, stop: Arc<AtomicBool>) -> thread::JoinHandle<()> {
    thread::spawn(move || {
        while !stop.load(Ordering::Relaxed) {
            match event::poll(INPUT_POLL) {
                Ok(false) => {}
                Ok(true) => match event::read() {
                    Ok(raw) => {
                        if let Some(event) = AppEvent::from_terminal(raw) {
                            if !events.send(event) {
                                break;
                            }
                        }
                    }
                    Err(e) => {
                        error!("terminal read failed: {e}");
                        events.send(AppEvent::Cancel);
                        break;
                    }
                },
                Err(e) => {
                    error!("terminal poll failed: {e}");
                    events.send(AppEvent::Cancel);
                    break;
                }
            }
        }
    })
}
