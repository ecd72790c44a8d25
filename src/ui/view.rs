//! Rendering. A pure function of [`App`] state; drawing twice without an
//! event in between produces the same frame.

use ratatui::prelude::*;
use ratatui::layout::Position;
use ratatui::widgets::Paragraph;

use super::app::{App, Mode, WorkerSlot};

const GREY: Color = Color::DarkGray;

/// Prompt, one line per worker slot, then the footer.
pub fn lines(app: &App) -> Vec<Line<'static>> {
    let mut lines = Vec::with_capacity(app.slots().len() + 4);
    lines.push(input_line(app));
    lines.push(Line::default());
    lines.extend(app.slots().iter().map(slot_line));
    lines.push(Line::default());
    lines.push(footer_line(app));
    lines
}

fn input_line(app: &App) -> Line<'static> {
    let input = app.input();
    let body = if input.is_empty() {
        Span::styled(input.placeholder().to_string(), Style::default().fg(GREY))
    } else {
        Span::raw(input.value().to_string())
    };
    Line::from(vec![Span::raw("> "), body])
}

fn slot_line(slot: &WorkerSlot) -> Line<'static> {
    let label = format!("Agent {}:", slot.id);
    if slot.busy {
        Line::from(vec![
            Span::raw(label),
            Span::raw(" "),
            slot.indicator.span(),
            Span::raw(" "),
            Span::raw(slot.status_text.clone()),
        ])
    } else {
        let grey = Style::default().fg(GREY);
        Line::from(vec![
            Span::styled(label, grey),
            Span::raw(" "),
            Span::styled(slot.status_text.clone(), grey),
        ])
    }
}

fn footer_line(app: &App) -> Line<'static> {
    let mut parts = vec![format!("queued {}/{}", app.queued(), app.queue_capacity())];
    if let Some(notice) = app.notice() {
        parts.push(notice.to_string());
    }
    match app.mode() {
        Mode::Running => parts.push("enter: submit  esc: quit".to_string()),
        Mode::Terminating => parts.push(format!(
            "shutting down, waiting for {} busy worker(s)",
            app.busy_count()
        )),
    }
    Line::styled(parts.join("  |  "), Style::default().fg(GREY))
}

/// Draw the whole UI into `frame` and place the cursor in the input.
pub fn render(frame: &mut Frame, app: &App) {
    let area = frame.area();
    frame.render_widget(Paragraph::new(lines(app)), area);

    if app.mode() == Mode::Running && area.height > 0 {
        let x = area.x + 2 + app.input().cursor() as u16;
        frame.set_cursor_position(Position::new(x.min(area.right().saturating_sub(1)), area.y));
    }
}
