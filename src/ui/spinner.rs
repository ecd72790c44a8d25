//! Busy indicator: a cyclic glyph animation advanced by ticks.

use ratatui::style::{Color, Style};
use ratatui::text::Span;

/// Predefined frame sequences.
pub struct SpinnerFrames;

impl SpinnerFrames {
    /// Braille dots, one full turn in eight frames.
    pub const DOTS: &'static [&'static str] = &["⣾", "⣽", "⣻", "⢿", "⡿", "⣟", "⣯", "⣷"];
}

/// Animation state for one worker slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spinner {
    frames: &'static [&'static str],
    frame: usize,
    color: Color,
}

impl Spinner {
    /// A dots spinner drawn in `color`.
    pub fn new(color: Color) -> Self {
        Self::with_frames(SpinnerFrames::DOTS, color)
    }

    pub fn with_frames(frames: &'static [&'static str], color: Color) -> Self {
        Self {
            frames,
            frame: 0,
            color,
        }
    }

    /// Move to the next frame, wrapping at the end.
    pub fn advance(&mut self) {
        if !self.frames.is_empty() {
            self.frame = (self.frame + 1) % self.frames.len();
        }
    }

    /// Back to the first frame.
    pub fn reset(&mut self) {
        self.frame = 0;
    }

    /// The current frame as text.
    pub fn render(&self) -> &'static str {
        self.frames.get(self.frame).copied().unwrap_or(" ")
    }

    /// The current frame styled for display.
    pub fn span(&self) -> Span<'static> {
        Span::styled(self.render(), Style::default().fg(self.color))
    }
}

/// Colour for the spinner of slot `index` (zero-based), cycling through
/// ANSI colours 1 to 5.
pub fn slot_color(index: usize) -> Color {
    Color::Indexed((index % 5) as u8 + 1)
}
