//! Typewriter pacing, independent of the frame rate.
//!
//! Each tick adds `chars_per_second / fps` to a fractional carry; the whole
//! part of the carry is revealed and subtracted. Given a fixed tick the
//! reveal is fully deterministic.

use crate::layout::{LayoutContext, TextLayout};
use crate::markup::{LineKind, SourceLine};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    Idle,
    Revealing,
    Done,
}

#[derive(Debug, Clone)]
pub struct RevealScheduler {
    total: usize,
    revealed: usize,
    carry: f64,
    per_tick: f64,
    phase: RevealPhase,
}

impl RevealScheduler {
    /// `chars_per_second` and `fps` must be positive; the session validates both.
    pub fn new(total_chars: usize, chars_per_second: f64, fps: u32) -> Self {
        Self {
            total: total_chars,
            revealed: 0,
            carry: 0.0,
            per_tick: chars_per_second / f64::from(fps.max(1)),
            phase: if total_chars == 0 {
                RevealPhase::Done
            } else {
                RevealPhase::Idle
            },
        }
    }

    /// Advances one frame tick and returns how many characters became visible.
    pub fn tick(&mut self) -> usize {
        if self.phase == RevealPhase::Done {
            return 0;
        }
        self.phase = RevealPhase::Revealing;

        self.carry += self.per_tick;
        let whole = self.carry.floor();
        self.carry -= whole;

        let step = (whole as usize).min(self.total - self.revealed);
        self.revealed += step;
        if self.revealed == self.total {
            self.phase = RevealPhase::Done;
        }
        step
    }

    pub fn revealed(&self) -> usize {
        self.revealed
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        self.phase == RevealPhase::Done
    }

    pub fn carry(&self) -> f64 {
        self.carry
    }
}

/// Maps a revealed character count onto the source lines of one block.
///
/// Lines are joined by one newline character each. A line is committed to
/// the layout once its trailing newline is revealed (or, for the last line,
/// once all of it is); the rest of the revealed text becomes the layout tail.
#[derive(Debug, Clone)]
pub struct BlockCursor {
    lines: Vec<SourceLine>,
    lengths: Vec<usize>,
    committed: usize,
    consumed: usize,
}

impl BlockCursor {
    pub fn new(lines: Vec<SourceLine>) -> Self {
        let lengths = lines.iter().map(SourceLine::char_len).collect();
        Self {
            lines,
            lengths,
            committed: 0,
            consumed: 0,
        }
    }

    /// Characters in the block, counting one per line break.
    pub fn total_chars(&self) -> usize {
        let text: usize = self.lengths.iter().sum();
        text + self.lines.len().saturating_sub(1)
    }

    pub fn sync(&mut self, revealed: usize, layout: &mut TextLayout, ctx: &LayoutContext<'_>) {
        let count = self.lines.len();
        while self.committed < count {
            let idx = self.committed;
            let needed = self.lengths[idx] + usize::from(idx + 1 < count);
            if revealed.saturating_sub(self.consumed) < needed {
                break;
            }
            layout.commit(&self.lines[idx], ctx);
            self.consumed += needed;
            self.committed += 1;
        }

        if self.committed < count {
            let visible = revealed.saturating_sub(self.consumed);
            let partial = self.lines[self.committed].prefix(visible);
            layout.set_tail(Some(&partial), ctx);
        } else {
            layout.set_tail(None, ctx);
        }
    }
}

/// Scroll speed that keeps pace with the reveal: one line height (plus
/// margin) per `average_chars_per_line` revealed characters.
pub fn derived_scroll_rate(
    chars_per_second: f64,
    average_chars_per_line: f64,
    line_advance: f32,
    fps: u32,
) -> f32 {
    let lines_per_second = chars_per_second / average_chars_per_line.max(1.0);
    (lines_per_second * f64::from(line_advance) / f64::from(fps.max(1))) as f32
}

/// Line advance of body text, used when deriving the scroll rate.
pub fn body_line_advance(ctx: &LayoutContext<'_>, line_margin: f32) -> f32 {
    let face = ctx.styles.line_face(LineKind::Body);
    ctx.typeface.line_metrics(face).height + line_margin
}
