//! Word-wrapping against a pixel budget.
//!
//! [`LayoutContext::wrap`] lays out one [`SourceLine`]; [`TextLayout`] keeps
//! the wrapped output of every fully revealed line and only re-wraps the line
//! still being revealed. Committed lines are dropped from the front once the
//! retained character budget is exceeded.

use std::collections::VecDeque;

use crate::fonts::{StyleTable, Typeface};
use crate::markup::{preprocess, resolve_spans, LineKind, SourceLine, SpanStyle, TextSpan};

/// One wrapped line ready to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct DisplayLine {
    pub kind: LineKind,
    pub spans: Vec<TextSpan>,
    pub height: f32,
    pub ascent: f32,
}

impl DisplayLine {
    pub fn text(&self) -> String {
        self.spans.iter().map(|span| span.text.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.spans.iter().all(|span| span.text.is_empty())
    }
}

#[derive(Clone, Copy)]
pub struct LayoutContext<'a> {
    pub typeface: &'a dyn Typeface,
    pub styles: &'a StyleTable,
    pub max_width: f32,
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    ch: char,
    style: SpanStyle,
    width: f32,
}

impl<'a> LayoutContext<'a> {
    pub fn new(typeface: &'a dyn Typeface, styles: &'a StyleTable, max_width: f32) -> Self {
        Self {
            typeface,
            styles,
            max_width,
        }
    }

    fn char_width(&self, kind: LineKind, style: SpanStyle, ch: char) -> f32 {
        self.typeface.advance(self.styles.face(kind, style), ch)
    }

    /// Rendered width of a display line.
    pub fn measure(&self, line: &DisplayLine) -> f32 {
        line.spans
            .iter()
            .flat_map(|span| span.text.chars().map(move |ch| (span.style, ch)))
            .map(|(style, ch)| self.char_width(line.kind, style, ch))
            .sum()
    }

    fn empty_line(&self, kind: LineKind) -> DisplayLine {
        let metrics = self.typeface.line_metrics(self.styles.line_face(kind));
        DisplayLine {
            kind,
            spans: Vec::new(),
            height: metrics.height,
            ascent: metrics.ascent,
        }
    }

    fn finish_line(&self, kind: LineKind, cells: &[Cell]) -> DisplayLine {
        let mut line = self.empty_line(kind);
        for cell in cells {
            match line.spans.last_mut() {
                Some(span) if span.style == cell.style => span.text.push(cell.ch),
                _ => line.spans.push(TextSpan::new(cell.style, cell.ch.to_string())),
            }
        }
        line
    }

    /// Greedy word-wrap of one source line.
    ///
    /// Whitespace runs collapse to a single space. A word wider than the
    /// budget is broken at the longest prefix that fits (at least one
    /// character per line). A blank line yields one empty display line.
    pub fn wrap(&self, source: &SourceLine) -> Vec<DisplayLine> {
        let kind = source.kind;
        let words = self.words(source);
        if words.is_empty() {
            return vec![self.empty_line(kind)];
        }

        let mut lines = Vec::new();
        let mut current: Vec<Cell> = Vec::new();
        let mut current_width = 0.0_f32;

        for (separator, word) in words {
            let word_width: f32 = word.iter().map(|cell| cell.width).sum();
            if !current.is_empty() {
                let space = Cell {
                    ch: ' ',
                    style: separator,
                    width: self.char_width(kind, separator, ' '),
                };
                if current_width + space.width + word_width <= self.max_width {
                    current.push(space);
                    current.extend_from_slice(&word);
                    current_width += space.width + word_width;
                    continue;
                }
                lines.push(self.finish_line(kind, &current));
                current.clear();
                current_width = 0.0;
            }

            let mut rest = word.as_slice();
            while rest.iter().map(|cell| cell.width).sum::<f32>() > self.max_width {
                let split = self.longest_fitting_prefix(rest);
                tracing::debug!(
                    chars = split,
                    max_width = self.max_width,
                    "breaking over-wide word"
                );
                lines.push(self.finish_line(kind, &rest[..split]));
                rest = &rest[split..];
            }
            current.extend_from_slice(rest);
            current_width = rest.iter().map(|cell| cell.width).sum();
        }

        if !current.is_empty() || lines.is_empty() {
            lines.push(self.finish_line(kind, &current));
        }
        lines
    }

    fn longest_fitting_prefix(&self, cells: &[Cell]) -> usize {
        let mut width = 0.0;
        let mut count = 0;
        for cell in cells {
            if width + cell.width > self.max_width {
                break;
            }
            width += cell.width;
            count += 1;
        }
        count.max(1)
    }

    /// Words of a line with the style of the whitespace that preceded each.
    fn words(&self, source: &SourceLine) -> Vec<(SpanStyle, Vec<Cell>)> {
        let mut words = Vec::new();
        let mut word: Vec<Cell> = Vec::new();
        let mut separator = SpanStyle::Regular;

        for span in resolve_spans(&source.text) {
            for ch in span.text.chars() {
                if ch.is_whitespace() {
                    if !word.is_empty() {
                        words.push((separator, std::mem::take(&mut word)));
                    }
                    separator = span.style;
                    continue;
                }
                word.push(Cell {
                    ch,
                    style: span.style,
                    width: self.char_width(source.kind, span.style, ch),
                });
            }
        }
        if !word.is_empty() {
            words.push((separator, word));
        }
        words
    }
}

/// Lays out a whole text block in one pass.
pub fn layout_text(text: &str, ctx: &LayoutContext<'_>) -> Vec<DisplayLine> {
    preprocess(text)
        .iter()
        .flat_map(|line| ctx.wrap(line))
        .collect()
}

/// Total height of a run of display lines, each followed by `line_margin`.
pub fn content_height<'a>(lines: impl IntoIterator<Item = &'a DisplayLine>, line_margin: f32) -> f32 {
    lines
        .into_iter()
        .map(|line| line.height + line_margin)
        .sum()
}

#[derive(Debug, Clone)]
struct CommittedLine {
    chars: usize,
    lines: Vec<DisplayLine>,
}

/// Incremental layout over a growing buffer with a retained-text window.
#[derive(Debug, Clone)]
pub struct TextLayout {
    retain_chars: usize,
    committed: VecDeque<CommittedLine>,
    committed_chars: usize,
    tail: Vec<DisplayLine>,
    tail_chars: usize,
}

impl TextLayout {
    pub fn new(retain_chars: usize) -> Self {
        Self {
            retain_chars,
            committed: VecDeque::new(),
            committed_chars: 0,
            tail: Vec::new(),
            tail_chars: 0,
        }
    }

    pub fn clear(&mut self) {
        self.committed.clear();
        self.committed_chars = 0;
        self.tail.clear();
        self.tail_chars = 0;
    }

    /// Adds a line that will not change again. Clears the tail.
    pub fn commit(&mut self, source: &SourceLine, ctx: &LayoutContext<'_>) {
        let chars = source.char_len() + 1;
        self.committed.push_back(CommittedLine {
            chars,
            lines: ctx.wrap(source),
        });
        self.committed_chars += chars;
        self.tail.clear();
        self.tail_chars = 0;
        self.enforce_window();
    }

    /// Replaces the partially revealed last line.
    pub fn set_tail(&mut self, partial: Option<&SourceLine>, ctx: &LayoutContext<'_>) {
        match partial {
            Some(source) => {
                self.tail = ctx.wrap(source);
                self.tail_chars = source.char_len();
            }
            None => {
                self.tail.clear();
                self.tail_chars = 0;
            }
        }
        self.enforce_window();
    }

    fn enforce_window(&mut self) {
        let mut dropped = 0usize;
        while self.committed_chars + self.tail_chars > self.retain_chars {
            let Some(front) = self.committed.pop_front() else {
                break;
            };
            self.committed_chars -= front.chars;
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!(
                dropped_lines = dropped,
                retained_chars = self.committed_chars + self.tail_chars,
                "trimmed retained text window"
            );
        }
    }

    pub fn lines(&self) -> impl Iterator<Item = &DisplayLine> {
        self.committed
            .iter()
            .flat_map(|committed| committed.lines.iter())
            .chain(self.tail.iter())
    }

    pub fn line_count(&self) -> usize {
        self.committed
            .iter()
            .map(|committed| committed.lines.len())
            .sum::<usize>()
            + self.tail.len()
    }

    pub fn retained_chars(&self) -> usize {
        self.committed_chars + self.tail_chars
    }

    pub fn content_height(&self, line_margin: f32) -> f32 {
        content_height(self.lines(), line_margin)
    }
}
