//! Line classification and inline emphasis.
//!
//! Input text is split into [`SourceLine`]s: a line whose first non-blank
//! character is `#` becomes a heading, everything else is body text. Emphasis
//! delimiters (`*` or `**`) stay in the line text; [`resolve_spans`] turns a
//! line into styled [`TextSpan`]s whenever layout or rendering needs them, so
//! a half-revealed `**word` shows its stars until the closing pair arrives.

pub const HEADING_MARKER: char = '#';
pub const EMPHASIS_MARKER: char = '*';
pub const MIN_HEADING_LEVEL: u8 = 1;
pub const MAX_HEADING_LEVEL: u8 = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LineKind {
    Body,
    Heading(u8),
}

impl LineKind {
    pub fn is_heading(self) -> bool {
        matches!(self, Self::Heading(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLine {
    pub kind: LineKind,
    /// Text without heading markers, emphasis delimiters included.
    pub text: String,
}

impl SourceLine {
    pub fn body(text: impl Into<String>) -> Self {
        Self {
            kind: LineKind::Body,
            text: text.into(),
        }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }

    /// Copy of this line holding only its first `chars` characters.
    pub fn prefix(&self, chars: usize) -> Self {
        let end = self
            .text
            .char_indices()
            .nth(chars)
            .map_or(self.text.len(), |(idx, _)| idx);
        Self {
            kind: self.kind,
            text: self.text[..end].to_owned(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanStyle {
    Regular,
    Emphasis,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSpan {
    pub style: SpanStyle,
    pub text: String,
}

impl TextSpan {
    pub fn new(style: SpanStyle, text: impl Into<String>) -> Self {
        Self {
            style,
            text: text.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token<'a> {
    /// Leading `#` run; carries the clamped level.
    HeadingMarker(u8),
    /// One or two emphasis markers.
    Delimiter(usize),
    Plain(&'a str),
}

/// Splits a raw line into heading marker, emphasis delimiters and plain runs.
///
/// Star runs longer than two are split greedily into pairs, then a single.
pub fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    let mut rest = line;

    let trimmed = line.trim_start();
    if trimmed.starts_with(HEADING_MARKER) {
        let content = trimmed.trim_start_matches(HEADING_MARKER);
        let run = trimmed.len() - content.len();
        tokens.push(Token::HeadingMarker(heading_level(run)));
        rest = content.trim();
    }

    while !rest.is_empty() {
        match rest.find(EMPHASIS_MARKER) {
            Some(0) => {
                let run = rest.len() - rest.trim_start_matches(EMPHASIS_MARKER).len();
                for _ in 0..run / 2 {
                    tokens.push(Token::Delimiter(2));
                }
                if run % 2 == 1 {
                    tokens.push(Token::Delimiter(1));
                }
                rest = &rest[run..];
            }
            Some(idx) => {
                tokens.push(Token::Plain(&rest[..idx]));
                rest = &rest[idx..];
            }
            None => {
                tokens.push(Token::Plain(rest));
                rest = "";
            }
        }
    }

    tokens
}

fn heading_level(marker_run: usize) -> u8 {
    let clamped = marker_run.clamp(MIN_HEADING_LEVEL.into(), MAX_HEADING_LEVEL.into());
    u8::try_from(clamped).unwrap_or(MAX_HEADING_LEVEL)
}

/// Classifies one raw line.
pub fn classify_line(line: &str) -> SourceLine {
    let trimmed = line.trim_start();
    if !trimmed.starts_with(HEADING_MARKER) {
        return SourceLine::body(line);
    }

    let content = trimmed.trim_start_matches(HEADING_MARKER);
    let level = heading_level(trimmed.len() - content.len());
    SourceLine {
        kind: LineKind::Heading(level),
        text: content.trim().to_owned(),
    }
}

/// Splits a text block on newlines and classifies every line.
///
/// `\r\n` is normalized; an empty block yields no lines at all.
pub fn preprocess(text: &str) -> Vec<SourceLine> {
    if text.is_empty() {
        return Vec::new();
    }
    let normalized = text.replace("\r\n", "\n");
    normalized.split('\n').map(classify_line).collect()
}

/// Resolves emphasis delimiters into styled spans.
///
/// A delimiter pairs with the next delimiter of the same width when some
/// non-empty text sits between them. Unpaired or empty pairs stay literal.
/// Adjacent spans of the same style are merged.
pub fn resolve_spans(text: &str) -> Vec<TextSpan> {
    let tokens = tokenize_inline(text);
    let mut spans: Vec<TextSpan> = Vec::new();
    let mut idx = 0;

    while idx < tokens.len() {
        match tokens[idx] {
            Token::Plain(run) => {
                push_span(&mut spans, SpanStyle::Regular, run);
                idx += 1;
            }
            Token::Delimiter(width) => match find_closing(&tokens, idx, width) {
                Some(close) => {
                    let inner = tokens[idx + 1..close]
                        .iter()
                        .map(token_text)
                        .collect::<String>();
                    push_span(&mut spans, SpanStyle::Emphasis, &inner);
                    idx = close + 1;
                }
                None => {
                    push_span(&mut spans, SpanStyle::Regular, &literal_delimiter(width));
                    idx += 1;
                }
            },
            Token::HeadingMarker(_) => idx += 1,
        }
    }

    spans
}

/// Inline tokens only: a leading `#` inside already-classified text is literal.
fn tokenize_inline(text: &str) -> Vec<Token<'_>> {
    if text.trim_start().starts_with(HEADING_MARKER) {
        let split = text.find(EMPHASIS_MARKER).unwrap_or(text.len());
        let mut tokens = vec![Token::Plain(&text[..split])];
        if split < text.len() {
            tokens.extend(tokenize(&text[split..]));
        }
        return tokens;
    }
    tokenize(text)
}

fn find_closing(tokens: &[Token<'_>], open: usize, width: usize) -> Option<usize> {
    let close = tokens[open + 1..]
        .iter()
        .position(|token| *token == Token::Delimiter(width))
        .map(|offset| open + 1 + offset)?;
    let has_text = tokens[open + 1..close]
        .iter()
        .any(|token| matches!(token, Token::Plain(run) if !run.is_empty()));
    has_text.then_some(close)
}

fn token_text(token: &Token<'_>) -> String {
    match token {
        Token::Plain(run) => (*run).to_owned(),
        Token::Delimiter(width) => literal_delimiter(*width),
        Token::HeadingMarker(_) => String::new(),
    }
}

fn literal_delimiter(width: usize) -> String {
    std::iter::repeat(EMPHASIS_MARKER).take(width).collect()
}

fn push_span(spans: &mut Vec<TextSpan>, style: SpanStyle, text: &str) {
    if text.is_empty() {
        return;
    }
    match spans.last_mut() {
        Some(last) if last.style == style => last.text.push_str(text),
        _ => spans.push(TextSpan::new(style, text)),
    }
}
