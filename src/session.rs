//! The session controller: one configuration, one sink, and the tick loop
//! that turns text blocks into frames.

use std::time::Duration;

use crate::error::{StreamError, StreamResult};
use crate::fonts::{FontSet, StyleTable, Typeface};
use crate::interrupt::CancelFlag;
use crate::layout::{DisplayLine, LayoutContext, TextLayout};
use crate::markup::{preprocess, SourceLine};
use crate::render::{Frame, FrameRenderer};
use crate::reveal::{body_line_advance, derived_scroll_rate, BlockCursor, RevealScheduler};
use crate::schema::SessionConfig;
use crate::scroll::ScrollController;
use crate::sink::{FrameSink, OutputSink, SinkStatus};
use crate::timing::{idle_frame_count, FrameClock, Pacing};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    /// A cancel request ended a loop early. Later blocks and idle intervals
    /// return immediately; the session still has to be closed.
    Cancelled,
    Closed,
}

/// Outcome of one `render_block` or `display_idle` call.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BlockSummary {
    pub frames: u64,
    pub ticks: u64,
    pub cancelled: bool,
    pub final_offset: f32,
}

pub struct StreamSession<S: FrameSink = OutputSink> {
    config: SessionConfig,
    typeface: Box<dyn Typeface>,
    styles: StyleTable,
    renderer: FrameRenderer,
    frame: Frame,
    layout: TextLayout,
    scroll: ScrollController,
    clock: FrameClock,
    cancel: CancelFlag,
    sink: S,
    state: SessionState,
    frames_emitted: u64,
}

impl<S: FrameSink> std::fmt::Debug for StreamSession<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("sink", &self.sink.label())
            .field("state", &self.state)
            .field("frames_emitted", &self.frames_emitted)
            .finish_non_exhaustive()
    }
}

impl StreamSession<OutputSink> {
    /// Loads fonts and opens the configured output.
    pub fn open(config: SessionConfig) -> StreamResult<Self> {
        config.validate()?;
        let fonts = FontSet::load(&config.fonts)?;
        let sink = OutputSink::open(&config)?;
        Self::with_parts(config, fonts, sink)
    }
}

impl<S: FrameSink> StreamSession<S> {
    pub fn with_parts(
        config: SessionConfig,
        typeface: impl Typeface + 'static,
        sink: S,
    ) -> StreamResult<Self> {
        config.validate()?;
        let styles = StyleTable::from_config(&config.fonts);
        let renderer = FrameRenderer::new(&config);
        let frame = renderer.blank_frame();
        let initial_rate = config.scroll_rate.unwrap_or(1.0);

        tracing::info!(
            width = config.canvas.width,
            height = config.canvas.height,
            fps = config.fps,
            mode = config.output.mode_name(),
            sink = sink.label(),
            "session opened"
        );

        Ok(Self {
            layout: TextLayout::new(config.retain_chars),
            scroll: ScrollController::new(initial_rate),
            clock: FrameClock::new(config.fps, Pacing::RealTime),
            cancel: CancelFlag::new(),
            typeface: Box::new(typeface),
            styles,
            renderer,
            frame,
            config,
            sink,
            state: SessionState::Open,
            frames_emitted: 0,
        })
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.clock = FrameClock::new(self.config.fps, pacing);
        self
    }

    /// Shares an externally owned cancel flag, typically the Ctrl+C one.
    pub fn with_cancel_flag(mut self, flag: CancelFlag) -> Self {
        self.cancel = flag;
        self
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames_emitted
    }

    pub fn scroll_offset(&self) -> f32 {
        self.scroll.current()
    }

    /// Lines that intersect the text region at the current scroll offset.
    pub fn visible_lines(&self) -> Vec<&DisplayLine> {
        let top = self.renderer.text_top();
        let bottom = self.renderer.text_bottom();
        let mut y = top - self.scroll.current();
        let mut visible = Vec::new();
        for line in self.layout.lines() {
            let line_top = y;
            y += line.height + self.config.line_margin;
            if line_top + line.height >= top && line_top <= bottom {
                visible.push(line);
            }
        }
        visible
    }

    /// Reveals `text` one tick at a time and returns once every character is
    /// shown and the scroll offset has settled, or a cancel request arrived.
    pub fn render_block(
        &mut self,
        text: &str,
        reveal_rate: Option<f32>,
    ) -> StreamResult<BlockSummary> {
        match self.state {
            SessionState::Closed => {
                return Err(StreamError::pipeline_io("session is closed"));
            }
            SessionState::Cancelled => {
                return Ok(BlockSummary {
                    cancelled: true,
                    final_offset: self.scroll.current(),
                    ..BlockSummary::default()
                });
            }
            SessionState::Open => {}
        }

        let rate = reveal_rate.unwrap_or(self.config.reveal.chars_per_second);
        if !rate.is_finite() || rate <= 0.0 {
            return Err(self.fail(StreamError::configuration(format!(
                "reveal rate must be a positive number, got {rate}"
            ))));
        }

        let sources = preprocess(text);
        if sources.is_empty() {
            return Ok(BlockSummary {
                final_offset: self.scroll.current(),
                ..BlockSummary::default()
            });
        }

        match self.run_block(sources, rate) {
            Ok(summary) => {
                if summary.cancelled {
                    self.state = SessionState::Cancelled;
                }
                tracing::info!(
                    chars = text.chars().count(),
                    frames = summary.frames,
                    cancelled = summary.cancelled,
                    offset = summary.final_offset,
                    "block finished"
                );
                Ok(summary)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn run_block(&mut self, sources: Vec<SourceLine>, rate: f32) -> StreamResult<BlockSummary> {
        let Self {
            config,
            typeface,
            styles,
            renderer,
            frame,
            layout,
            scroll,
            clock,
            cancel,
            sink,
            frames_emitted,
            ..
        } = self;

        let ctx = LayoutContext::new(&**typeface, styles, config.text_width());
        if config.carry_over {
            if layout.line_count() > 0 {
                layout.commit(&SourceLine::body(""), &ctx);
            }
        } else {
            layout.clear();
            scroll.reset();
        }

        let scroll_rate = config.scroll_rate.unwrap_or_else(|| {
            derived_scroll_rate(
                f64::from(rate),
                f64::from(config.reveal.average_chars_per_line),
                body_line_advance(&ctx, config.line_margin),
                config.fps,
            )
        });
        scroll.set_rate(scroll_rate);

        let mut cursor = BlockCursor::new(sources);
        let mut scheduler = RevealScheduler::new(cursor.total_chars(), f64::from(rate), config.fps);
        tracing::debug!(
            chars = scheduler.total(),
            rate,
            scroll_rate,
            "block started"
        );

        let available = config.available_height();
        let mut summary = BlockSummary::default();

        loop {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            scheduler.tick();
            cursor.sync(scheduler.revealed(), layout, &ctx);
            let offset = scroll.update(layout.content_height(config.line_margin), available);
            renderer.render(frame, &**typeface, styles, layout.lines(), offset);

            clock.wait_for_slot();
            let status = sink.present(frame)?;
            summary.ticks += 1;
            summary.final_offset = offset;
            if status == SinkStatus::Cancelled {
                summary.cancelled = true;
                break;
            }
            summary.frames += 1;
            *frames_emitted += 1;

            if scheduler.is_done() && scroll.is_settled() {
                break;
            }
        }

        Ok(summary)
    }

    /// Emits `floor(duration * fps)` background frames; the configured idle
    /// duration is used when `duration` is `None`.
    pub fn display_idle(&mut self, duration: Option<Duration>) -> StreamResult<BlockSummary> {
        match self.state {
            SessionState::Closed => {
                return Err(StreamError::pipeline_io("session is closed"));
            }
            SessionState::Cancelled => {
                return Ok(BlockSummary {
                    cancelled: true,
                    ..BlockSummary::default()
                });
            }
            SessionState::Open => {}
        }

        let duration = match duration {
            Some(duration) => duration,
            None => match Duration::try_from_secs_f32(self.config.idle_seconds) {
                Ok(duration) => duration,
                Err(error) => {
                    return Err(self.fail(StreamError::configuration(format!(
                        "idle_seconds {} is not a usable duration: {error}",
                        self.config.idle_seconds
                    ))));
                }
            },
        };
        let count = idle_frame_count(duration, self.config.fps);
        tracing::info!(
            seconds = duration.as_secs_f32(),
            frames = count,
            "idle interval"
        );

        match self.run_idle(count) {
            Ok(summary) => {
                if summary.cancelled {
                    self.state = SessionState::Cancelled;
                }
                Ok(summary)
            }
            Err(error) => Err(self.fail(error)),
        }
    }

    fn run_idle(&mut self, count: u64) -> StreamResult<BlockSummary> {
        let blank = self.renderer.blank_frame();
        let mut summary = BlockSummary::default();

        for _ in 0..count {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }
            self.clock.wait_for_slot();
            let status = self.sink.present(&blank)?;
            summary.ticks += 1;
            if status == SinkStatus::Cancelled {
                summary.cancelled = true;
                break;
            }
            summary.frames += 1;
            self.frames_emitted += 1;
        }
        Ok(summary)
    }

    /// Shuts the sink down. Only the first call does any work.
    pub fn close(&mut self) -> StreamResult<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        tracing::info!(frames = self.frames_emitted, sink = self.sink.label(), "closing session");
        self.sink.close()
    }

    fn fail(&mut self, error: StreamError) -> StreamError {
        tracing::error!(%error, "session aborted");
        if let Err(close_error) = self.close() {
            tracing::warn!(error = %close_error, "shutdown after failure also failed");
        }
        error
    }
}

impl<S: FrameSink> Drop for StreamSession<S> {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(%error, "session shutdown failed during drop");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fonts::BoxTypeface;
    use crate::sink::MemorySink;

    fn session(sink: MemorySink) -> StreamSession<MemorySink> {
        let mut config = SessionConfig::headless(320, 240);
        config.margins.top = 20;
        config.margins.bottom = 20;
        config.margins.side = 20;
        config.fonts.size = 16;
        StreamSession::with_parts(config, BoxTypeface, sink)
            .unwrap()
            .with_pacing(Pacing::Unpaced)
    }

    #[test]
    fn reveal_rate_is_honoured_per_tick() {
        let mut session = session(MemorySink::new());
        // 20 chars at 50 cps and 10 fps: 5 chars per tick.
        let summary = session.render_block("abcde fghij klmno pq", Some(50.0)).unwrap();
        assert_eq!(summary.ticks, 4);
        assert_eq!(session.frames_emitted(), 4);
        assert_eq!(session.sink().presented(), 4);
    }

    #[test]
    fn invalid_rate_closes_the_session() {
        let mut session = session(MemorySink::new());
        let error = session.render_block("text", Some(0.0)).unwrap_err();
        assert!(matches!(error, StreamError::Configuration(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.sink().close_calls(), 1);
        assert!(session.render_block("text", None).is_err());
    }

    #[test]
    fn scrolls_until_the_last_line_is_inside_the_viewport() {
        let mut session = session(MemorySink::new());
        let text = (0..30).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let summary = session.render_block(&text, Some(10_000.0)).unwrap();
        assert!(summary.final_offset > 0.0);
        assert!(summary.ticks > 1);

        let visible = session.visible_lines();
        assert_eq!(visible.last().map(|line| line.text()), Some("line 29".to_owned()));
    }

    #[test]
    fn blocks_start_clean_unless_carried_over() {
        let mut session = session(MemorySink::new());
        session.render_block("first", Some(1000.0)).unwrap();
        session.render_block("second", Some(1000.0)).unwrap();
        let texts = session
            .visible_lines()
            .iter()
            .map(|line| line.text())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["second"]);

        let mut config = SessionConfig::headless(320, 240);
        config.carry_over = true;
        let mut session = StreamSession::with_parts(config, BoxTypeface, MemorySink::new())
            .unwrap()
            .with_pacing(Pacing::Unpaced);
        session.render_block("first", Some(1000.0)).unwrap();
        session.render_block("second", Some(1000.0)).unwrap();
        let texts = session
            .visible_lines()
            .iter()
            .map(|line| line.text())
            .collect::<Vec<_>>();
        assert_eq!(texts, vec!["first", "", "second"]);
    }

    #[test]
    fn external_cancel_flag_stops_before_the_next_frame() {
        let flag = CancelFlag::new();
        let mut session = session(MemorySink::new()).with_cancel_flag(flag.clone());
        flag.cancel();
        let summary = session.render_block("never shown", None).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.frames, 0);
        assert_eq!(session.state(), SessionState::Cancelled);
    }

    #[test]
    fn frame_refused_by_a_cancel_is_not_counted() {
        let mut session = session(MemorySink::new().cancel_after(2));
        let summary = session
            .render_block("a block long enough to need several ticks", None)
            .unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.ticks, 3);
        assert_eq!(summary.frames, 2);
        assert_eq!(session.frames_emitted(), 2);
        assert_eq!(session.sink().frames().len(), 2);
    }

    #[test]
    fn unrepresentable_idle_duration_closes_instead_of_panicking() {
        let mut session = session(MemorySink::new());
        session.config.idle_seconds = 1e20;
        let error = session.display_idle(None).unwrap_err();
        assert!(matches!(error, StreamError::Configuration(_)));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.sink().presented(), 0);
    }

    #[test]
    fn close_runs_the_shutdown_path_once() {
        let mut session = session(MemorySink::new());
        session.close().unwrap();
        session.close().unwrap();
        assert_eq!(session.sink().close_calls(), 1);
    }
}
