//! Frame delivery.
//!
//! [`OutputSink`] is the two-mode sink a session opens from its
//! configuration; [`MemorySink`] keeps frames in memory for still rendering
//! and tests.

use crate::encoding::EncoderPipe;
use crate::error::{StreamError, StreamResult};
use crate::render::Frame;
use crate::schema::{OutputConfig, SessionConfig};

#[cfg(feature = "preview")]
use crate::play::PreviewWindow;

/// What the render loop should do after a frame was presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkStatus {
    Continue,
    Cancelled,
}

pub trait FrameSink {
    /// Delivers one fully rendered frame.
    fn present(&mut self, frame: &Frame) -> StreamResult<SinkStatus>;

    /// Releases the underlying resource. Safe to call more than once; only
    /// the first call does any work.
    fn close(&mut self) -> StreamResult<()>;

    fn label(&self) -> &'static str;
}

pub enum OutputSink {
    Encoder(EncoderPipe),
    #[cfg(feature = "preview")]
    Preview(PreviewWindow),
}

impl std::fmt::Debug for OutputSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("OutputSink").field(&self.label()).finish()
    }
}

impl OutputSink {
    pub fn open(config: &SessionConfig) -> StreamResult<Self> {
        match &config.output {
            OutputConfig::Stream(target) => Ok(Self::Encoder(EncoderPipe::spawn(config, target)?)),
            #[cfg(feature = "preview")]
            OutputConfig::Preview(preview) => {
                Ok(Self::Preview(PreviewWindow::open(config, preview)?))
            }
            #[cfg(not(feature = "preview"))]
            OutputConfig::Preview(_) => Err(StreamError::configuration(
                "preview mode requested but typewire was built without `preview`. Rebuild with `--features preview`.",
            )),
        }
    }
}

impl FrameSink for OutputSink {
    fn present(&mut self, frame: &Frame) -> StreamResult<SinkStatus> {
        match self {
            Self::Encoder(pipe) => {
                pipe.write_frame(frame)?;
                Ok(SinkStatus::Continue)
            }
            #[cfg(feature = "preview")]
            Self::Preview(window) => window.present(frame),
        }
    }

    fn close(&mut self) -> StreamResult<()> {
        match self {
            Self::Encoder(pipe) => pipe.finish(),
            #[cfg(feature = "preview")]
            Self::Preview(window) => {
                window.close();
                Ok(())
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            Self::Encoder(_) => "encoder",
            #[cfg(feature = "preview")]
            Self::Preview(_) => "preview",
        }
    }
}

/// Collects presented frames in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<Frame>,
    keep_last: Option<usize>,
    presented: usize,
    cancel_after: Option<usize>,
    close_calls: usize,
    closed: bool,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retains only the most recent `count` frames.
    pub fn keep_last(count: usize) -> Self {
        Self {
            keep_last: Some(count.max(1)),
            ..Self::default()
        }
    }

    /// Accepts `count` frames, then answers [`SinkStatus::Cancelled`] without
    /// keeping the frame, the way a preview window skips drawing once its
    /// cancel key is pressed.
    pub fn cancel_after(mut self, count: usize) -> Self {
        self.cancel_after = Some(count);
        self
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&Frame> {
        self.frames.last()
    }

    /// Frames accepted over the sink's lifetime, including ones `keep_last`
    /// has since dropped.
    pub fn presented(&self) -> usize {
        self.presented
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl FrameSink for MemorySink {
    fn present(&mut self, frame: &Frame) -> StreamResult<SinkStatus> {
        if self.closed {
            return Err(StreamError::pipeline_io("memory sink is closed"));
        }
        if self.cancel_after.is_some_and(|limit| self.presented >= limit) {
            return Ok(SinkStatus::Cancelled);
        }
        self.frames.push(frame.clone());
        if let Some(keep) = self.keep_last {
            if self.frames.len() > keep {
                let excess = self.frames.len() - keep;
                self.frames.drain(..excess);
            }
        }
        self.presented += 1;
        Ok(SinkStatus::Continue)
    }

    fn close(&mut self) -> StreamResult<()> {
        self.close_calls += 1;
        self.closed = true;
        Ok(())
    }

    fn label(&self) -> &'static str {
        "memory"
    }
}
