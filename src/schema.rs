use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{StreamError, StreamResult};
pub use crate::render::PixelFormat;

/// Smallest accepted `scroll_rate`, in pixels per frame.
pub const MIN_SCROLL_RATE: f32 = 0.01;
/// Longest accepted idle interval (one day).
pub const MAX_IDLE_SECONDS: f32 = 86_400.0;

/// Complete, immutable configuration of one streaming session.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    #[serde(default)]
    pub canvas: Canvas,
    #[serde(default = "default_fps")]
    pub fps: u32,
    #[serde(default)]
    pub reveal: RevealConfig,
    /// Pixels per tick. Derived from the reveal rate when absent.
    #[serde(default)]
    pub scroll_rate: Option<f32>,
    #[serde(default)]
    pub margins: Margins,
    #[serde(default = "default_line_margin")]
    pub line_margin: f32,
    #[serde(default = "default_retain_chars")]
    pub retain_chars: usize,
    #[serde(default)]
    pub carry_over: bool,
    pub fonts: FontConfig,
    #[serde(default)]
    pub colors: Colors,
    #[serde(default = "default_idle_seconds")]
    pub idle_seconds: f32,
    #[serde(default)]
    pub pixel_format: PixelFormat,
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Default for Canvas {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RevealConfig {
    pub chars_per_second: f32,
    pub average_chars_per_line: f32,
}

impl Default for RevealConfig {
    fn default() -> Self {
        Self {
            chars_per_second: 50.0,
            average_chars_per_line: 50.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Margins {
    pub top: u32,
    pub bottom: u32,
    pub side: u32,
}

impl Default for Margins {
    fn default() -> Self {
        Self {
            top: 50,
            bottom: 50,
            side: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FontConfig {
    pub regular: PathBuf,
    pub bold: PathBuf,
    pub italic: PathBuf,
    #[serde(default = "default_font_size")]
    pub size: u32,
    #[serde(default = "default_heading_step")]
    pub heading_step: u32,
}

impl FontConfig {
    fn resolve_against(&mut self, base: &Path) {
        for path in [&mut self.regular, &mut self.bold, &mut self.italic] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Colors {
    pub background: [u8; 3],
    pub text: [u8; 3],
}

impl Default for Colors {
    fn default() -> Self {
        Self {
            background: [245, 245, 245],
            text: [0, 0, 0],
        }
    }
}

/// Where frames go.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum OutputConfig {
    Stream(StreamTarget),
    Preview(PreviewConfig),
}

impl OutputConfig {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Self::Stream(_) => "stream",
            Self::Preview(_) => "preview",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StreamTarget {
    pub url: String,
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_container")]
    pub container: String,
    /// Encoder binary. `sidecar` selects the managed download when built
    /// with the `sidecar_ffmpeg` feature.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg: String,
}

impl StreamTarget {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            codec: default_codec(),
            bitrate: default_bitrate(),
            preset: default_preset(),
            container: default_container(),
            ffmpeg: default_ffmpeg(),
        }
    }

    fn validate(&self) -> StreamResult<()> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(StreamError::configuration(
                "output.url is required in stream mode",
            ));
        }
        if url.contains("://") {
            let parsed = url::Url::parse(url).map_err(|error| {
                StreamError::configuration(format!("output.url '{url}' is not a valid URL: {error}"))
            })?;
            if parsed.host_str().map_or(true, str::is_empty) {
                return Err(StreamError::configuration(format!(
                    "output.url '{url}' has no host"
                )));
            }
        }
        for (name, value) in [
            ("codec", &self.codec),
            ("bitrate", &self.bitrate),
            ("preset", &self.preset),
            ("container", &self.container),
            ("ffmpeg", &self.ffmpeg),
        ] {
            if value.trim().is_empty() {
                return Err(StreamError::configuration(format!(
                    "output.{name} cannot be empty"
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PreviewConfig {
    #[serde(default = "default_title")]
    pub title: String,
    #[serde(default = "default_cancel_key")]
    pub cancel_key: String,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            title: default_title(),
            cancel_key: default_cancel_key(),
        }
    }
}

impl PreviewConfig {
    pub fn cancel_key(&self) -> StreamResult<CancelKey> {
        CancelKey::parse(&self.cancel_key)
    }
}

/// Key that ends the active reveal or idle loop in preview mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelKey {
    Char(char),
    Escape,
    Space,
}

impl CancelKey {
    pub fn parse(raw: &str) -> StreamResult<Self> {
        let trimmed = raw.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "escape" | "esc" => return Ok(Self::Escape),
            "space" => return Ok(Self::Space),
            _ => {}
        }
        let mut chars = trimmed.chars();
        match (chars.next(), chars.next()) {
            (Some(ch), None) if ch.is_ascii_alphanumeric() => Ok(Self::Char(ch.to_ascii_lowercase())),
            _ => Err(StreamError::configuration(format!(
                "cancel_key must be a single letter or digit, 'escape' or 'space', got '{raw}'"
            ))),
        }
    }
}

impl SessionConfig {
    /// Defaults with the given canvas and unresolved font paths, for sessions
    /// assembled from explicit parts.
    pub fn headless(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas { width, height },
            fps: default_fps(),
            reveal: RevealConfig::default(),
            scroll_rate: None,
            margins: Margins::default(),
            line_margin: default_line_margin(),
            retain_chars: default_retain_chars(),
            carry_over: false,
            fonts: FontConfig {
                regular: PathBuf::new(),
                bold: PathBuf::new(),
                italic: PathBuf::new(),
                size: default_font_size(),
                heading_step: default_heading_step(),
            },
            colors: Colors::default(),
            idle_seconds: default_idle_seconds(),
            pixel_format: PixelFormat::default(),
            output: OutputConfig::Preview(PreviewConfig::default()),
        }
    }

    pub fn resolve_paths(&mut self, base: &Path) {
        self.fonts.resolve_against(base);
    }

    /// Width available to a line of text.
    pub fn text_width(&self) -> f32 {
        self.canvas.width.saturating_sub(self.margins.side.saturating_mul(2)) as f32
    }

    /// Height of the viewport between the top and bottom margins.
    pub fn available_height(&self) -> f32 {
        self.canvas
            .height
            .saturating_sub(self.margins.top.saturating_add(self.margins.bottom)) as f32
    }

    pub fn validate(&self) -> StreamResult<()> {
        let Canvas { width, height } = self.canvas;
        if width == 0 || height == 0 {
            return Err(StreamError::configuration(format!(
                "canvas must be positive, got {width}x{height}"
            )));
        }
        if self.fps == 0 {
            return Err(StreamError::configuration("fps must be > 0"));
        }

        ensure_positive("reveal.chars_per_second", self.reveal.chars_per_second)?;
        ensure_positive(
            "reveal.average_chars_per_line",
            self.reveal.average_chars_per_line,
        )?;
        if let Some(rate) = self.scroll_rate {
            ensure_positive("scroll_rate", rate)?;
            if rate < MIN_SCROLL_RATE {
                return Err(StreamError::configuration(format!(
                    "scroll_rate must be at least {MIN_SCROLL_RATE} px per frame, got {rate}"
                )));
            }
        }
        if !self.line_margin.is_finite() || self.line_margin < 0.0 {
            return Err(StreamError::configuration("line_margin must be >= 0"));
        }
        if !self.idle_seconds.is_finite() || self.idle_seconds < 0.0 {
            return Err(StreamError::configuration("idle_seconds must be >= 0"));
        }
        if self.idle_seconds > MAX_IDLE_SECONDS {
            return Err(StreamError::configuration(format!(
                "idle_seconds must be <= {MAX_IDLE_SECONDS}, got {}",
                self.idle_seconds
            )));
        }

        if 2 * u64::from(self.margins.side) >= u64::from(width) {
            return Err(StreamError::configuration(format!(
                "side margins of {}px leave no room on a {width}px wide canvas",
                self.margins.side
            )));
        }
        if u64::from(self.margins.top) + u64::from(self.margins.bottom) >= u64::from(height) {
            return Err(StreamError::configuration(format!(
                "top and bottom margins leave no room on a {height}px tall canvas"
            )));
        }

        if self.retain_chars == 0 {
            return Err(StreamError::configuration("retain_chars must be > 0"));
        }
        if self.fonts.size == 0 {
            return Err(StreamError::configuration("fonts.size must be > 0"));
        }

        match &self.output {
            OutputConfig::Stream(target) => {
                target.validate()?;
                if width % 2 != 0 || height % 2 != 0 {
                    return Err(StreamError::configuration(format!(
                        "stream mode encodes yuv420p and needs even dimensions, got {width}x{height}"
                    )));
                }
            }
            OutputConfig::Preview(preview) => {
                preview.cancel_key()?;
            }
        }

        Ok(())
    }
}

fn ensure_positive(name: &str, value: f32) -> StreamResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(StreamError::configuration(format!(
            "{name} must be a positive number, got {value}"
        )))
    }
}

fn default_fps() -> u32 {
    10
}

fn default_line_margin() -> f32 {
    10.0
}

fn default_retain_chars() -> usize {
    20_000
}

fn default_font_size() -> u32 {
    32
}

fn default_heading_step() -> u32 {
    2
}

fn default_idle_seconds() -> f32 {
    2.0
}

fn default_codec() -> String {
    "libx264".to_owned()
}

fn default_bitrate() -> String {
    "3000k".to_owned()
}

fn default_preset() -> String {
    "ultrafast".to_owned()
}

fn default_container() -> String {
    "flv".to_owned()
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_owned()
}

fn default_title() -> String {
    "Live Stream".to_owned()
}

fn default_cancel_key() -> String {
    "q".to_owned()
}
