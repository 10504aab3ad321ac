use std::collections::HashMap;
use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::error::{StreamError, StreamResult};
use crate::fonts::{Face, GlyphBitmap, StyleTable, Typeface};
use crate::layout::DisplayLine;
use crate::schema::{Margins, SessionConfig};

/// Byte layout of frames handed to the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Bgr24,
    Rgb24,
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr24 | Self::Rgb24 => 3,
            Self::Rgba => 4,
        }
    }

    pub fn ffmpeg_name(self) -> &'static str {
        match self {
            Self::Bgr24 => "bgr24",
            Self::Rgb24 => "rgb24",
            Self::Rgba => "rgba",
        }
    }

    pub fn frame_len(self, width: u32, height: u32) -> usize {
        (width as usize) * (height as usize) * self.bytes_per_pixel()
    }
}

/// One opaque RGBA8 canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, background: [u8; 3]) -> Self {
        let mut frame = Self {
            width,
            height,
            data: vec![0; (width as usize) * (height as usize) * 4],
        };
        frame.fill(background);
        frame
    }

    pub fn fill(&mut self, color: [u8; 3]) {
        for pixel in self.data.chunks_exact_mut(4) {
            pixel.copy_from_slice(&[color[0], color[1], color[2], 255]);
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }

    /// Packs the canvas into `out` using `format`, replacing its contents.
    pub fn pack_into(&self, format: PixelFormat, out: &mut Vec<u8>) {
        out.clear();
        out.reserve(format.frame_len(self.width, self.height));
        match format {
            PixelFormat::Rgba => out.extend_from_slice(&self.data),
            PixelFormat::Rgb24 => {
                for pixel in self.data.chunks_exact(4) {
                    out.extend_from_slice(&pixel[..3]);
                }
            }
            PixelFormat::Bgr24 => {
                for pixel in self.data.chunks_exact(4) {
                    out.extend_from_slice(&[pixel[2], pixel[1], pixel[0]]);
                }
            }
        }
    }

    pub fn save_png(&self, path: &Path) -> StreamResult<()> {
        let image = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| StreamError::configuration("frame buffer does not match its size"))?;
        image
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    pub drawn_lines: usize,
    pub skipped_lines: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct GlyphKey {
    face: Face,
    ch: char,
}

/// Rasterizes visible display lines onto a fixed-size canvas.
#[derive(Debug)]
pub struct FrameRenderer {
    width: u32,
    height: u32,
    margins: Margins,
    line_margin: f32,
    background: [u8; 3],
    text_color: [u8; 3],
    glyph_cache: HashMap<GlyphKey, GlyphBitmap>,
}

impl FrameRenderer {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            width: config.canvas.width,
            height: config.canvas.height,
            margins: config.margins,
            line_margin: config.line_margin,
            background: config.colors.background,
            text_color: config.colors.text,
            glyph_cache: HashMap::new(),
        }
    }

    pub fn blank_frame(&self) -> Frame {
        Frame::new(self.width, self.height, self.background)
    }

    /// Top of the first line box when the scroll offset is zero.
    pub fn text_top(&self) -> f32 {
        self.margins.top as f32
    }

    /// Bottom of the region lines may start in.
    pub fn text_bottom(&self) -> f32 {
        self.height.saturating_sub(self.margins.bottom) as f32
    }

    /// Redraws `frame` from scratch: background, then every line whose box
    /// intersects the text region after shifting up by `offset`.
    pub fn render<'a>(
        &mut self,
        frame: &mut Frame,
        typeface: &dyn Typeface,
        styles: &StyleTable,
        lines: impl IntoIterator<Item = &'a DisplayLine>,
        offset: f32,
    ) -> FrameStats {
        frame.fill(self.background);
        let mut stats = FrameStats::default();
        let top = self.text_top();
        let bottom = self.text_bottom();
        let mut y = top - offset;

        for line in lines {
            let line_top = y;
            y += line.height + self.line_margin;

            if line_top + line.height < top || line_top > bottom {
                stats.skipped_lines += 1;
                continue;
            }
            self.draw_line(frame, typeface, styles, line, line_top);
            stats.drawn_lines += 1;
        }

        stats
    }

    fn draw_line(
        &mut self,
        frame: &mut Frame,
        typeface: &dyn Typeface,
        styles: &StyleTable,
        line: &DisplayLine,
        line_top: f32,
    ) {
        let baseline = (line_top + line.ascent).round() as i32;
        let mut pen_x = self.margins.side as f32;
        let color = self.text_color;

        for span in &line.spans {
            let face = styles.face(line.kind, span.style);
            for ch in span.text.chars() {
                let key = GlyphKey { face, ch };
                let glyph = self
                    .glyph_cache
                    .entry(key)
                    .or_insert_with(|| typeface.rasterize(face, ch));
                let x = pen_x.round() as i32 + glyph.xmin;
                let y = baseline - glyph.ymin - glyph.height as i32;
                blend_glyph(frame, x, y, glyph, color);
                pen_x += typeface.advance(face, ch);
            }
        }
    }
}

fn blend_glyph(frame: &mut Frame, x: i32, y: i32, glyph: &GlyphBitmap, color: [u8; 3]) {
    for row in 0..glyph.height {
        let py = y + row as i32;
        if py < 0 || py >= frame.height as i32 {
            continue;
        }

        for col in 0..glyph.width {
            let px = x + col as i32;
            if px < 0 || px >= frame.width as i32 {
                continue;
            }

            let mask = glyph.coverage[row * glyph.width + col];
            if mask == 0 {
                continue;
            }

            let idx = ((py as u32 * frame.width + px as u32) * 4) as usize;
            blend_pixel(&mut frame.data, idx, [color[0], color[1], color[2], mask]);
        }
    }
}

fn blend_pixel(frame: &mut [u8], idx: usize, src: [u8; 4]) {
    let alpha = u16::from(src[3]);
    if alpha == 0 {
        return;
    }

    let inv_alpha = 255_u16.saturating_sub(alpha);

    for channel in 0..3 {
        let dst = u16::from(frame[idx + channel]);
        let src_c = u16::from(src[channel]);
        frame[idx + channel] = ((src_c * alpha + dst * inv_alpha + 127) / 255) as u8;
    }
    frame[idx + 3] = 255;
}
