use std::fs;
use std::path::Path;

use fontdue::{Font, FontSettings};

use crate::error::{StreamError, StreamResult};
use crate::markup::{LineKind, SpanStyle, MAX_HEADING_LEVEL, MIN_HEADING_LEVEL};
use crate::schema::FontConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Regular,
    Bold,
    Italic,
}

/// A font variant at a pixel size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Face {
    pub variant: Variant,
    pub px: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineMetrics {
    /// Distance from the top of the line box to the baseline.
    pub ascent: f32,
    /// Full line box height.
    pub height: f32,
}

/// Coverage mask for one glyph, positioned relative to the pen on the baseline.
#[derive(Debug, Clone, Default)]
pub struct GlyphBitmap {
    pub xmin: i32,
    pub ymin: i32,
    pub width: usize,
    pub height: usize,
    pub coverage: Vec<u8>,
}

/// Font metrics and rasterization as seen by layout and rendering.
///
/// Layout measures with `advance`, rendering draws with the same advances, so
/// a line that measured within budget is drawn within budget.
pub trait Typeface {
    fn advance(&self, face: Face, ch: char) -> f32;
    fn line_metrics(&self, face: Face) -> LineMetrics;
    fn rasterize(&self, face: Face, ch: char) -> GlyphBitmap;
}

/// Maps line kinds and span styles to faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StyleTable {
    pub base_px: u32,
    pub heading_step_px: u32,
}

impl StyleTable {
    pub fn new(base_px: u32, heading_step_px: u32) -> Self {
        Self {
            base_px,
            heading_step_px,
        }
    }

    pub fn from_config(config: &FontConfig) -> Self {
        Self::new(config.size, config.heading_step)
    }

    /// Heading size shrinks with depth and never drops to body size.
    pub fn heading_px(&self, level: u8) -> u32 {
        let level = level.clamp(MIN_HEADING_LEVEL, MAX_HEADING_LEVEL);
        let steps = u32::from(MAX_HEADING_LEVEL + 1 - level);
        self.base_px + self.heading_step_px * steps
    }

    pub fn face(&self, kind: LineKind, style: SpanStyle) -> Face {
        match (kind, style) {
            (LineKind::Body, SpanStyle::Regular) => Face {
                variant: Variant::Regular,
                px: self.base_px,
            },
            (LineKind::Body, SpanStyle::Emphasis) => Face {
                variant: Variant::Italic,
                px: self.base_px,
            },
            (LineKind::Heading(level), SpanStyle::Regular) => Face {
                variant: Variant::Bold,
                px: self.heading_px(level),
            },
            (LineKind::Heading(level), SpanStyle::Emphasis) => Face {
                variant: Variant::Italic,
                px: self.heading_px(level),
            },
        }
    }

    pub fn line_face(&self, kind: LineKind) -> Face {
        self.face(kind, SpanStyle::Regular)
    }
}

/// Regular, bold and italic TrueType/OpenType faces loaded with fontdue.
pub struct FontSet {
    regular: Font,
    bold: Font,
    italic: Font,
}

impl std::fmt::Debug for FontSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontSet").finish_non_exhaustive()
    }
}

impl FontSet {
    pub fn load(config: &FontConfig) -> StreamResult<Self> {
        Ok(Self {
            regular: load_font(&config.regular, "regular")?,
            bold: load_font(&config.bold, "bold")?,
            italic: load_font(&config.italic, "italic")?,
        })
    }

    fn font(&self, variant: Variant) -> &Font {
        match variant {
            Variant::Regular => &self.regular,
            Variant::Bold => &self.bold,
            Variant::Italic => &self.italic,
        }
    }

    /// Characters with no glyph in the given variant; they render as the
    /// font's notdef glyph.
    pub fn missing_codepoints(&self, variant: Variant, text: &str) -> Vec<char> {
        let font = self.font(variant);
        let mut missing = text
            .chars()
            .filter(|ch| !ch.is_whitespace() && font.lookup_glyph_index(*ch) == 0)
            .collect::<Vec<_>>();
        missing.sort_unstable();
        missing.dedup();
        missing
    }
}

fn load_font(path: &Path, label: &str) -> StreamResult<Font> {
    let bytes = fs::read(path).map_err(|error| {
        StreamError::configuration(format!(
            "failed to read {label} font file '{}': {error}",
            path.display()
        ))
    })?;
    Font::from_bytes(bytes, FontSettings::default()).map_err(|error| {
        StreamError::configuration(format!(
            "failed to parse {label} font file '{}': {error}",
            path.display()
        ))
    })
}

impl Typeface for FontSet {
    fn advance(&self, face: Face, ch: char) -> f32 {
        self.font(face.variant)
            .metrics(ch, face.px as f32)
            .advance_width
    }

    fn line_metrics(&self, face: Face) -> LineMetrics {
        let px = face.px as f32;
        match self.font(face.variant).horizontal_line_metrics(px) {
            Some(metrics) => LineMetrics {
                ascent: metrics.ascent,
                height: (metrics.ascent - metrics.descent).max(1.0),
            },
            None => LineMetrics {
                ascent: px * 0.8,
                height: px,
            },
        }
    }

    fn rasterize(&self, face: Face, ch: char) -> GlyphBitmap {
        let (metrics, coverage) = self.font(face.variant).rasterize(ch, face.px as f32);
        GlyphBitmap {
            xmin: metrics.xmin,
            ymin: metrics.ymin,
            width: metrics.width,
            height: metrics.height,
            coverage,
        }
    }
}

/// Font-free typeface drawing every visible character as a solid block.
///
/// Advances are a fixed fraction of the pixel size, which makes widths exact
/// and predictable for headless rendering and tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct BoxTypeface;

impl BoxTypeface {
    pub const ADVANCE_RATIO: f32 = 0.5;
    pub const ASCENT_RATIO: f32 = 0.8;
    pub const HEIGHT_RATIO: f32 = 1.0;

    fn advance_px(face: Face) -> f32 {
        (face.px as f32 * Self::ADVANCE_RATIO).round().max(1.0)
    }
}

impl Typeface for BoxTypeface {
    fn advance(&self, face: Face, _ch: char) -> f32 {
        Self::advance_px(face)
    }

    fn line_metrics(&self, face: Face) -> LineMetrics {
        let px = face.px as f32;
        LineMetrics {
            ascent: (px * Self::ASCENT_RATIO).round(),
            height: (px * Self::HEIGHT_RATIO).round().max(1.0),
        }
    }

    fn rasterize(&self, face: Face, ch: char) -> GlyphBitmap {
        if ch.is_whitespace() {
            return GlyphBitmap::default();
        }
        let width = (Self::advance_px(face) as usize).saturating_sub(1).max(1);
        let height = ((face.px as f32 * Self::ASCENT_RATIO).round() as usize).max(1);
        let value = match face.variant {
            Variant::Regular | Variant::Bold => 255,
            Variant::Italic => 160,
        };
        GlyphBitmap {
            xmin: 0,
            ymin: 0,
            width,
            height,
            coverage: vec![value; width * height],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn heading_sizes_decrease_with_depth() {
        let styles = StyleTable::new(32, 2);
        let sizes = (1..=6).map(|level| styles.heading_px(level)).collect::<Vec<_>>();
        assert_eq!(sizes, vec![44, 42, 40, 38, 36, 34]);
        assert!(sizes.iter().all(|px| *px > styles.base_px));
        assert_eq!(styles.heading_px(9), styles.heading_px(6));
    }

    #[test]
    fn faces_follow_line_kind_and_span_style() {
        let styles = StyleTable::new(20, 4);
        assert_eq!(
            styles.face(LineKind::Body, SpanStyle::Regular),
            Face {
                variant: Variant::Regular,
                px: 20
            }
        );
        assert_eq!(
            styles.face(LineKind::Heading(2), SpanStyle::Regular).variant,
            Variant::Bold
        );
        assert_eq!(
            styles.face(LineKind::Heading(2), SpanStyle::Emphasis),
            Face {
                variant: Variant::Italic,
                px: 40
            }
        );
    }

    #[test]
    fn box_typeface_has_exact_advances() {
        let face = Face {
            variant: Variant::Regular,
            px: 16,
        };
        assert_eq!(BoxTypeface.advance(face, 'W'), 8.0);
        assert_eq!(BoxTypeface.advance(face, ' '), 8.0);
        assert!(BoxTypeface.rasterize(face, ' ').coverage.is_empty());
        let glyph = BoxTypeface.rasterize(face, 'A');
        assert_eq!(glyph.coverage.len(), glyph.width * glyph.height);
    }

    #[test]
    fn missing_font_file_is_a_configuration_error() {
        let config = FontConfig {
            regular: PathBuf::from("/nonexistent/regular.ttf"),
            bold: PathBuf::from("/nonexistent/bold.ttf"),
            italic: PathBuf::from("/nonexistent/italic.ttf"),
            size: 32,
            heading_step: 2,
        };
        let error = FontSet::load(&config).unwrap_err();
        assert!(matches!(error, StreamError::Configuration(_)));
        assert!(error.to_string().contains("regular font file"));
    }

    #[test]
    fn garbage_font_bytes_are_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        fs::write(&path, b"not-a-real-font").unwrap();
        let config = FontConfig {
            regular: path.clone(),
            bold: path.clone(),
            italic: path,
            size: 32,
            heading_step: 2,
        };
        let error = FontSet::load(&config).unwrap_err();
        assert!(error.to_string().contains("failed to parse regular font file"));
    }
}
