//! Text painting for title cards, letter pages and caption overlays

use crate::surface::RenderSurface;
use crate::{Color, Error, Result};
use fontdue::layout::{CoordinateSystem, Layout, LayoutSettings, TextStyle};
use fontdue::{Font, FontSettings};
use std::path::Path;

const ELLIPSIS: char = '…';

/// Serif fonts tried when no font path is configured
const FALLBACK_FONTS: [&str; 6] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSerif.ttf",
    "/usr/share/fonts/TTF/DejaVuSerif.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSerif-Regular.ttf",
    "/usr/share/fonts/liberation/LiberationSerif-Regular.ttf",
    "/Library/Fonts/Georgia.ttf",
    "C:\\Windows\\Fonts\\georgia.ttf",
];

/// Horizontal alignment of a text line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Align {
    Left,
    Center,
    Right,
}

pub struct TextPainter {
    font: Font,
}

impl TextPainter {
    /// Parse a TTF/OTF font
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self> {
        let font = Font::from_bytes(bytes, FontSettings::default())
            .map_err(|e| Error::InvalidInput(format!("failed to parse font: {}", e)))?;
        Ok(Self { font })
    }

    /// Load the configured font, or the first system fallback that parses.
    ///
    /// Returns `None` when nothing loads; callers then skip text entirely.
    pub fn load(font_path: Option<&Path>) -> Option<Self> {
        if let Some(path) = font_path {
            match std::fs::read(path).map_err(Error::Io).and_then(Self::from_bytes) {
                Ok(painter) => return Some(painter),
                Err(e) => tracing::warn!(path = %path.display(), error = %e, "configured font failed to load"),
            }
        }

        for candidate in FALLBACK_FONTS {
            let Ok(bytes) = std::fs::read(candidate) else {
                continue;
            };
            if let Ok(painter) = Self::from_bytes(bytes) {
                tracing::debug!(font = candidate, "using fallback font");
                return Some(painter);
            }
        }

        tracing::warn!("no usable font found, text will not be drawn");
        None
    }

    /// Advance width of `text` at `px`
    pub fn measure(&self, text: &str, px: f32) -> f32 {
        text.chars()
            .map(|ch| self.font.metrics(ch, px).advance_width)
            .sum()
    }

    pub fn line_height(&self, px: f32) -> f32 {
        self.font
            .horizontal_line_metrics(px)
            .map(|m| m.new_line_size)
            .unwrap_or(px * 1.25)
    }

    /// `text` cut to `max_width`, ending in an ellipsis when cut
    pub fn truncate(&self, text: &str, px: f32, max_width: f32) -> String {
        truncate_with_ellipsis(text, max_width, |s| self.measure(s, px))
    }

    /// Greedy word wrap to `max_width`
    pub fn wrap(&self, text: &str, px: f32, max_width: f32) -> Vec<String> {
        wrap_lines(text, max_width, |s| self.measure(s, px))
    }

    /// Draw one line with its top edge at `y`.
    ///
    /// `x` is the left edge, center or right edge depending on `align`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_line(
        &self,
        surface: &mut RenderSurface,
        text: &str,
        x: f32,
        y: f32,
        px: f32,
        align: Align,
        color: Color,
        alpha: f32,
    ) {
        if text.is_empty() || alpha <= 0.0 {
            return;
        }

        let width = self.measure(text, px);
        let left = match align {
            Align::Left => x,
            Align::Center => x - width / 2.0,
            Align::Right => x - width,
        };

        let mut layout = Layout::new(CoordinateSystem::PositiveYDown);
        layout.reset(&LayoutSettings {
            x: left,
            y,
            ..LayoutSettings::default()
        });
        layout.append(&[&self.font], &TextStyle::new(text, px, 0));

        for glyph in layout.glyphs() {
            if glyph.width == 0 || glyph.height == 0 {
                continue;
            }
            let (_, bitmap) = self.font.rasterize_config(glyph.key);
            surface.blend_mask(
                &bitmap,
                glyph.width as u32,
                glyph.height as u32,
                glyph.x.round() as i32,
                glyph.y.round() as i32,
                color,
                alpha,
            );
        }
    }
}

/// Cut `text` so that it plus an ellipsis fits `max_width`
pub fn truncate_with_ellipsis(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> String {
    if measure(text) <= max_width {
        return text.to_string();
    }

    let chars: Vec<char> = text.chars().collect();
    let mut keep = chars.len();
    while keep > 0 {
        keep -= 1;
        let mut candidate: String = chars[..keep].iter().collect();
        let trimmed_len = candidate.trim_end().len();
        candidate.truncate(trimmed_len);
        candidate.push(ELLIPSIS);
        if measure(&candidate) <= max_width {
            return candidate;
        }
    }

    String::new()
}

/// Greedy word wrap. Explicit newlines start a new paragraph; a single word
/// wider than `max_width` gets its own line.
pub fn wrap_lines(text: &str, max_width: f32, measure: impl Fn(&str) -> f32) -> Vec<String> {
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            if current.is_empty() {
                current.push_str(word);
                continue;
            }
            let candidate = format!("{} {}", current, word);
            if measure(&candidate) <= max_width {
                current = candidate;
            } else {
                lines.push(std::mem::take(&mut current));
                current.push_str(word);
            }
        }
        lines.push(current);
    }

    lines
}
