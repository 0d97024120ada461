//! Frame renderer: paints media frames, caption overlays, the title card and
//! letter pages onto the shared surface

use crate::config::RenderConfig;
use crate::image_loader::LoadedImage;
use crate::model::{LetterPage, MediaRecord};
use crate::surface::{RenderSurface, RgbaView};
use crate::text::{Align, TextPainter};
use crate::video_source::DecodedFrame;
use crate::{Color, FitMode, Result};
use std::path::Path;

/// Frames the title card and letter pages take to fade in, and to fade out
pub const FADE_RAMP_FRAMES: u64 = 30;

const OVERLAY_ALPHA: f32 = 0.6;
/// Overlay bar height as a share of the canvas height
const OVERLAY_HEIGHT: f32 = 0.12;
const DATE_FORMAT: &str = "%d/%m/%Y";

const TITLE_BACKGROUND: Color = Color::rgb(18, 22, 30);
const TITLE_TEXT: Color = Color::rgb(240, 236, 226);
const PARCHMENT: Color = Color::rgb(244, 232, 208);
const INK: Color = Color::rgb(62, 44, 28);

/// One frame of media content
#[derive(Debug, Clone, Copy)]
pub enum MediaFrame<'a> {
    Photo(&'a LoadedImage),
    VideoFrame(&'a DecodedFrame),
}

impl<'a> MediaFrame<'a> {
    pub fn view(&self) -> RgbaView<'a> {
        match self {
            MediaFrame::Photo(image) => image.view(),
            MediaFrame::VideoFrame(frame) => frame.view(),
        }
    }
}

/// Overlay text laid out once per media item
#[derive(Debug, Clone, PartialEq)]
pub struct Overlay {
    /// Caption, already truncated to the room left by the date
    pub caption: Option<String>,
    pub date: Option<String>,
    canvas: (u32, u32),
}

fn overlay_bar(height: u32) -> u32 {
    ((height as f32 * OVERLAY_HEIGHT).round() as u32).max(1)
}

/// Truncate `caption` to the bar width left over by the margins and the date
fn fit_caption(painter: &TextPainter, caption: &str, date: Option<&str>, width: u32, height: u32) -> String {
    let px = overlay_bar(height) as f32 * 0.4;
    let margin = width as f32 * 0.03;
    let date_width = date.map_or(0.0, |d| painter.measure(d, px));
    let gap = if date.is_some() { margin } else { 0.0 };
    let available = (width as f32 - 2.0 * margin - gap - date_width).max(0.0);
    painter.truncate(caption, px, available)
}

/// Opacity of frame `index` of `total` with a fade-in and fade-out of `ramp` frames
pub fn fade_alpha(index: u64, total: u64, ramp: u64) -> f32 {
    let ramp = ramp.min(total / 2);
    if ramp == 0 || index >= total {
        return 1.0;
    }
    let fade_in = (index + 1) as f32 / ramp as f32;
    let fade_out = (total - index) as f32 / ramp as f32;
    fade_in.min(fade_out).min(1.0)
}

pub struct FrameRenderer {
    painter: Option<TextPainter>,
    show_overlay: bool,
    fit: FitMode,
}

impl FrameRenderer {
    pub fn new(painter: Option<TextPainter>, show_overlay: bool, fit: FitMode) -> Self {
        Self {
            painter,
            show_overlay,
            fit,
        }
    }

    /// Renderer for `config`, loading the configured font or a system fallback
    pub fn from_config(config: &RenderConfig, font_path: Option<&Path>) -> Self {
        Self::new(TextPainter::load(font_path), config.show_overlay, config.fit)
    }

    pub fn has_text(&self) -> bool {
        self.painter.is_some()
    }

    /// Repaint the surface with one media frame and its overlay
    pub fn draw_media(
        &self,
        surface: &mut RenderSurface,
        frame: MediaFrame<'_>,
        record: &MediaRecord,
    ) -> Result<()> {
        let overlay = self.overlay_for(record, surface.width(), surface.height());
        self.draw_media_with(surface, frame, overlay.as_ref())
    }

    /// Like `draw_media`, with an overlay laid out beforehand by `overlay_for`
    pub fn draw_media_with(
        &self,
        surface: &mut RenderSurface,
        frame: MediaFrame<'_>,
        overlay: Option<&Overlay>,
    ) -> Result<()> {
        surface.draw_centered(frame.view(), self.fit)?;
        if let Some(overlay) = overlay {
            self.draw_overlay(surface, overlay);
        }
        Ok(())
    }

    /// Caption and date of `record` fitted to a `width` x `height` canvas.
    /// `None` when overlays are off or there is nothing to show.
    pub fn overlay_for(&self, record: &MediaRecord, width: u32, height: u32) -> Option<Overlay> {
        if !self.show_overlay {
            return None;
        }
        let caption = record
            .caption
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty());
        let date = record
            .captured_at
            .map(|ts| ts.format(DATE_FORMAT).to_string());
        if caption.is_none() && date.is_none() {
            return None;
        }

        let caption = match (&self.painter, caption) {
            (Some(painter), Some(caption)) => {
                Some(fit_caption(painter, caption, date.as_deref(), width, height))
            }
            (None, caption) => caption.map(str::to_string),
            (Some(_), None) => None,
        };
        Some(Overlay {
            caption,
            date,
            canvas: (width, height),
        })
    }

    /// Bottom bar with the caption on the left and the capture date on the right
    pub fn draw_overlay(&self, surface: &mut RenderSurface, overlay: &Overlay) {
        let (width, height) = (surface.width(), surface.height());
        let bar = overlay_bar(height);
        let top = height - bar;
        surface.fill_rect(0, top as i32, width, bar, Color::BLACK, OVERLAY_ALPHA);

        let Some(painter) = &self.painter else {
            return;
        };
        let px = bar as f32 * 0.4;
        let margin = width as f32 * 0.03;
        let y = top as f32 + (bar as f32 - painter.line_height(px)) / 2.0;

        if let Some(date) = &overlay.date {
            painter.draw_line(surface, date, width as f32 - margin, y, px, Align::Right, Color::WHITE, 1.0);
        }
        if let Some(caption) = &overlay.caption {
            let caption = if overlay.canvas == (width, height) {
                std::borrow::Cow::Borrowed(caption.as_str())
            } else {
                // Laid out for another canvas
                std::borrow::Cow::Owned(fit_caption(painter, caption, overlay.date.as_deref(), width, height))
            };
            painter.draw_line(surface, &caption, margin, y, px, Align::Left, Color::WHITE, 1.0);
        }
    }

    /// Opening card with the trip name, frame `index` of `total`
    pub fn draw_title_card(
        &self,
        surface: &mut RenderSurface,
        title: &str,
        subtitle: Option<&str>,
        index: u64,
        total: u64,
    ) {
        let alpha = fade_alpha(index, total, FADE_RAMP_FRAMES);
        let (width, height) = (surface.width(), surface.height());
        surface.fill(Color::BLACK);
        surface.fill_rect(0, 0, width, height, TITLE_BACKGROUND, alpha);

        let Some(painter) = &self.painter else {
            return;
        };
        let px = height as f32 / 11.0;
        let max_width = width as f32 * 0.9;
        let center = width as f32 / 2.0;
        let text = painter.truncate(title, px, max_width);
        let y = height as f32 * 0.42 - painter.line_height(px) / 2.0;
        painter.draw_line(surface, &text, center, y, px, Align::Center, TITLE_TEXT, alpha);

        if let Some(subtitle) = subtitle {
            let small = height as f32 / 26.0;
            let text = painter.truncate(subtitle, small, max_width);
            let y = y + painter.line_height(px) * 1.2;
            painter.draw_line(surface, &text, center, y, small, Align::Center, TITLE_TEXT, alpha * 0.8);
        }
    }

    /// Manuscript page: title, date and word-wrapped body on parchment
    pub fn draw_letter_page(&self, surface: &mut RenderSurface, letter: &LetterPage, index: u64, total: u64) {
        let alpha = fade_alpha(index, total, FADE_RAMP_FRAMES);
        let (width, height) = (surface.width(), surface.height());
        surface.fill(Color::BLACK);
        surface.fill_rect(0, 0, width, height, PARCHMENT, alpha);

        let Some(painter) = &self.painter else {
            return;
        };
        let margin_x = width as f32 * 0.08;
        let margin_y = height as f32 * 0.08;
        let text_width = width as f32 - 2.0 * margin_x;
        let bottom = height as f32 - margin_y;

        let title_px = height as f32 / 16.0;
        let mut y = margin_y;
        let title = painter.truncate(&letter.title, title_px, text_width);
        painter.draw_line(surface, &title, margin_x, y, title_px, Align::Left, INK, alpha);
        y += painter.line_height(title_px);

        let body_px = height as f32 / 28.0;
        if let Some(date) = letter.date {
            let text = date.format(DATE_FORMAT).to_string();
            painter.draw_line(surface, &text, margin_x, y, body_px, Align::Left, INK, alpha * 0.7);
            y += painter.line_height(body_px);
        }
        y += painter.line_height(body_px) * 0.5;

        let line_height = painter.line_height(body_px);
        for line in painter.wrap(&letter.body, body_px, text_width) {
            if y + line_height > bottom {
                break;
            }
            painter.draw_line(surface, &line, margin_x, y, body_px, Align::Left, INK, alpha);
            y += line_height;
        }
    }
}
