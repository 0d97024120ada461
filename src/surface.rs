//! The render surface every frame is painted on
//!
//! A single [`RenderSurface`] is reused for the whole run: title card, letter
//! pages, photos, video frames and transitions all paint into the same RGBA
//! buffer. Nothing is double-buffered, so every frame must fully repaint the
//! surface (`fill` or an opaque full-canvas draw) before compositing on top.

use crate::{Color, Error, FitMode, Result};

/// Borrowed RGBA pixels
#[derive(Debug, Clone, Copy)]
pub struct RgbaView<'a> {
    pub width: u32,
    pub height: u32,
    pub data: &'a [u8],
}

impl RgbaView<'_> {
    fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let idx = ((y * self.width + x) * 4) as usize;
        [
            self.data[idx],
            self.data[idx + 1],
            self.data[idx + 2],
            self.data[idx + 3],
        ]
    }
}

/// Placement of a scaled source inside the canvas.
///
/// `x`/`y` are negative when `cover` crops the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitRect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

/// Aspect-preserving placement of a `src_width` x `src_height` source
pub fn fit_rect(src_width: u32, src_height: u32, dst_width: u32, dst_height: u32, fit: FitMode) -> FitRect {
    if src_width == 0 || src_height == 0 {
        return FitRect {
            x: 0,
            y: 0,
            width: 0,
            height: 0,
        };
    }

    let scale_x = dst_width as f64 / src_width as f64;
    let scale_y = dst_height as f64 / src_height as f64;
    let scale = match fit {
        FitMode::Contain => scale_x.min(scale_y),
        FitMode::Cover => scale_x.max(scale_y),
    };

    let width = ((src_width as f64 * scale).round() as u32).max(1);
    let height = ((src_height as f64 * scale).round() as u32).max(1);

    FitRect {
        x: (dst_width as i32 - width as i32) / 2,
        y: (dst_height as i32 - height as i32) / 2,
        width,
        height,
    }
}

/// Snapshot of the surface pixels, used as transition endpoints
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Snapshot {
    pub fn view(&self) -> RgbaView<'_> {
        RgbaView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// The reusable RGBA canvas
#[derive(Debug, Clone)]
pub struct RenderSurface {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl RenderSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidInput(format!(
                "surface size must be non-zero, got {}x{}",
                width, height
            )));
        }
        if width % 2 != 0 || height % 2 != 0 {
            return Err(Error::InvalidInput(format!(
                "surface size must be even for yuv420p output, got {}x{}",
                width, height
            )));
        }

        Ok(Self {
            width,
            height,
            data: vec![0; (width * height * 4) as usize],
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw RGBA bytes, `width * height * 4` long
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn view(&self) -> RgbaView<'_> {
        RgbaView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        self.view().pixel(x, y)
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            width: self.width,
            height: self.height,
            data: self.data.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: &Snapshot) {
        debug_assert_eq!(snapshot.data.len(), self.data.len());
        self.data.copy_from_slice(&snapshot.data);
    }

    /// Repaint the whole surface with one opaque color
    pub fn fill(&mut self, color: Color) {
        let rgba = color.to_rgba();
        for px in self.data.chunks_exact_mut(4) {
            px.copy_from_slice(&rgba);
        }
    }

    /// Repaint the surface and draw `image` scaled into it according to `fit`.
    ///
    /// `contain` leaves black bars, `cover` crops the overflow around the center.
    pub fn draw_centered(&mut self, image: RgbaView<'_>, fit: FitMode) -> Result<()> {
        self.fill(Color::BLACK);
        let rect = fit_rect(image.width, image.height, self.width, self.height, fit);
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }

        if rect.width == image.width && rect.height == image.height {
            self.blit(image, rect.x, rect.y);
            return Ok(());
        }

        let src = image::RgbaImage::from_raw(image.width, image.height, image.data.to_vec())
            .ok_or_else(|| Error::Decode("frame buffer does not match its size".to_string()))?;
        let scaled = image::imageops::resize(
            &src,
            rect.width,
            rect.height,
            image::imageops::FilterType::Triangle,
        );
        self.blit(
            RgbaView {
                width: scaled.width(),
                height: scaled.height(),
                data: scaled.as_raw(),
            },
            rect.x,
            rect.y,
        );
        Ok(())
    }

    /// Copy `image` at (x, y), clipped to the surface. Alpha is forced opaque.
    pub fn blit(&mut self, image: RgbaView<'_>, x: i32, y: i32) {
        let Some((sx0, sy0, dx0, dy0, w, h)) = self.clip(image.width, image.height, x, y) else {
            return;
        };

        for row in 0..h {
            let src_start = (((sy0 + row) * image.width + sx0) * 4) as usize;
            let dst_start = (((dy0 + row) * self.width + dx0) * 4) as usize;
            let len = (w * 4) as usize;
            let dst = &mut self.data[dst_start..dst_start + len];
            dst.copy_from_slice(&image.data[src_start..src_start + len]);
            for px in dst.chunks_exact_mut(4) {
                px[3] = 255;
            }
        }
    }

    /// Composite `image` at (x, y) with a global opacity
    pub fn blend(&mut self, image: RgbaView<'_>, x: i32, y: i32, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 {
            return;
        }
        let Some((sx0, sy0, dx0, dy0, w, h)) = self.clip(image.width, image.height, x, y) else {
            return;
        };

        for row in 0..h {
            for col in 0..w {
                let src = image.pixel(sx0 + col, sy0 + row);
                let a = alpha * src[3] as f32 / 255.0;
                let idx = (((dy0 + row) * self.width + dx0 + col) * 4) as usize;
                blend_pixel(&mut self.data[idx..idx + 4], [src[0], src[1], src[2]], a);
            }
        }
    }

    /// Draw `image` scaled by `scale` around the surface center, nearest-neighbour
    pub fn blend_scaled(&mut self, image: RgbaView<'_>, scale: f32, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 || scale <= 0.0 || image.width == 0 || image.height == 0 {
            return;
        }

        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        let icx = image.width as f32 / 2.0;
        let icy = image.height as f32 / 2.0;

        for y in 0..self.height {
            let sy = ((y as f32 + 0.5 - cy) / scale + icy).floor();
            if sy < 0.0 || sy >= image.height as f32 {
                continue;
            }
            for x in 0..self.width {
                let sx = ((x as f32 + 0.5 - cx) / scale + icx).floor();
                if sx < 0.0 || sx >= image.width as f32 {
                    continue;
                }
                let src = image.pixel(sx as u32, sy as u32);
                let idx = ((y * self.width + x) * 4) as usize;
                blend_pixel(&mut self.data[idx..idx + 4], [src[0], src[1], src[2]], alpha);
            }
        }
    }

    /// Fill a rectangle with a translucent color
    pub fn fill_rect(&mut self, x: i32, y: i32, width: u32, height: u32, color: Color, alpha: f32) {
        let alpha = alpha.clamp(0.0, 1.0);
        let Some((_, _, dx0, dy0, w, h)) = self.clip(width, height, x, y) else {
            return;
        };

        for row in 0..h {
            for col in 0..w {
                let idx = (((dy0 + row) * self.width + dx0 + col) * 4) as usize;
                blend_pixel(&mut self.data[idx..idx + 4], [color.r, color.g, color.b], alpha);
            }
        }
    }

    /// Composite a coverage mask (one byte per pixel) in `color`
    #[allow(clippy::too_many_arguments)]
    pub fn blend_mask(
        &mut self,
        mask: &[u8],
        mask_width: u32,
        mask_height: u32,
        x: i32,
        y: i32,
        color: Color,
        alpha: f32,
    ) {
        let alpha = alpha.clamp(0.0, 1.0);
        if alpha <= 0.0 || mask.len() < (mask_width * mask_height) as usize {
            return;
        }
        let Some((sx0, sy0, dx0, dy0, w, h)) = self.clip(mask_width, mask_height, x, y) else {
            return;
        };

        for row in 0..h {
            for col in 0..w {
                let coverage = mask[((sy0 + row) * mask_width + sx0 + col) as usize];
                if coverage == 0 {
                    continue;
                }
                let a = alpha * coverage as f32 / 255.0;
                let idx = (((dy0 + row) * self.width + dx0 + col) * 4) as usize;
                blend_pixel(&mut self.data[idx..idx + 4], [color.r, color.g, color.b], a);
            }
        }
    }

    /// Intersect a `w` x `h` source placed at (x, y) with the surface.
    ///
    /// Returns (src_x, src_y, dst_x, dst_y, width, height).
    fn clip(&self, w: u32, h: u32, x: i32, y: i32) -> Option<(u32, u32, u32, u32, u32, u32)> {
        let x0 = x.max(0);
        let y0 = y.max(0);
        let x1 = (x + w as i32).min(self.width as i32);
        let y1 = (y + h as i32).min(self.height as i32);
        if x1 <= x0 || y1 <= y0 {
            return None;
        }
        Some((
            (x0 - x) as u32,
            (y0 - y) as u32,
            x0 as u32,
            y0 as u32,
            (x1 - x0) as u32,
            (y1 - y0) as u32,
        ))
    }
}

fn blend_pixel(dst: &mut [u8], src: [u8; 3], alpha: f32) {
    let inv = 1.0 - alpha;
    for c in 0..3 {
        dst[c] = (src[c] as f32 * alpha + dst[c] as f32 * inv).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = 255;
}
