//! Image loading utilities

use crate::surface::RgbaView;
use crate::{Error, Result};
use image::{DynamicImage, GenericImageView, ImageDecoder, ImageReader};
use std::path::Path;

/// Loaded image in RGBA format
#[derive(Debug, Clone)]
pub struct LoadedImage {
    /// Image width in pixels
    pub width: u32,
    /// Image height in pixels
    pub height: u32,
    /// RGBA pixel data
    pub data: Vec<u8>,
}

impl LoadedImage {
    /// Load an image from a file path, applying its EXIF orientation
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let mut decoder = ImageReader::open(path)
            .map_err(Error::Io)?
            .with_guessed_format()
            .map_err(Error::Io)?
            .into_decoder()?;
        let orientation = decoder.orientation()?;
        let mut img = DynamicImage::from_decoder(decoder)?;
        img.apply_orientation(orientation);

        Ok(Self::from_dynamic_image(img))
    }

    /// Decode an image held in memory
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let img = image::load_from_memory(bytes)?;
        Ok(Self::from_dynamic_image(img))
    }

    /// Create from a DynamicImage
    pub fn from_dynamic_image(img: DynamicImage) -> Self {
        let (width, height) = img.dimensions();
        let rgba = img.to_rgba8();
        let data = rgba.into_raw();

        Self {
            width,
            height,
            data,
        }
    }

    pub fn view(&self) -> RgbaView<'_> {
        RgbaView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    /// Resize the image to exactly the given dimensions
    pub fn resize(&self, target_width: u32, target_height: u32) -> Result<Self> {
        if self.width == target_width && self.height == target_height {
            return Ok(self.clone());
        }

        let img = image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| Error::Decode("Invalid image data".to_string()))?;

        let resized = image::imageops::resize(
            &img,
            target_width.max(1),
            target_height.max(1),
            image::imageops::FilterType::Triangle,
        );

        Ok(Self {
            width: resized.width(),
            height: resized.height(),
            data: resized.into_raw(),
        })
    }

    /// Shrink the image so that covering a `max_width` x `max_height` canvas
    /// never needs to scale it down. Smaller images are returned unchanged.
    pub fn shrink_to_canvas(self, max_width: u32, max_height: u32) -> Result<Self> {
        let scale_x = max_width as f64 / self.width as f64;
        let scale_y = max_height as f64 / self.height as f64;
        let scale = scale_x.max(scale_y);
        if scale >= 1.0 {
            return Ok(self);
        }

        let new_width = (self.width as f64 * scale).round() as u32;
        let new_height = (self.height as f64 * scale).round() as u32;
        self.resize(new_width, new_height)
    }
}
