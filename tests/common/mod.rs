//! Common test utilities

#![allow(dead_code)]

use image::{ImageBuffer, Rgba, RgbaImage};
use std::path::Path;
use std::process::{Command, Stdio};
use tripreel::encoder::{Recorder, RecorderConfig};
use tripreel::model::{Itinerary, MediaKind, MediaRecord, Trip};
use tripreel::surface::RenderSurface;

/// Generate a test image with a solid color and a subtle gradient
pub fn generate_test_image(width: u32, height: u32, base_color: [u8; 4]) -> RgbaImage {
    let mut img = ImageBuffer::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels_mut() {
        // Add subtle gradient to make frames distinguishable
        let r = base_color[0].saturating_add((x % 50) as u8);
        let g = base_color[1].saturating_add((y % 50) as u8);
        let b = base_color[2];
        let a = base_color[3];
        *pixel = Rgba([r, g, b, a]);
    }

    img
}

/// Generate a numbered test image, one color per number
pub fn generate_numbered_image(width: u32, height: u32, number: u32) -> RgbaImage {
    let colors = [
        [255, 100, 100, 255],
        [100, 255, 100, 255],
        [100, 100, 255, 255],
        [255, 255, 100, 255],
        [255, 100, 255, 255],
        [100, 255, 255, 255],
    ];

    let color = colors[(number as usize) % colors.len()];
    generate_test_image(width, height, color)
}

/// Save a test image as JPEG
pub fn save_jpeg<P: AsRef<Path>>(img: &RgbaImage, path: P, quality: u8) -> std::io::Result<()> {
    // Convert RGBA to RGB for JPEG
    let rgb_img: image::RgbImage = image::DynamicImage::ImageRgba8(img.clone()).to_rgb8();

    let file = std::fs::File::create(path)?;
    let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(file, quality);
    encoder.encode_image(&rgb_img).map_err(std::io::Error::other)?;

    Ok(())
}

/// Save a test image as PNG
pub fn save_png<P: AsRef<Path>>(img: &RgbaImage, path: P) -> std::io::Result<()> {
    img.save(path).map_err(std::io::Error::other)
}

/// Route library logs to the test harness; repeated calls are harmless
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tripreel=debug")
        .with_test_writer()
        .try_init();
}

/// WebM and Matroska both start with the EBML magic 0x1A 0x45 0xDF 0xA3
pub fn has_ebml_header(bytes: &[u8]) -> bool {
    bytes.len() >= 4 && bytes[..4] == [0x1A, 0x45, 0xDF, 0xA3]
}

/// Whether ffmpeg is on PATH; tests needing it skip themselves otherwise
pub fn ffmpeg_available() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Render a `secs` long test pattern video with ffmpeg's built-in mpeg4 encoder
pub fn make_test_video<P: AsRef<Path>>(path: P, secs: f64, width: u32, height: u32) -> bool {
    Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("testsrc=size={}x{}:rate=25:duration={}", width, height, secs))
        .args(["-c:v", "mpeg4", "-pix_fmt", "yuv420p"])
        .arg(path.as_ref())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Render a `secs` long sine tone with ffmpeg
pub fn make_test_tone<P: AsRef<Path>>(path: P, secs: f64) -> bool {
    Command::new("ffmpeg")
        .args(["-v", "error", "-y", "-f", "lavfi", "-i"])
        .arg(format!("sine=frequency=440:sample_rate=48000:duration={}", secs))
        .arg(path.as_ref())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Container duration and audio stream presence, via ffprobe
pub fn probe_output<P: AsRef<Path>>(path: P) -> Option<(f64, bool)> {
    let output = Command::new("ffprobe")
        .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path.as_ref())
        .output()
        .ok()?;
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).ok()?;
    let duration = json["format"]["duration"].as_str()?.parse().ok()?;
    let has_audio = json["streams"]
        .as_array()?
        .iter()
        .any(|s| s["codec_type"] == "audio");
    Some((duration, has_audio))
}

pub fn trip(name: &str) -> Trip {
    Trip {
        id: 1,
        name: name.to_string(),
        start_date: None,
        end_date: None,
    }
}

pub fn itinerary(id: i64, start: &str, end: &str) -> Itinerary {
    Itinerary {
        id,
        trip_id: Some(1),
        title: None,
        start_date: start.parse().unwrap(),
        end_date: end.parse().unwrap(),
    }
}

pub fn media_record(id: i64, kind: MediaKind, path: &str, captured_at: &str) -> MediaRecord {
    MediaRecord {
        id,
        kind,
        path: path.to_string(),
        captured_at: Some(captured_at.parse().unwrap()),
        caption: Some(format!("item {}", id)),
        duration_secs: None,
        itinerary_id: None,
    }
}

/// Recorder that only counts frames
#[derive(Debug, Default)]
pub struct CountingRecorder {
    pub frames: u64,
    pub size: Option<(u32, u32)>,
}

impl Recorder for CountingRecorder {
    fn write_frame(&mut self, surface: &RenderSurface) -> tripreel::Result<()> {
        self.size = Some((surface.width(), surface.height()));
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> tripreel::Result<Vec<u8>> {
        Ok(self.frames.to_le_bytes().to_vec())
    }
}

pub fn recorder_config(width: u32, height: u32) -> RecorderConfig {
    RecorderConfig {
        width,
        height,
        fps: tripreel::FPS,
        bitrate: tripreel::Quality::Low.bitrate(),
        duration_secs: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_generate_test_image() {
        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        assert_eq!(img.width(), 100);
        assert_eq!(img.height(), 100);
    }

    #[test]
    fn test_save_jpeg() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.jpg");

        let img = generate_test_image(100, 100, [255, 0, 0, 255]);
        save_jpeg(&img, &path, 85).unwrap();

        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }
}
