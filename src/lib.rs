//! tripreel - Trip montage video generation
//!
//! Turns a trip's photos, videos and manuscript letter pages into a single
//! WebM montage:
//! - `VideoGenerator::generate`: run a generation on the current thread
//! - `VideoGenerator::spawn`: run it on a background thread with a progress
//!   channel and a cancel token

pub mod audio;
pub mod config;
pub mod encoder;
pub mod error;
pub mod fetch;
pub mod generator;
pub mod image_loader;
pub mod model;
pub mod muxer;
pub mod progress;
pub mod render;
pub mod surface;
pub mod text;
pub mod timeline;
pub mod timing;
pub mod transition;
pub mod video_source;

use serde::{Deserialize, Serialize};

pub use config::{GeneratorOptions, RenderConfig};
pub use error::{Error, ErrorCode, Result};
pub use generator::{EncodedOutput, GenerationTask, VideoGenerator};
pub use model::{AudioTrack, GenerationRequest, Itinerary, LetterPage, MediaKind, MediaRecord, Trip};
pub use progress::{CancelToken, Phase, ProgressEvent};
pub use timing::TimingPlan;
pub use transition::TransitionKind;

/// Frame rate of every generated video
pub const FPS: u32 = 30;

/// Output resolution class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Resolution {
    /// 854x480
    #[serde(rename = "480p")]
    P480,
    /// 1280x720
    #[default]
    #[serde(rename = "720p")]
    P720,
    /// 1920x1080
    #[serde(rename = "1080p")]
    P1080,
}

impl Resolution {
    /// Canvas size in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        match self {
            Resolution::P480 => (854, 480),
            Resolution::P720 => (1280, 720),
            Resolution::P1080 => (1920, 1080),
        }
    }
}

/// Bitrate tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    #[serde(alias = "alta")]
    High,
    #[default]
    #[serde(alias = "media")]
    Medium,
    #[serde(alias = "baja")]
    Low,
}

impl Quality {
    /// Target video bitrate in bits per second
    pub fn bitrate(&self) -> u32 {
        match self {
            Quality::High => 8_000_000,
            Quality::Medium => 5_000_000,
            Quality::Low => 2_500_000,
        }
    }
}

/// How media is scaled into the canvas
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Fit entirely inside the canvas, letterboxing the remainder
    #[default]
    Contain,
    /// Fill the canvas, cropping overflow
    Cover,
}

/// RGB color representation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color::rgb(0, 0, 0);
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::BLACK
    }
}

/// Convert seconds to a whole frame count at [`FPS`]
pub fn secs_to_frames(secs: f64) -> u64 {
    if !secs.is_finite() || secs <= 0.0 {
        return 0;
    }
    (secs * FPS as f64).round() as u64
}
