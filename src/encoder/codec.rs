//! Codec strategy table and run-time capability probing
//!
//! Codec support differs between machines (ffmpeg builds without libvpx,
//! without libx264, ...), so the recorder format is picked at run time from
//! an ordered preference list rather than hard-coded.

use super::ffmpeg::find_ffmpeg;
use crate::{Error, Result};
use std::process::Command;

/// Video codec of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoCodec {
    Vp9,
    Vp8,
    H264,
    Av1,
}

impl VideoCodec {
    /// Name of the ffmpeg encoder implementing this codec
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            VideoCodec::Vp9 => "libvpx-vp9",
            VideoCodec::Vp8 => "libvpx",
            VideoCodec::H264 => "libx264",
            VideoCodec::Av1 => "librav1e",
        }
    }
}

/// Audio codec of a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioCodec {
    Opus,
}

impl AudioCodec {
    pub fn ffmpeg_encoder(&self) -> &'static str {
        match self {
            AudioCodec::Opus => "libopus",
        }
    }
}

/// Container the recorder writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    WebM,
    /// WebM's parent format; needed for H.264 which WebM proper does not allow
    Matroska,
}

impl ContainerFormat {
    pub fn ffmpeg_format(&self) -> &'static str {
        match self {
            ContainerFormat::WebM => "webm",
            ContainerFormat::Matroska => "matroska",
        }
    }
}

/// Which implementation records a descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// External ffmpeg process
    Ffmpeg,
    /// In-process rav1e encoder with the built-in WebM muxer
    BuiltinAv1,
}

/// One entry of the strategy table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecDescriptor {
    pub mime_type: &'static str,
    pub video: VideoCodec,
    pub audio: Option<AudioCodec>,
    pub container: ContainerFormat,
    pub backend: Backend,
}

/// Recorder formats in order of preference
pub const PREFERENCES: [CodecDescriptor; 6] = [
    CodecDescriptor {
        mime_type: "video/webm;codecs=vp9,opus",
        video: VideoCodec::Vp9,
        audio: Some(AudioCodec::Opus),
        container: ContainerFormat::WebM,
        backend: Backend::Ffmpeg,
    },
    CodecDescriptor {
        mime_type: "video/webm;codecs=vp8,opus",
        video: VideoCodec::Vp8,
        audio: Some(AudioCodec::Opus),
        container: ContainerFormat::WebM,
        backend: Backend::Ffmpeg,
    },
    CodecDescriptor {
        mime_type: "video/webm;codecs=h264,opus",
        video: VideoCodec::H264,
        audio: Some(AudioCodec::Opus),
        container: ContainerFormat::Matroska,
        backend: Backend::Ffmpeg,
    },
    CodecDescriptor {
        mime_type: "video/webm;codecs=vp9",
        video: VideoCodec::Vp9,
        audio: None,
        container: ContainerFormat::WebM,
        backend: Backend::Ffmpeg,
    },
    CodecDescriptor {
        mime_type: "video/webm;codecs=vp8",
        video: VideoCodec::Vp8,
        audio: None,
        container: ContainerFormat::WebM,
        backend: Backend::Ffmpeg,
    },
    CodecDescriptor {
        mime_type: "video/webm",
        video: VideoCodec::Av1,
        audio: None,
        container: ContainerFormat::WebM,
        backend: Backend::BuiltinAv1,
    },
];

/// Platform capability predicate
pub trait CodecProbe {
    fn is_supported(&self, descriptor: &CodecDescriptor) -> bool;
}

/// Pick the first supported descriptor.
///
/// With `require_audio`, descriptors without an audio codec are skipped.
pub fn negotiate(
    probe: &dyn CodecProbe,
    preferences: &[CodecDescriptor],
    require_audio: bool,
) -> Result<CodecDescriptor> {
    let chosen = preferences
        .iter()
        .filter(|d| !require_audio || d.audio.is_some())
        .find(|d| probe.is_supported(d))
        .copied();

    match chosen {
        Some(descriptor) => {
            tracing::debug!(mime = descriptor.mime_type, require_audio, "negotiated recorder format");
            Ok(descriptor)
        }
        None => Err(Error::CodecUnavailable(format!(
            "none of {} candidate formats is supported{}",
            preferences.len(),
            if require_audio { " with audio" } else { "" }
        ))),
    }
}

/// Probe backed by `ffmpeg -encoders`, run once at construction
#[derive(Debug, Clone, Default)]
pub struct FfmpegProbe {
    encoders: Vec<String>,
}

impl FfmpegProbe {
    /// Query the ffmpeg binary. A missing or failing ffmpeg yields an empty
    /// encoder list, leaving only the built-in backend available.
    pub fn new(ffmpeg_path: Option<&str>) -> Self {
        let listing = find_ffmpeg(ffmpeg_path).and_then(|ffmpeg| {
            Command::new(&ffmpeg)
                .args(["-hide_banner", "-encoders"])
                .output()
                .map_err(|e| Error::Ffmpeg(format!("Failed to run ffmpeg: {}", e)))
        });

        match listing {
            Ok(output) => Self::from_encoder_list(&String::from_utf8_lossy(&output.stdout)),
            Err(e) => {
                tracing::warn!(error = %e, "ffmpeg encoders unavailable");
                Self::default()
            }
        }
    }

    /// Parse the table printed by `ffmpeg -encoders`
    pub fn from_encoder_list(listing: &str) -> Self {
        // Rows follow the " ------" separator: " V....D libvpx-vp9  libvpx VP9"
        let encoders = listing
            .lines()
            .skip_while(|line| !line.trim_start().starts_with("---"))
            .skip(1)
            .filter_map(|line| line.split_whitespace().nth(1).map(str::to_string))
            .collect();

        Self { encoders }
    }

    pub fn has_encoder(&self, name: &str) -> bool {
        self.encoders.iter().any(|e| e == name)
    }
}

impl CodecProbe for FfmpegProbe {
    fn is_supported(&self, descriptor: &CodecDescriptor) -> bool {
        match descriptor.backend {
            Backend::BuiltinAv1 => cfg!(feature = "av1"),
            Backend::Ffmpeg => {
                self.has_encoder(descriptor.video.ffmpeg_encoder())
                    && descriptor
                        .audio
                        .map_or(true, |a| self.has_encoder(a.ffmpeg_encoder()))
            }
        }
    }
}

/// Probe with a fixed set of supported mime types
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    supported: Vec<String>,
}

impl StaticProbe {
    pub fn new<I, S>(mime_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            supported: mime_types.into_iter().map(Into::into).collect(),
        }
    }
}

impl CodecProbe for StaticProbe {
    fn is_supported(&self, descriptor: &CodecDescriptor) -> bool {
        self.supported.iter().any(|m| m == descriptor.mime_type)
    }
}
