//! Capture pipeline: codec negotiation and recorders turning painted frames
//! into an encoded byte stream

#[cfg(feature = "av1")]
pub mod av1;

pub mod codec;
pub mod ffmpeg;

pub use codec::{negotiate, CodecDescriptor, CodecProbe, FfmpegProbe, StaticProbe, PREFERENCES};

use crate::surface::RenderSurface;
use crate::Result;
use codec::Backend;

/// Encoded video packet
#[derive(Debug, Clone)]
pub struct Packet {
    /// Encoded data
    pub data: Vec<u8>,
    /// Presentation timestamp in frame units
    pub pts: i64,
    /// Is this a keyframe?
    pub is_keyframe: bool,
}

/// Recorder configuration, fixed before the first frame
#[derive(Debug, Clone)]
pub struct RecorderConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate (frames per second)
    pub fps: u32,
    /// Target bitrate in bits per second
    pub bitrate: u32,
    /// Expected length, written into container headers when known
    pub duration_secs: Option<f64>,
}

/// A stream recorder fed one painted frame at a time.
///
/// Encoded output is buffered in memory and handed back in one piece by
/// `finish`. A failure at any point loses the whole recording.
pub trait Recorder: Send {
    /// Encode the current surface contents as the next frame
    fn write_frame(&mut self, surface: &RenderSurface) -> Result<()>;

    /// Flush the encoder and return the finished container bytes
    fn finish(self: Box<Self>) -> Result<Vec<u8>>;
}

/// Create a recorder for a negotiated descriptor
pub fn create_recorder(
    descriptor: &CodecDescriptor,
    config: RecorderConfig,
    ffmpeg_path: Option<&str>,
) -> Result<Box<dyn Recorder>> {
    match descriptor.backend {
        Backend::Ffmpeg => Ok(Box::new(ffmpeg::FfmpegRecorder::new(
            descriptor,
            config,
            ffmpeg_path,
        )?)),
        #[cfg(feature = "av1")]
        Backend::BuiltinAv1 => Ok(Box::new(av1::Av1Recorder::new(config)?)),
        #[cfg(not(feature = "av1"))]
        Backend::BuiltinAv1 => Err(crate::Error::CodecUnavailable(
            "AV1 support not compiled in".to_string(),
        )),
    }
}
