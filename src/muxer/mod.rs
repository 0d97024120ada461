//! Video container muxers

pub mod webm;

pub use webm::WebmMuxer;

/// Muxer configuration
#[derive(Debug, Clone)]
pub struct MuxerConfig {
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Frame rate (fps)
    pub fps: u32,
    /// Matroska codec ID, e.g. `V_AV1`
    pub codec_id: &'static str,
    /// Codec-specific configuration record (CodecPrivate), e.g. av1C
    pub codec_private: Option<Vec<u8>>,
    /// Total duration in milliseconds, when known up front
    pub duration_ms: Option<f64>,
}
