//! Built-in AV1 recorder: rav1e encoder feeding the in-memory WebM muxer

use super::{Packet, Recorder, RecorderConfig};
use crate::muxer::{MuxerConfig, WebmMuxer};
use crate::surface::RenderSurface;
use crate::{Error, Result};
use rav1e::prelude::*;

/// AV1 recorder using rav1e; needs no external tools
pub struct Av1Recorder {
    context: Context<u8>,
    muxer: WebmMuxer<Vec<u8>>,
    config: RecorderConfig,
    frame_count: u64,
}

impl Av1Recorder {
    pub fn new(config: RecorderConfig) -> Result<Self> {
        if config.fps == 0 {
            return Err(Error::InvalidConfig("frame rate must be non-zero".to_string()));
        }

        let enc_config = rav1e::config::EncoderConfig {
            width: config.width as usize,
            height: config.height as usize,
            // Fastest preset; rendering is real-time bound elsewhere
            speed_settings: SpeedSettings::from_preset(10),
            time_base: Rational::new(1, config.fps as u64),
            sample_aspect_ratio: Rational::new(1, 1),
            bit_depth: 8,
            chroma_sampling: ChromaSampling::Cs420,
            chroma_sample_position: ChromaSamplePosition::Unknown,
            pixel_range: PixelRange::Full,
            min_key_frame_interval: 0,
            max_key_frame_interval: 240,
            low_latency: true,
            bitrate: config.bitrate.min(i32::MAX as u32) as i32,
            tune: Tune::Psychovisual,
            ..Default::default()
        };

        let context: Context<u8> = Config::new()
            .with_encoder_config(enc_config)
            .with_threads(0)
            .new_context()
            .map_err(|e| Error::Encode(format!("Failed to create AV1 context: {}", e)))?;

        let muxer = WebmMuxer::new(
            Vec::new(),
            MuxerConfig {
                width: config.width,
                height: config.height,
                fps: config.fps,
                codec_id: "V_AV1",
                codec_private: Some(context.container_sequence_header()),
                duration_ms: config.duration_secs.map(|secs| secs * 1000.0),
            },
        )?;

        tracing::debug!(
            width = config.width,
            height = config.height,
            bitrate = config.bitrate,
            "built-in AV1 recorder started"
        );

        Ok(Self {
            context,
            muxer,
            config,
            frame_count: 0,
        })
    }

    /// Convert RGBA pixels to a YUV420 frame (BT.601, full range)
    fn rgba_to_yuv420(&self, rgba: &[u8]) -> rav1e::Frame<u8> {
        let mut yuv_frame = self.context.new_frame();

        let width = self.config.width as usize;
        let height = self.config.height as usize;

        let mut y_plane = vec![0u8; width * height];
        for (dst, px) in y_plane.iter_mut().zip(rgba.chunks_exact(4)) {
            let (r, g, b) = (px[0] as f32, px[1] as f32, px[2] as f32);
            *dst = (0.299 * r + 0.587 * g + 0.114 * b).round().clamp(0.0, 255.0) as u8;
        }

        // U and V planes (subsampled 2x2)
        let uv_width = width.div_ceil(2);
        let uv_height = height.div_ceil(2);
        let mut u_plane = vec![0u8; uv_width * uv_height];
        let mut v_plane = vec![0u8; uv_width * uv_height];

        for y in 0..uv_height {
            for x in 0..uv_width {
                // Average 2x2 block
                let mut sum = [0u32; 3];
                for dy in 0..2 {
                    for dx in 0..2 {
                        let sx = (x * 2 + dx).min(width - 1);
                        let sy = (y * 2 + dy).min(height - 1);
                        let idx = (sy * width + sx) * 4;
                        for (c, s) in sum.iter_mut().enumerate() {
                            *s += rgba[idx + c] as u32;
                        }
                    }
                }

                let r = (sum[0] / 4) as f32;
                let g = (sum[1] / 4) as f32;
                let b = (sum[2] / 4) as f32;

                let i = y * uv_width + x;
                u_plane[i] = ((-0.169 * r - 0.331 * g + 0.500 * b) + 128.0).clamp(0.0, 255.0) as u8;
                v_plane[i] = ((0.500 * r - 0.419 * g - 0.081 * b) + 128.0).clamp(0.0, 255.0) as u8;
            }
        }

        // Planes are padded, so copy through the stride-aware helper
        yuv_frame.planes[0].copy_from_raw_u8(&y_plane, width, 1);
        yuv_frame.planes[1].copy_from_raw_u8(&u_plane, uv_width, 1);
        yuv_frame.planes[2].copy_from_raw_u8(&v_plane, uv_width, 1);

        yuv_frame
    }

    /// Move every ready packet into the muxer
    fn drain_packets(&mut self) -> Result<()> {
        loop {
            match self.context.receive_packet() {
                Ok(pkt) => {
                    self.muxer.write_packet(&Packet {
                        data: pkt.data,
                        pts: pkt.input_frameno as i64,
                        is_keyframe: pkt.frame_type == FrameType::KEY,
                    })?;
                }
                Err(EncoderStatus::Encoded) => continue,
                Err(EncoderStatus::NeedMoreData) | Err(EncoderStatus::LimitReached) => break,
                Err(e) => {
                    return Err(Error::Encode(format!("AV1 encoding error: {}", e)));
                }
            }
        }
        Ok(())
    }
}

impl Recorder for Av1Recorder {
    fn write_frame(&mut self, surface: &RenderSurface) -> Result<()> {
        if surface.width() != self.config.width || surface.height() != self.config.height {
            return Err(Error::Encode(format!(
                "frame size mismatch: got {}x{}, expected {}x{}",
                surface.width(),
                surface.height(),
                self.config.width,
                self.config.height
            )));
        }

        let yuv_frame = self.rgba_to_yuv420(surface.as_bytes());
        self.context
            .send_frame(yuv_frame)
            .map_err(|e| Error::Encode(format!("Failed to send frame: {}", e)))?;

        self.frame_count += 1;
        self.drain_packets()
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
        if self.frame_count == 0 {
            return Err(Error::Encode("no frames were recorded".to_string()));
        }

        self.context.flush();
        self.drain_packets()?;

        let Av1Recorder {
            muxer, frame_count, ..
        } = *self;
        let bytes = muxer.finalize()?;

        tracing::debug!(frames = frame_count, bytes = bytes.len(), "built-in AV1 recorder finished");
        Ok(bytes)
    }
}
