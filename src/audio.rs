//! Audio mixer: decodes the background track, loops or trims it to the
//! video length and remuxes it with the silent recording

use crate::encoder::codec::{negotiate, CodecDescriptor, CodecProbe, PREFERENCES};
use crate::encoder::ffmpeg::{find_ffmpeg, join_drain, spawn_drain, video_encoder_args};
use crate::{Error, Result};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

/// Audio may run this long past the last video frame before the hard stop
pub const AUDIO_STOP_SLACK_SECS: f64 = 0.5;

/// Sample rate of the mixed track
pub const SAMPLE_RATE: u32 = 48_000;
const CHANNELS: u16 = 2;
const AUDIO_BITRATE: &str = "128k";

/// Interleaved stereo `f32` PCM
#[derive(Debug, Clone, PartialEq)]
pub struct AudioPcm {
    pub sample_rate: u32,
    pub channels: u16,
    pub interleaved_f32: Vec<f32>,
}

impl AudioPcm {
    /// Sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.interleaved_f32.len() / self.channels.max(1) as usize
    }

    pub fn duration_secs(&self) -> f64 {
        self.frames() as f64 / self.sample_rate.max(1) as f64
    }
}

/// Decode an audio file to stereo interleaved `f32` PCM at [`SAMPLE_RATE`]
pub fn decode_audio(path: &Path, ffmpeg_path: Option<&str>) -> Result<AudioPcm> {
    let ffmpeg = find_ffmpeg(ffmpeg_path)?;
    let out = Command::new(&ffmpeg)
        .args(["-v", "error", "-i"])
        .arg(path)
        .args([
            "-vn",
            "-f",
            "f32le",
            "-acodec",
            "pcm_f32le",
            "-ac",
            &CHANNELS.to_string(),
            "-ar",
            &SAMPLE_RATE.to_string(),
            "pipe:1",
        ])
        .output()
        .map_err(|e| Error::Ffmpeg(format!("failed to run ffmpeg for audio decode: {}", e)))?;

    if !out.status.success() {
        return Err(Error::Decode(format!(
            "ffmpeg audio decode failed for '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }
    if out.stdout.len() % 4 != 0 {
        return Err(Error::Decode(
            "decoded audio byte length is not aligned to f32 samples".to_string(),
        ));
    }

    let interleaved_f32: Vec<f32> = out
        .stdout
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    if interleaved_f32.is_empty() {
        return Err(Error::Decode(format!("'{}' has no audio samples", path.display())));
    }

    Ok(AudioPcm {
        sample_rate: SAMPLE_RATE,
        channels: CHANNELS,
        interleaved_f32,
    })
}

/// How the track is laid against the video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioPlan {
    /// Shorter than the video: repeat until the hard stop
    Loop,
    /// At least as long as the video: play once, cut at the hard stop
    Once,
}

impl AudioPlan {
    pub fn for_durations(audio_secs: f64, video_secs: f64) -> Self {
        // Within one sample counts as equal
        let tolerance = 1.0 / SAMPLE_RATE as f64;
        if audio_secs + tolerance < video_secs {
            AudioPlan::Loop
        } else {
            AudioPlan::Once
        }
    }
}

/// Lay out the track per `plan`, ending no later than `deadline_secs`, scaled by `volume`
pub fn render_track(pcm: &AudioPcm, plan: AudioPlan, deadline_secs: f64, volume: f32) -> Vec<f32> {
    let channels = pcm.channels.max(1) as usize;
    let source_frames = pcm.frames();
    if source_frames == 0 || !deadline_secs.is_finite() || deadline_secs <= 0.0 {
        return Vec::new();
    }

    let limit = (deadline_secs * pcm.sample_rate as f64).floor() as usize;
    let frames = match plan {
        AudioPlan::Loop => limit,
        AudioPlan::Once => source_frames.min(limit),
    };

    let source = &pcm.interleaved_f32[..source_frames * channels];
    let gain = volume.clamp(0.0, 1.0);
    source
        .iter()
        .cycle()
        .take(frames * channels)
        .map(|s| s * gain)
        .collect()
}

/// Result of a mixing attempt
#[derive(Debug, Clone)]
pub struct MixOutput {
    pub bytes: Vec<u8>,
    pub descriptor: CodecDescriptor,
    pub has_audio: bool,
}

/// Second recording pass adding the audio track
pub struct AudioMixer<'a> {
    ffmpeg_path: Option<&'a str>,
    probe: &'a dyn CodecProbe,
}

impl<'a> AudioMixer<'a> {
    pub fn new(probe: &'a dyn CodecProbe, ffmpeg_path: Option<&'a str>) -> Self {
        Self { ffmpeg_path, probe }
    }

    /// Mix, or hand back the silent video on any failure
    pub fn mix_or_silent(
        &self,
        video: Vec<u8>,
        video_descriptor: CodecDescriptor,
        track: &Path,
        volume: f32,
        video_secs: f64,
    ) -> MixOutput {
        match self.mix(&video, &video_descriptor, track, volume, video_secs) {
            Ok((bytes, descriptor)) => MixOutput {
                bytes,
                descriptor,
                has_audio: true,
            },
            Err(e) => {
                tracing::warn!(error = %e, track = %track.display(), "audio mixing failed, keeping silent video");
                MixOutput {
                    bytes: video,
                    descriptor: video_descriptor,
                    has_audio: false,
                }
            }
        }
    }

    /// Remux `video` with the track looped or trimmed to `video_secs`.
    ///
    /// Output never runs past `video_secs + AUDIO_STOP_SLACK_SECS`.
    pub fn mix(
        &self,
        video: &[u8],
        video_descriptor: &CodecDescriptor,
        track: &Path,
        volume: f32,
        video_secs: f64,
    ) -> Result<(Vec<u8>, CodecDescriptor)> {
        let descriptor = negotiate(self.probe, &PREFERENCES, true)?;
        let audio_codec = descriptor
            .audio
            .ok_or_else(|| Error::CodecUnavailable("negotiated format has no audio codec".to_string()))?;

        let pcm = decode_audio(track, self.ffmpeg_path)?;
        let plan = AudioPlan::for_durations(pcm.duration_secs(), video_secs);
        let deadline = video_secs + AUDIO_STOP_SLACK_SECS;
        let samples = render_track(&pcm, plan, deadline, volume);
        tracing::info!(
            ?plan,
            audio_secs = pcm.duration_secs(),
            video_secs,
            deadline,
            mime = descriptor.mime_type,
            "mixing audio track"
        );

        let mut silent = tempfile::Builder::new()
            .prefix("tripreel-silent-")
            .suffix(".mkv")
            .tempfile()?;
        silent.write_all(video)?;
        silent.flush()?;

        let copy_video = descriptor.video == video_descriptor.video;
        let video_args = if copy_video {
            vec!["-c:v".to_string(), "copy".to_string()]
        } else {
            let mut args = video_encoder_args(descriptor.video, video_bitrate_hint(video, video_secs));
            args.extend(["-pix_fmt".to_string(), "yuv420p".to_string()]);
            args
        };

        let ffmpeg = find_ffmpeg(self.ffmpeg_path)?;
        let mut process = Command::new(&ffmpeg)
            .args(["-hide_banner", "-loglevel", "error", "-i"])
            .arg(silent.path())
            .args([
                "-f",
                "f32le",
                "-ar",
                &SAMPLE_RATE.to_string(),
                "-ac",
                &CHANNELS.to_string(),
                "-i",
                "pipe:0",
                "-map",
                "0:v:0",
                "-map",
                "1:a:0",
            ])
            .args(&video_args)
            .args([
                "-c:a",
                audio_codec.ffmpeg_encoder(),
                "-b:a",
                AUDIO_BITRATE,
                "-t",
                &format!("{:.3}", deadline),
                "-f",
                descriptor.container.ffmpeg_format(),
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Error::Ffmpeg(format!("Failed to start ffmpeg: {}", e)))?;

        let stdout = process.stdout.take().map(spawn_drain);
        let stderr = process.stderr.take().map(spawn_drain);

        let written = match process.stdin.take() {
            Some(mut stdin) => {
                let bytes: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
                stdin.write_all(&bytes)
            }
            None => Err(std::io::Error::other("ffmpeg stdin not available")),
        };

        let output = match stdout {
            Some(drain) => join_drain(drain)?,
            None => Vec::new(),
        };
        let diagnostics = match stderr {
            Some(drain) => join_drain(drain).unwrap_or_default(),
            None => Vec::new(),
        };
        let status = process
            .wait()
            .map_err(|e| Error::Ffmpeg(format!("FFmpeg process error: {}", e)))?;

        if !status.success() {
            return Err(Error::Ffmpeg(format!(
                "audio remux exited with status {}: {}",
                status,
                String::from_utf8_lossy(&diagnostics).trim()
            )));
        }
        if output.is_empty() {
            return Err(Error::Encode("audio remux produced no output".to_string()));
        }
        pcm_stream_outcome(written)?;

        Ok((output, descriptor))
    }
}

/// Result of streaming PCM into a remux that already exited successfully
fn pcm_stream_outcome(written: std::io::Result<()>) -> Result<()> {
    match written {
        Ok(()) => Ok(()),
        // ffmpeg stops reading stdin once `-t` is reached
        Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
            tracing::debug!("audio remux closed stdin at the deadline");
            Ok(())
        }
        Err(e) => Err(Error::Ffmpeg(format!("Failed to stream audio: {}", e))),
    }
}

/// Bitrate of the silent recording, used when its video has to be re-encoded
fn video_bitrate_hint(video: &[u8], video_secs: f64) -> u32 {
    if video_secs <= 0.0 {
        return crate::Quality::Medium.bitrate();
    }
    let bps = video.len() as f64 * 8.0 / video_secs;
    (bps as u32).clamp(500_000, crate::Quality::High.bitrate())
}
