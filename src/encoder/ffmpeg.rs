//! Recorder backed by an external ffmpeg process

use super::codec::{CodecDescriptor, VideoCodec};
use super::{Recorder, RecorderConfig};
use crate::surface::RenderSurface;
use crate::{Error, Result};
use std::io::{Read, Write};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

type Drain = JoinHandle<std::io::Result<Vec<Vec<u8>>>>;

/// FFmpeg recorder: raw RGBA frames in on stdin, encoded container out on stdout
pub struct FfmpegRecorder {
    process: Child,
    stdin: Option<ChildStdin>,
    stdout: Option<Drain>,
    stderr: Option<Drain>,
    config: RecorderConfig,
    frame_count: u64,
}

impl FfmpegRecorder {
    pub fn new(
        descriptor: &CodecDescriptor,
        config: RecorderConfig,
        ffmpeg_path: Option<&str>,
    ) -> Result<Self> {
        let ffmpeg = find_ffmpeg(ffmpeg_path)?;

        let mut command = Command::new(&ffmpeg);
        command
            .args([
                "-hide_banner",
                "-loglevel",
                "error",
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "-s",
                &format!("{}x{}", config.width, config.height),
                "-r",
                &config.fps.to_string(),
                "-i",
                "pipe:0",
                "-an",
            ])
            .args(video_encoder_args(descriptor.video, config.bitrate))
            .args([
                "-pix_fmt",
                "yuv420p",
                "-f",
                descriptor.container.ffmpeg_format(),
                "pipe:1",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut process = command
            .spawn()
            .map_err(|e| Error::Ffmpeg(format!("Failed to start ffmpeg: {}", e)))?;

        let stdin = process.stdin.take();
        let stdout = process.stdout.take().map(spawn_drain);
        let stderr = process.stderr.take().map(spawn_drain);

        tracing::debug!(
            mime = descriptor.mime_type,
            width = config.width,
            height = config.height,
            bitrate = config.bitrate,
            "ffmpeg recorder started"
        );

        Ok(Self {
            process,
            stdin,
            stdout,
            stderr,
            config,
            frame_count: 0,
        })
    }
}

impl Recorder for FfmpegRecorder {
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

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| Error::Ffmpeg("FFmpeg stdin not available".to_string()))?;

        stdin
            .write_all(surface.as_bytes())
            .map_err(|e| Error::Ffmpeg(format!("Failed to write frame: {}", e)))?;

        self.frame_count += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<Vec<u8>> {
        // Close stdin to signal end of input
        drop(self.stdin.take());

        let output = match self.stdout.take() {
            Some(drain) => join_drain(drain)?,
            None => Vec::new(),
        };
        let diagnostics = match self.stderr.take() {
            Some(drain) => join_drain(drain).unwrap_or_default(),
            None => Vec::new(),
        };

        let status = self
            .process
            .wait()
            .map_err(|e| Error::Ffmpeg(format!("FFmpeg process error: {}", e)))?;

        if !status.success() {
            return Err(Error::Ffmpeg(format!(
                "ffmpeg exited with status {}: {}",
                status,
                String::from_utf8_lossy(&diagnostics).trim()
            )));
        }
        if output.is_empty() {
            return Err(Error::Encode("ffmpeg produced no output".to_string()));
        }

        tracing::debug!(frames = self.frame_count, bytes = output.len(), "ffmpeg recorder finished");
        Ok(output)
    }
}

impl Drop for FfmpegRecorder {
    fn drop(&mut self) {
        // Kill the process if it's still running
        drop(self.stdin.take());
        let _ = self.process.kill();
        let _ = self.process.wait();
    }
}

/// Encoder arguments for one video codec at a target bitrate
pub fn video_encoder_args(codec: VideoCodec, bitrate: u32) -> Vec<String> {
    let mut args = vec![
        "-c:v".to_string(),
        codec.ffmpeg_encoder().to_string(),
        "-b:v".to_string(),
        bitrate.to_string(),
    ];
    let tuning: &[&str] = match codec {
        VideoCodec::Vp9 => &["-deadline", "realtime", "-cpu-used", "8", "-row-mt", "1"],
        VideoCodec::Vp8 => &["-deadline", "realtime", "-cpu-used", "8"],
        VideoCodec::H264 => &["-preset", "veryfast"],
        VideoCodec::Av1 => &["-speed", "10"],
    };
    args.extend(tuning.iter().map(|s| s.to_string()));
    args
}

/// Read a child pipe to its end on a background thread, collecting chunks
pub(crate) fn spawn_drain<R: Read + Send + 'static>(mut reader: R) -> Drain {
    std::thread::spawn(move || {
        let mut chunks = Vec::new();
        let mut buffer = vec![0u8; 64 * 1024];
        loop {
            match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => chunks.push(buffer[..n].to_vec()),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(chunks)
    })
}

/// Wait for a drain thread and concatenate its chunks
pub(crate) fn join_drain(drain: Drain) -> Result<Vec<u8>> {
    let chunks = drain
        .join()
        .map_err(|_| Error::Ffmpeg("pipe reader thread panicked".to_string()))?
        .map_err(Error::Io)?;
    Ok(chunks.concat())
}

/// Find ffmpeg executable
pub fn find_ffmpeg(custom_path: Option<&str>) -> Result<String> {
    if let Some(path) = custom_path {
        if std::path::Path::new(path).exists() {
            return Ok(path.to_string());
        }
        return Err(Error::Ffmpeg(format!("FFmpeg not found at: {}", path)));
    }

    // Try common paths
    let paths = [
        "ffmpeg",
        "/usr/bin/ffmpeg",
        "/usr/local/bin/ffmpeg",
        "/opt/homebrew/bin/ffmpeg",
    ];

    for path in paths {
        if Command::new(path)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
        {
            return Ok(path.to_string());
        }
    }

    Err(Error::CodecUnavailable(
        "FFmpeg not found in PATH".to_string(),
    ))
}

/// ffprobe living next to the given ffmpeg
pub fn ffprobe_for(ffmpeg: &str) -> String {
    if ffmpeg.ends_with("ffmpeg") {
        format!("{}ffprobe", &ffmpeg[..ffmpeg.len() - "ffmpeg".len()])
    } else {
        "ffprobe".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffprobe_for() {
        assert_eq!(ffprobe_for("ffmpeg"), "ffprobe");
        assert_eq!(ffprobe_for("/opt/ffmpeg/bin/ffmpeg"), "/opt/ffmpeg/bin/ffprobe");
        assert_eq!(ffprobe_for("/usr/bin/ffmpeg-6"), "ffprobe");
    }

    #[test]
    fn test_video_encoder_args_carry_bitrate() {
        let args = video_encoder_args(VideoCodec::Vp9, 5_000_000);
        assert_eq!(&args[..4], ["-c:v", "libvpx-vp9", "-b:v", "5000000"]);
        assert!(args.contains(&"realtime".to_string()));
    }

    #[test]
    fn test_missing_custom_ffmpeg_is_an_error() {
        assert!(find_ffmpeg(Some("/definitely/not/here/ffmpeg")).is_err());
    }

    #[test]
    fn test_drain_collects_everything() {
        let data = vec![7u8; 200_000];
        let drain = spawn_drain(std::io::Cursor::new(data.clone()));
        assert_eq!(join_drain(drain).unwrap(), data);
    }
}
