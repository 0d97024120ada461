//! Video probing and decoding through ffprobe/ffmpeg processes

use crate::encoder::ffmpeg::{ffprobe_for, find_ffmpeg};
use crate::surface::RgbaView;
use crate::{Error, Result, FPS};
use serde::Deserialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};

/// A probed video file
#[derive(Debug, Clone, PartialEq)]
pub struct VideoSource {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Decoded length in seconds
    pub duration_secs: f64,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    duration: Option<String>,
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, from the display matrix or the legacy tag
    fn rotation(&self) -> i64 {
        self.side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<f64>().ok())
            })
            .map(|r| (r.round() as i64).rem_euclid(360))
            .unwrap_or(0)
    }
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

impl VideoSource {
    pub fn from_parts(path: impl Into<PathBuf>, width: u32, height: u32, duration_secs: f64) -> Self {
        Self {
            path: path.into(),
            width,
            height,
            duration_secs,
        }
    }

    /// Probe dimensions and duration with ffprobe
    pub fn probe<P: AsRef<Path>>(path: P, ffmpeg_path: Option<&str>) -> Result<Self> {
        Self::probe_with_fallback(path, ffmpeg_path, None)
    }

    /// Like `probe`, using `fallback_duration` when the file reports no duration
    pub fn probe_with_fallback<P: AsRef<Path>>(
        path: P,
        ffmpeg_path: Option<&str>,
        fallback_duration: Option<f64>,
    ) -> Result<Self> {
        let path = path.as_ref();
        let ffmpeg = find_ffmpeg(ffmpeg_path)?;
        let ffprobe = ffprobe_for(&ffmpeg);

        let output = Command::new(&ffprobe)
            .args([
                "-v",
                "error",
                "-print_format",
                "json",
                "-show_streams",
                "-show_format",
            ])
            .arg(path)
            .output()
            .map_err(|e| Error::Ffmpeg(format!("Failed to run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Decode(format!(
                "ffprobe failed for '{}': {}",
                path.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Self::from_probe_json(path, &output.stdout, fallback_duration)
    }

    /// Dimensions are reported as displayed: ffmpeg autorotates on decode
    fn from_probe_json(path: &Path, json: &[u8], fallback_duration: Option<f64>) -> Result<Self> {
        let parsed: ProbeOutput = serde_json::from_slice(json)?;

        let stream = parsed
            .streams
            .iter()
            .find(|s| s.codec_type.as_deref() == Some("video"))
            .ok_or_else(|| Error::Decode(format!("no video stream in '{}'", path.display())))?;

        let width = stream
            .width
            .ok_or_else(|| Error::Decode("missing video width".to_string()))?;
        let height = stream
            .height
            .ok_or_else(|| Error::Decode("missing video height".to_string()))?;
        let (width, height) = match stream.rotation() {
            90 | 270 => (height, width),
            _ => (width, height),
        };

        // Container duration first, stream duration when the container has none
        let duration_secs = parsed
            .format
            .as_ref()
            .and_then(|f| f.duration.as_deref())
            .or(stream.duration.as_deref())
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|d| d.is_finite() && *d > 0.0)
            .or(fallback_duration.filter(|d| d.is_finite() && *d > 0.0))
            .ok_or_else(|| Error::Decode(format!("unknown duration for '{}'", path.display())))?;

        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            duration_secs,
        })
    }
}

/// One decoded RGBA video frame
#[derive(Debug, Clone)]
pub struct DecodedFrame {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl DecodedFrame {
    pub fn view(&self) -> RgbaView<'_> {
        RgbaView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Streaming decoder producing frames at the output frame rate, scaled to a fixed size
pub struct VideoDecoder {
    width: u32,
    height: u32,
    process: Option<Child>,
    last_frame: Option<Vec<u8>>,
}

impl VideoDecoder {
    /// Start decoding `source`, scaling every frame to `width` x `height`
    pub fn open(source: &VideoSource, width: u32, height: u32, ffmpeg_path: Option<&str>) -> Result<Self> {
        let ffmpeg = find_ffmpeg(ffmpeg_path)?;

        let process = Command::new(&ffmpeg)
            .args(["-v", "error", "-i"])
            .arg(&source.path)
            .args([
                "-an",
                "-vf",
                &format!("scale={}:{}", width, height),
                "-r",
                &FPS.to_string(),
                "-f",
                "rawvideo",
                "-pix_fmt",
                "rgba",
                "pipe:1",
            ])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Ffmpeg(format!("Failed to start ffmpeg: {}", e)))?;

        Ok(Self {
            width,
            height,
            process: Some(process),
            last_frame: None,
        })
    }

    /// Read the next frame.
    ///
    /// Once the stream ends the last frame keeps being returned, so a caller
    /// asking for a fixed frame count always gets it. `None` only when the
    /// stream produced nothing at all.
    pub fn read_frame(&mut self) -> Result<Option<DecodedFrame>> {
        let frame_size = (self.width * self.height * 4) as usize;

        if let Some(stdout) = self.process.as_mut().and_then(|p| p.stdout.as_mut()) {
            let mut buffer = vec![0u8; frame_size];
            match stdout.read_exact(&mut buffer) {
                Ok(()) => {
                    self.last_frame = Some(buffer);
                }
                Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    self.close();
                }
                Err(e) => return Err(Error::Decode(format!("Failed to read frame: {}", e))),
            }
        }

        Ok(self.last_frame.as_ref().map(|data| DecodedFrame {
            width: self.width,
            height: self.height,
            data: data.clone(),
        }))
    }

    fn close(&mut self) {
        if let Some(mut process) = self.process.take() {
            let _ = process.kill();
            let _ = process.wait();
        }
    }
}

impl Drop for VideoDecoder {
    fn drop(&mut self) {
        self.close();
    }
}

/// Decode only the first frame of `source`, scaled to `width` x `height`
pub fn first_frame(source: &VideoSource, width: u32, height: u32, ffmpeg_path: Option<&str>) -> Result<DecodedFrame> {
    let ffmpeg = find_ffmpeg(ffmpeg_path)?;

    let output = Command::new(&ffmpeg)
        .args(["-v", "error", "-i"])
        .arg(&source.path)
        .args([
            "-an",
            "-frames:v",
            "1",
            "-vf",
            &format!("scale={}:{}", width, height),
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgba",
            "pipe:1",
        ])
        .output()
        .map_err(|e| Error::Ffmpeg(format!("Failed to run ffmpeg: {}", e)))?;

    let frame_size = (width * height * 4) as usize;
    if !output.status.success() || output.stdout.len() < frame_size {
        return Err(Error::Decode(format!(
            "no frame decoded from '{}': {}",
            source.path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let mut data = output.stdout;
    data.truncate(frame_size);
    Ok(DecodedFrame {
        width,
        height,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_json_prefers_format_duration() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio"},
                {"codec_type": "video", "width": 1920, "height": 1080, "duration": "4.9"}
            ],
            "format": {"duration": "5.005"}
        }"#;
        let source = VideoSource::from_probe_json(Path::new("clip.mp4"), json, None).unwrap();
        assert_eq!((source.width, source.height), (1920, 1080));
        assert!((source.duration_secs - 5.005).abs() < 1e-9);
    }

    #[test]
    fn test_probe_json_without_video_stream_fails() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {"duration": "3"}}"#;
        assert!(VideoSource::from_probe_json(Path::new("song.mp3"), json, None).is_err());
    }

    #[test]
    fn test_probe_json_without_duration_fails() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 2, "height": 2}]}"#;
        assert!(VideoSource::from_probe_json(Path::new("broken.webm"), json, None).is_err());
    }

    #[test]
    fn test_probe_json_uses_record_duration_when_file_has_none() {
        let json = br#"{"streams": [{"codec_type": "video", "width": 640, "height": 360}]}"#;
        let source = VideoSource::from_probe_json(Path::new("clip.webm"), json, Some(3.5)).unwrap();
        assert_eq!(source.duration_secs, 3.5);
        // The file's own duration wins over the record's
        let json = br#"{"streams": [{"codec_type": "video", "width": 640, "height": 360, "duration": "2.0"}]}"#;
        let source = VideoSource::from_probe_json(Path::new("clip.webm"), json, Some(3.5)).unwrap();
        assert_eq!(source.duration_secs, 2.0);
    }

    #[test]
    fn test_probe_json_rotated_phone_video_is_portrait() {
        let json = br#"{
            "streams": [{
                "codec_type": "video", "width": 1920, "height": 1080,
                "side_data_list": [{"side_data_type": "Display Matrix", "displaymatrix": "...", "rotation": -90}]
            }],
            "format": {"duration": "6.0"}
        }"#;
        let source = VideoSource::from_probe_json(Path::new("phone.mp4"), json, None).unwrap();
        assert_eq!((source.width, source.height), (1080, 1920));

        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1280, "height": 720, "tags": {"rotate": "90"}}],
            "format": {"duration": "6.0"}
        }"#;
        let source = VideoSource::from_probe_json(Path::new("old_phone.mp4"), json, None).unwrap();
        assert_eq!((source.width, source.height), (720, 1280));

        let json = br#"{
            "streams": [{"codec_type": "video", "width": 1280, "height": 720, "side_data_list": [{"rotation": 180}]}],
            "format": {"duration": "6.0"}
        }"#;
        let source = VideoSource::from_probe_json(Path::new("upside_down.mp4"), json, None).unwrap();
        assert_eq!((source.width, source.height), (1280, 720));
    }
}
