//! Tests that drive a real ffmpeg binary. Each one returns early when ffmpeg
//! is not installed.

mod common;

use common::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;
use tripreel::audio::{decode_audio, AudioMixer, AUDIO_STOP_SLACK_SECS};
use tripreel::encoder::codec::{negotiate, FfmpegProbe, PREFERENCES};
use tripreel::encoder::create_recorder;
use tripreel::generator::Sequencer;
use tripreel::model::{MediaItem, MediaKind};
use tripreel::progress::{CancelToken, ProgressReporter};
use tripreel::render::FrameRenderer;
use tripreel::surface::RenderSurface;
use tripreel::timeline::{group_media, Timeline};
use tripreel::video_source::{VideoDecoder, VideoSource};
use tripreel::{Color, FitMode, RenderConfig, TimingPlan};

macro_rules! require_ffmpeg {
    () => {
        if !ffmpeg_available() {
            eprintln!("ffmpeg not found, skipping");
            return;
        }
    };
}

#[test]
fn test_probe_and_decode_video() {
    require_ffmpeg!();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    assert!(make_test_video(&path, 2.0, 320, 240));

    let source = VideoSource::probe(&path, None).unwrap();
    assert_eq!((source.width, source.height), (320, 240));
    assert!((source.duration_secs - 2.0).abs() < 0.1);

    let mut decoder = VideoDecoder::open(&source, 160, 120, None).unwrap();
    let frame = decoder.read_frame().unwrap().unwrap();
    assert_eq!((frame.width, frame.height), (160, 120));
    assert_eq!(frame.data.len(), 160 * 120 * 4);
}

/// Videos play for round(duration x 30) frames whatever the photo pace
#[test]
fn test_video_plays_its_own_length() {
    require_ffmpeg!();
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clip.mp4");
    assert!(make_test_video(&path, 1.5, 320, 240));
    let source = VideoSource::probe(&path, None).unwrap();
    let expected = tripreel::secs_to_frames(source.duration_secs);

    let items = vec![MediaItem::Video {
        record: media_record(1, MediaKind::Video, "clip.mp4", "2024-05-01T10:00:00"),
        source,
    }];
    let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-02")];
    let renderer = FrameRenderer::new(None, true, FitMode::Contain);
    let trip = trip("Video");

    for photo_secs in [0.5, 8.0] {
        let config = RenderConfig {
            photo_duration_secs: photo_secs,
            ..RenderConfig::default()
        };
        let groups = group_media(&itineraries, &items, &[]);
        let timeline = Timeline::build(&groups, &items, &config, &mut StdRng::seed_from_u64(1));
        let plan = TimingPlan::from_timeline(&timeline);
        assert_eq!(plan.video_frames, expected);

        let mut surface = RenderSurface::new(128, 72).unwrap();
        let mut recorder = CountingRecorder::default();
        let written = Sequencer::new(&renderer, &items, &[], &trip)
            .render(
                &timeline,
                &mut surface,
                &mut recorder,
                &ProgressReporter::disabled(),
                &CancelToken::new(),
            )
            .unwrap();
        assert_eq!(written, plan.total_frames);
    }
}

/// Record `secs` of solid frames with the best silent format ffmpeg offers
fn record_silent(probe: &FfmpegProbe, secs: f64) -> Option<(Vec<u8>, tripreel::encoder::CodecDescriptor)> {
    let descriptor = negotiate(probe, &PREFERENCES, false).ok()?;
    if descriptor.backend != tripreel::encoder::codec::Backend::Ffmpeg {
        return None;
    }
    let mut recorder = create_recorder(&descriptor, recorder_config(128, 72), None).ok()?;
    let mut surface = RenderSurface::new(128, 72).unwrap();
    for i in 0..tripreel::secs_to_frames(secs) {
        surface.fill(Color::rgb((i * 4 % 255) as u8, 80, 160));
        recorder.write_frame(&surface).unwrap();
    }
    Some((recorder.finish().unwrap(), descriptor))
}

fn check_mix(track_secs: f64, video_secs: f64) {
    let dir = TempDir::new().unwrap();
    let probe = FfmpegProbe::new(None);
    if negotiate(&probe, &PREFERENCES, true).is_err() {
        eprintln!("ffmpeg lacks an audio-capable format, skipping");
        return;
    }
    let Some((video, descriptor)) = record_silent(&probe, video_secs) else {
        eprintln!("ffmpeg lacks a video encoder, skipping");
        return;
    };

    let track = dir.path().join("tone.wav");
    assert!(make_test_tone(&track, track_secs));
    let pcm = decode_audio(&track, None).unwrap();
    assert!((pcm.duration_secs() - track_secs).abs() < 0.05);

    let mixed = AudioMixer::new(&probe, None).mix_or_silent(video, descriptor, &track, 0.8, video_secs);
    assert!(mixed.has_audio);
    assert!(has_ebml_header(&mixed.bytes));

    let out = dir.path().join("mixed.webm");
    std::fs::write(&out, &mixed.bytes).unwrap();
    let (duration, has_audio) = probe_output(&out).unwrap();
    assert!(has_audio);
    // Container timestamps are millisecond-granular; allow one audio packet
    assert!(
        duration <= video_secs + AUDIO_STOP_SLACK_SECS + 0.03,
        "{} s output for {} s video",
        duration,
        video_secs
    );
    assert!(duration >= video_secs - 0.1);
}

#[test]
fn test_short_audio_loops_within_deadline() {
    require_ffmpeg!();
    check_mix(0.6, 2.0);
}

#[test]
fn test_long_audio_truncated_at_deadline() {
    require_ffmpeg!();
    check_mix(6.0, 2.0);
}

#[test]
fn test_missing_track_keeps_silent_video() {
    require_ffmpeg!();
    let probe = FfmpegProbe::new(None);
    let Some((video, descriptor)) = record_silent(&probe, 0.5) else {
        return;
    };
    let original = video.clone();

    let mixed = AudioMixer::new(&probe, None).mix_or_silent(
        video,
        descriptor,
        std::path::Path::new("/nonexistent/track.mp3"),
        1.0,
        0.5,
    );
    assert!(!mixed.has_audio);
    assert_eq!(mixed.bytes, original);
    assert_eq!(mixed.descriptor, descriptor);
}
