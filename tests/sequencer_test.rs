//! Integration tests for montage planning and frame sequencing

mod common;

use common::*;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tripreel::generator::Sequencer;
use tripreel::image_loader::LoadedImage;
use tripreel::model::{LetterPage, MediaItem, MediaKind};
use tripreel::progress::{CancelToken, Phase, ProgressReporter};
use tripreel::render::FrameRenderer;
use tripreel::surface::RenderSurface;
use tripreel::timeline::{group_media, Timeline};
use tripreel::video_source::VideoSource;
use tripreel::{Error, FitMode, RenderConfig, TimingPlan, TransitionKind};

const WIDTH: u32 = 96;
const HEIGHT: u32 = 54;

fn photo(id: i64, captured_at: &str) -> MediaItem {
    MediaItem::Photo {
        record: media_record(id, MediaKind::Photo, &format!("p{}.jpg", id), captured_at),
        image: LoadedImage::from_dynamic_image(image::DynamicImage::ImageRgba8(
            generate_numbered_image(64, 48, id as u32),
        )),
    }
}

/// Sequence `items` with a counting recorder; returns (frames written, plan)
fn sequence(
    config: &RenderConfig,
    items: &[MediaItem],
    letters: &[LetterPage],
) -> tripreel::Result<(u64, TimingPlan)> {
    let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-31")];
    let groups = group_media(&itineraries, items, letters);
    let timeline = Timeline::build(&groups, items, config, &mut StdRng::seed_from_u64(3));
    let plan = TimingPlan::from_timeline(&timeline);

    let renderer = FrameRenderer::new(None, config.show_overlay, config.fit);
    let trip = trip("Portugal");
    let mut surface = RenderSurface::new(WIDTH, HEIGHT)?;
    let mut recorder = CountingRecorder::default();
    let written = Sequencer::new(&renderer, items, letters, &trip).render(
        &timeline,
        &mut surface,
        &mut recorder,
        &ProgressReporter::disabled(),
        &CancelToken::new(),
    )?;
    assert_eq!(written, recorder.frames);
    assert_eq!(recorder.size, Some((WIDTH, HEIGHT)));
    Ok((written, plan))
}

/// Three photos, 4 s each, 1 s fades: 3 + 12 + 2 = 17 s
#[test]
fn test_three_photo_montage_is_17_seconds() {
    let config = RenderConfig {
        photo_duration_secs: 4.0,
        transition: TransitionKind::Fade,
        transition_duration_secs: 1.0,
        ..RenderConfig::default()
    };
    let items = vec![
        photo(1, "2024-05-01T10:00:00"),
        photo(2, "2024-05-02T10:00:00"),
        photo(3, "2024-05-03T10:00:00"),
    ];

    let (written, plan) = sequence(&config, &items, &[]).unwrap();
    assert_eq!(plan.total_frames, 510);
    assert_eq!(written, 510);
    assert_eq!(plan.duration_secs(), 17.0);
}

#[test]
fn test_frame_count_matches_plan_for_every_transition_kind() {
    let items = vec![
        photo(1, "2024-05-01T10:00:00"),
        photo(2, "2024-05-01T11:00:00"),
        photo(3, "2024-05-01T12:00:00"),
    ];
    let letters = vec![LetterPage {
        title: "Lisboa".to_string(),
        body: "Llegamos con lluvia.".to_string(),
        date: None,
        itinerary_id: Some(1),
    }];

    for kind in [
        TransitionKind::Fade,
        TransitionKind::Slide,
        TransitionKind::Zoom,
        TransitionKind::Random,
    ] {
        for (photo_secs, transition_secs) in [(1.0, 0.5), (0.7, 0.0), (2.0, 0.33)] {
            let config = RenderConfig {
                photo_duration_secs: photo_secs,
                transition: kind,
                transition_duration_secs: transition_secs,
                fit: FitMode::Cover,
                ..RenderConfig::default()
            };
            let (written, plan) = sequence(&config, &items, &letters).unwrap();
            assert_eq!(written, plan.total_frames, "{:?} {} {}", kind, photo_secs, transition_secs);
            assert_eq!(plan.letters, 1);
        }
    }
}

/// A video whose file cannot be decoded still occupies exactly its planned frames
#[test]
fn test_video_frames_fixed_regardless_of_photo_duration() {
    let video = MediaItem::Video {
        record: media_record(9, MediaKind::Video, "missing.mp4", "2024-05-01T10:30:00"),
        source: VideoSource::from_parts("/nonexistent/missing.mp4", 640, 360, 2.5),
    };

    let mut video_frames = Vec::new();
    for photo_secs in [1.0, 6.0] {
        let config = RenderConfig {
            photo_duration_secs: photo_secs,
            ..RenderConfig::default()
        };
        let items = vec![photo(1, "2024-05-01T10:00:00"), video.clone()];
        let (written, plan) = sequence(&config, &items, &[]).unwrap();
        assert_eq!(written, plan.total_frames);
        video_frames.push(plan.video_frames);
    }
    assert_eq!(video_frames, vec![75, 75]);
}

#[test]
fn test_progress_and_cancellation() {
    let config = RenderConfig::default();
    let items = vec![photo(1, "2024-05-01T10:00:00")];
    let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-31")];
    let groups = group_media(&itineraries, &items, &[]);
    let timeline = Timeline::build(&groups, &items, &config, &mut StdRng::seed_from_u64(0));

    let renderer = FrameRenderer::new(None, true, FitMode::Contain);
    let trip = trip("Chile");
    let sequencer = Sequencer::new(&renderer, &items, &[], &trip);
    let mut surface = RenderSurface::new(WIDTH, HEIGHT).unwrap();

    // Progress: frame events are best effort, but the last one seen never goes backwards
    let (reporter, receiver) = ProgressReporter::channel(1024);
    let mut recorder = CountingRecorder::default();
    sequencer
        .render(&timeline, &mut surface, &mut recorder, &reporter, &CancelToken::new())
        .unwrap();
    let events: Vec<_> = receiver.try_iter().collect();
    assert!(!events.is_empty());
    assert!(events.iter().all(|e| e.phase == Phase::Generating));
    assert!(events.windows(2).all(|w| w[0].percent <= w[1].percent));

    // Cancelled before the first frame: nothing is written
    let cancel = CancelToken::new();
    cancel.cancel();
    let mut recorder = CountingRecorder::default();
    let result = sequencer.render(
        &timeline,
        &mut surface,
        &mut recorder,
        &ProgressReporter::disabled(),
        &cancel,
    );
    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(recorder.frames, 0);
}

#[test]
fn test_media_outside_itineraries_never_appears() {
    let config = RenderConfig::default();
    let items = vec![
        photo(1, "2024-05-01T10:00:00"),
        // June is outside the only itinerary
        photo(2, "2024-06-15T10:00:00"),
    ];
    let (written, plan) = sequence(&config, &items, &[]).unwrap();
    assert_eq!(plan.photos, 1);
    assert_eq!(written, 90 + 120);
}
