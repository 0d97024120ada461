//! Frame budget of a montage

use crate::audio::AUDIO_STOP_SLACK_SECS;
use crate::config::RenderConfig;
use crate::timeline::{SegmentKind, Timeline};
use crate::{secs_to_frames, FPS};
use serde::Serialize;

/// Title card length (3 s)
pub const TITLE_FRAMES: u64 = 3 * FPS as u64;
/// Letter page length (5 s)
pub const LETTER_FRAMES: u64 = 5 * FPS as u64;

/// How many frames each part of a montage takes.
///
/// Derived from the same segment list the renderer walks, so the number of
/// frames written always equals `total_frames`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TimingPlan {
    pub title_frames: u64,
    pub letter_frames: u64,
    pub photo_frames: u64,
    pub video_frames: u64,
    pub transition_frames: u64,
    pub total_frames: u64,
    pub letters: usize,
    pub photos: usize,
    pub videos: usize,
    pub transitions: usize,
}

impl TimingPlan {
    pub fn from_timeline(timeline: &Timeline) -> Self {
        let mut plan = TimingPlan::default();
        for segment in &timeline.segments {
            match segment.kind {
                SegmentKind::Title => plan.title_frames += segment.frames,
                SegmentKind::Letter(_) => {
                    plan.letters += 1;
                    plan.letter_frames += segment.frames;
                }
                SegmentKind::Photo(_) => {
                    plan.photos += 1;
                    plan.photo_frames += segment.frames;
                }
                SegmentKind::Video(_) => {
                    plan.videos += 1;
                    plan.video_frames += segment.frames;
                }
                SegmentKind::Transition { .. } => {
                    plan.transitions += 1;
                    plan.transition_frames += segment.frames;
                }
            }
        }
        plan.total_frames = plan.sum();
        plan
    }

    /// Analytic plan from item counts, without building a timeline
    pub fn estimate(
        config: &RenderConfig,
        photos: usize,
        video_durations: &[f64],
        letters: usize,
        transitions: usize,
    ) -> Self {
        let mut plan = TimingPlan {
            title_frames: TITLE_FRAMES,
            letter_frames: LETTER_FRAMES * letters as u64,
            photo_frames: photo_frames(config) * photos as u64,
            video_frames: video_durations.iter().map(|d| secs_to_frames(*d)).sum(),
            transition_frames: transition_frames(config) * transitions as u64,
            total_frames: 0,
            letters,
            photos,
            videos: video_durations.len(),
            transitions,
        };
        plan.total_frames = plan.sum();
        plan
    }

    fn sum(&self) -> u64 {
        self.title_frames
            + self.letter_frames
            + self.photo_frames
            + self.video_frames
            + self.transition_frames
    }

    pub fn duration_secs(&self) -> f64 {
        self.total_frames as f64 / FPS as f64
    }

    /// Hard stop for the audio track
    pub fn audio_deadline_secs(&self) -> f64 {
        self.duration_secs() + AUDIO_STOP_SLACK_SECS
    }
}

/// Frames one photo is shown
pub fn photo_frames(config: &RenderConfig) -> u64 {
    secs_to_frames(config.photo_duration_secs).max(1)
}

/// Frames one transition lasts; zero disables transitions
pub fn transition_frames(config: &RenderConfig) -> u64 {
    secs_to_frames(config.transition_duration_secs)
}
