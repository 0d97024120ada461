//! Montage planning: grouping media under itineraries and laying out the
//! ordered segment list the renderer walks

use crate::config::RenderConfig;
use crate::model::{Itinerary, LetterPage, MediaItem};
use crate::timing::{transition_frames, LETTER_FRAMES, TITLE_FRAMES};
use crate::transition::TransitionKind;
use chrono::NaiveDate;
use rand::Rng;

/// Media of one itinerary, in play order. Indices point into the caller's slices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    pub itinerary: usize,
    pub letter: Option<usize>,
    pub items: Vec<usize>,
}

/// Itinerary order: start date, then id
fn sorted_itineraries(itineraries: &[Itinerary]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..itineraries.len()).collect();
    order.sort_by(|&a, &b| {
        let (a, b) = (&itineraries[a], &itineraries[b]);
        a.start_date.cmp(&b.start_date).then(a.id.cmp(&b.id))
    });
    order
}

/// Explicit itinerary id first, then the first itinerary (in play order) whose dates contain `date`
fn match_itinerary(
    itineraries: &[Itinerary],
    order: &[usize],
    explicit: Option<i64>,
    date: Option<NaiveDate>,
) -> Option<usize> {
    if let Some(id) = explicit {
        if let Some(idx) = order.iter().copied().find(|&i| itineraries[i].id == id) {
            return Some(idx);
        }
    }
    let date = date?;
    order.iter().copied().find(|&i| itineraries[i].contains(date))
}

/// Group media and letter pages by itinerary.
///
/// Items belonging to no itinerary are dropped, as are groups left without
/// media (their letter page included). One letter page per group.
pub fn group_media(
    itineraries: &[Itinerary],
    items: &[MediaItem],
    letters: &[LetterPage],
) -> Vec<Group> {
    let order = sorted_itineraries(itineraries);
    let mut groups: Vec<Group> = order
        .iter()
        .map(|&itinerary| Group {
            itinerary,
            letter: None,
            items: Vec::new(),
        })
        .collect();
    let slot = |itinerary: usize| order.iter().position(|&i| i == itinerary);

    for (idx, item) in items.iter().enumerate() {
        let record = item.record();
        match match_itinerary(itineraries, &order, record.itinerary_id, record.captured_date())
            .and_then(slot)
        {
            Some(g) => groups[g].items.push(idx),
            None => tracing::info!(media_id = record.id, "media matches no itinerary, dropped"),
        }
    }

    for (idx, letter) in letters.iter().enumerate() {
        let Some(g) = match_itinerary(itineraries, &order, letter.itinerary_id, letter.date).and_then(slot)
        else {
            tracing::info!(title = %letter.title, "letter page matches no itinerary, ignored");
            continue;
        };
        match groups[g].letter {
            None => groups[g].letter = Some(idx),
            Some(_) => tracing::info!(
                title = %letter.title,
                itinerary_id = itineraries[groups[g].itinerary].id,
                "itinerary already has a letter page, extra one ignored"
            ),
        }
    }

    for group in &mut groups {
        group.items.sort_by(|&a, &b| items[a].chronological_cmp(&items[b]));
    }

    groups.retain(|group| {
        if group.items.is_empty() {
            tracing::debug!(
                itinerary_id = itineraries[group.itinerary].id,
                has_letter = group.letter.is_some(),
                "itinerary has no media, skipped"
            );
        }
        !group.items.is_empty()
    });

    groups
}

/// What a run of frames shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Title,
    /// Letter page, index into the request's letters
    Letter(usize),
    /// Photo, index into the loaded items
    Photo(usize),
    /// Video, index into the loaded items
    Video(usize),
    /// Blend from the last frame shown into the first frame of item `incoming`
    Transition {
        kind: TransitionKind,
        incoming: usize,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub kind: SegmentKind,
    pub frames: u64,
}

/// The full montage as an ordered list of segments
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    pub segments: Vec<Segment>,
}

impl Timeline {
    /// Lay out title, letter pages, media and transitions.
    ///
    /// `Random` transitions are resolved here, once per transition instant.
    pub fn build<R: Rng + ?Sized>(
        groups: &[Group],
        items: &[MediaItem],
        config: &RenderConfig,
        rng: &mut R,
    ) -> Self {
        let mut segments = vec![Segment {
            kind: SegmentKind::Title,
            frames: TITLE_FRAMES,
        }];
        let transition = transition_frames(config);
        let push_transition = |segments: &mut Vec<Segment>, incoming: usize, rng: &mut R| {
            if transition > 0 {
                segments.push(Segment {
                    kind: SegmentKind::Transition {
                        kind: config.transition.resolve(rng),
                        incoming,
                    },
                    frames: transition,
                });
            }
        };

        for group in groups {
            let Some(&first) = group.items.first() else {
                continue;
            };

            if let Some(letter) = group.letter {
                segments.push(Segment {
                    kind: SegmentKind::Letter(letter),
                    frames: LETTER_FRAMES,
                });
                push_transition(&mut segments, first, &mut *rng);
            }

            for (pos, &idx) in group.items.iter().enumerate() {
                let item = &items[idx];
                let frames = item.frame_count(config.photo_duration_secs);
                segments.push(Segment {
                    kind: if item.is_photo() {
                        SegmentKind::Photo(idx)
                    } else {
                        SegmentKind::Video(idx)
                    },
                    frames,
                });

                // Only photo-to-photo; videos are never blended on either side
                if let Some(&next) = group.items.get(pos + 1) {
                    if item.is_photo() && items[next].is_photo() {
                        push_transition(&mut segments, next, &mut *rng);
                    }
                }
            }
        }

        Self { segments }
    }

    pub fn total_frames(&self) -> u64 {
        self.segments.iter().map(|s| s.frames).sum()
    }

    /// Media segments in play order
    pub fn media_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s.kind, SegmentKind::Photo(_) | SegmentKind::Video(_)))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image_loader::LoadedImage;
    use crate::model::{MediaKind, MediaRecord};
    use crate::timing::TimingPlan;
    use crate::video_source::VideoSource;
    use chrono::NaiveDateTime;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn itinerary(id: i64, start: &str, end: &str) -> Itinerary {
        Itinerary {
            id,
            trip_id: Some(1),
            title: None,
            start_date: date(start),
            end_date: date(end),
        }
    }

    fn record(id: i64, kind: MediaKind, captured: Option<&str>, itinerary_id: Option<i64>) -> MediaRecord {
        MediaRecord {
            id,
            kind,
            path: format!("m{}.jpg", id),
            captured_at: captured
                .map(|s| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()),
            caption: None,
            duration_secs: None,
            itinerary_id,
        }
    }

    fn photo(id: i64, captured: Option<&str>, itinerary_id: Option<i64>) -> MediaItem {
        MediaItem::Photo {
            record: record(id, MediaKind::Photo, captured, itinerary_id),
            image: LoadedImage {
                width: 2,
                height: 2,
                data: vec![0; 16],
            },
        }
    }

    fn video(id: i64, captured: &str, secs: f64) -> MediaItem {
        MediaItem::Video {
            record: record(id, MediaKind::Video, Some(captured), None),
            source: VideoSource::from_parts(format!("v{}.mp4", id), 640, 360, secs),
        }
    }

    fn letter(title: &str, itinerary_id: Option<i64>, date_str: Option<&str>) -> LetterPage {
        LetterPage {
            title: title.to_string(),
            body: "Querida familia".to_string(),
            date: date_str.map(date),
            itinerary_id,
        }
    }

    #[test]
    fn test_grouping_by_id_then_date() {
        let itineraries = vec![
            itinerary(20, "2024-05-05", "2024-05-09"),
            itinerary(10, "2024-05-01", "2024-05-04"),
        ];
        let items = vec![
            photo(1, Some("2024-05-06 10:00:00"), None),
            photo(2, Some("2024-05-02 09:00:00"), None),
            // Explicit id wins over the date
            photo(3, Some("2024-05-02 08:00:00"), Some(20)),
            // Outside every itinerary
            photo(4, Some("2024-06-01 12:00:00"), None),
            // No date, no id
            photo(5, None, None),
        ];

        let groups = group_media(&itineraries, &items, &[]);
        assert_eq!(groups.len(), 2);
        // Sorted by start date: itinerary 10 first
        assert_eq!(itineraries[groups[0].itinerary].id, 10);
        assert_eq!(groups[0].items, vec![1]);
        // Chronological inside the group: item 3 (May 2) before item 1 (May 6)
        assert_eq!(groups[1].items, vec![2, 0]);
    }

    #[test]
    fn test_empty_groups_and_extra_letters() {
        let itineraries = vec![
            itinerary(1, "2024-05-01", "2024-05-02"),
            itinerary(2, "2024-05-03", "2024-05-04"),
        ];
        let items = vec![photo(1, Some("2024-05-01 10:00:00"), None)];
        let letters = vec![
            letter("first", Some(1), None),
            letter("second", None, Some("2024-05-02")),
            letter("orphan group", Some(2), None),
        ];

        let groups = group_media(&itineraries, &items, &letters);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].letter, Some(0));
    }

    #[test]
    fn test_dated_letter_attaches_by_date() {
        let itineraries = vec![
            itinerary(1, "2024-05-01", "2024-05-02"),
            itinerary(2, "2024-05-03", "2024-05-06"),
        ];
        let items = vec![
            photo(1, Some("2024-05-01 10:00:00"), None),
            photo(2, Some("2024-05-04 10:00:00"), None),
        ];
        let letters = vec![
            letter("Oporto", None, Some("2024-05-05")),
            // Dated outside every itinerary
            letter("lost", None, Some("2024-07-01")),
        ];

        let groups = group_media(&itineraries, &items, &letters);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].letter, None);
        assert_eq!(itineraries[groups[1].itinerary].id, 2);
        assert_eq!(groups[1].letter, Some(0));
    }

    #[test]
    fn test_transitions_only_between_photos() {
        let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-31")];
        let items = vec![
            photo(1, Some("2024-05-01 10:00:00"), None),
            photo(2, Some("2024-05-01 11:00:00"), None),
            video(3, "2024-05-01 12:00:00", 2.0),
            photo(4, Some("2024-05-01 13:00:00"), None),
        ];
        let letters = vec![letter("Día 1", Some(1), None)];
        let config = RenderConfig::default();
        let groups = group_media(&itineraries, &items, &letters);
        let timeline = Timeline::build(&groups, &items, &config, &mut StdRng::seed_from_u64(7));

        let kinds: Vec<&str> = timeline
            .segments
            .iter()
            .map(|s| match s.kind {
                SegmentKind::Title => "title",
                SegmentKind::Letter(_) => "letter",
                SegmentKind::Photo(_) => "photo",
                SegmentKind::Video(_) => "video",
                SegmentKind::Transition { .. } => "transition",
            })
            .collect();
        assert_eq!(
            kinds,
            ["title", "letter", "transition", "photo", "transition", "photo", "video", "photo"]
        );

        let plan = TimingPlan::from_timeline(&timeline);
        assert_eq!(plan.total_frames, timeline.total_frames());
        assert_eq!(plan.video_frames, 60);
        assert_eq!(plan.total_frames, 90 + 150 + 30 + 120 + 30 + 120 + 60 + 120);
    }

    #[test]
    fn test_zero_length_transition_is_a_cut() {
        let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-31")];
        let items = vec![
            photo(1, Some("2024-05-01 10:00:00"), None),
            photo(2, Some("2024-05-01 11:00:00"), None),
        ];
        let config = RenderConfig {
            transition_duration_secs: 0.0,
            ..RenderConfig::default()
        };
        let groups = group_media(&itineraries, &items, &[]);
        let timeline = Timeline::build(&groups, &items, &config, &mut StdRng::seed_from_u64(1));
        assert_eq!(timeline.segments.len(), 3);
        assert_eq!(timeline.media_count(), 2);
    }

    #[test]
    fn test_random_resolves_to_concrete_kinds() {
        let itineraries = vec![itinerary(1, "2024-05-01", "2024-05-31")];
        let items: Vec<MediaItem> = (0..20)
            .map(|i| photo(i, Some(format!("2024-05-01 10:{:02}:00", i).as_str()), None))
            .collect();
        let config = RenderConfig {
            transition: TransitionKind::Random,
            ..RenderConfig::default()
        };
        let groups = group_media(&itineraries, &items, &[]);
        let timeline = Timeline::build(&groups, &items, &config, &mut StdRng::seed_from_u64(42));

        let resolved: Vec<TransitionKind> = timeline
            .segments
            .iter()
            .filter_map(|s| match s.kind {
                SegmentKind::Transition { kind, .. } => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(resolved.len(), 19);
        assert!(resolved.iter().all(|k| *k != TransitionKind::Random));
    }
}
