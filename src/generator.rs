//! Montage generation: load, plan, render, record, mix

use crate::audio::AudioMixer;
use crate::config::{GeneratorOptions, RenderConfig};
use crate::encoder::codec::{negotiate, CodecProbe, FfmpegProbe, PREFERENCES};
use crate::encoder::{create_recorder, Recorder, RecorderConfig};
use crate::fetch::MediaFetcher;
use crate::image_loader::LoadedImage;
use crate::model::{GenerationRequest, LetterPage, MediaItem, MediaKind, MediaRecord, Trip};
use crate::progress::{CancelToken, Phase, ProgressEvent, ProgressReporter};
use crate::render::{FrameRenderer, MediaFrame};
use crate::surface::{fit_rect, RenderSurface, Snapshot};
use crate::timeline::{group_media, SegmentKind, Timeline};
use crate::timing::TimingPlan;
use crate::transition::{compose, progress_at, TransitionKind};
use crate::video_source::{first_frame, VideoDecoder, VideoSource};
use crate::{Color, Error, FitMode, Result, FPS};
use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::thread::JoinHandle;

/// A finished montage
#[derive(Debug, Clone)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    pub mime_type: String,
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub duration_secs: f64,
    pub has_audio: bool,
}

impl EncodedOutput {
    pub fn write_to<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.bytes)?;
        Ok(())
    }
}

/// Handle to a generation running on a background thread
pub struct GenerationTask {
    pub progress: Receiver<ProgressEvent>,
    pub cancel: CancelToken,
    join: JoinHandle<Result<EncodedOutput>>,
}

impl GenerationTask {
    /// Request cancellation; the run stops before its next frame
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the run to end
    pub fn join(self) -> Result<EncodedOutput> {
        self.join
            .join()
            .map_err(|_| Error::Encode("generation thread panicked".to_string()))?
    }
}

pub struct VideoGenerator {
    config: RenderConfig,
    options: GeneratorOptions,
    probe: Option<Box<dyn CodecProbe + Send + Sync>>,
}

impl VideoGenerator {
    pub fn new(config: RenderConfig, options: GeneratorOptions) -> Result<Self> {
        config.validate()?;
        options.validate()?;
        Ok(Self {
            config,
            options,
            probe: None,
        })
    }

    /// Use a fixed capability probe instead of asking ffmpeg
    pub fn with_probe(mut self, probe: impl CodecProbe + Send + Sync + 'static) -> Self {
        self.probe = Some(Box::new(probe));
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Run on the current thread without progress reporting
    pub fn generate(&self, request: &GenerationRequest) -> Result<EncodedOutput> {
        self.generate_with(request, &ProgressReporter::disabled(), &CancelToken::new())
    }

    /// Run on a background thread
    pub fn spawn(self, request: GenerationRequest) -> Result<GenerationTask> {
        let (reporter, progress) = ProgressReporter::channel(self.options.progress_capacity);
        let cancel = CancelToken::new();
        let token = cancel.clone();

        let join = std::thread::Builder::new()
            .name("tripreel-generator".to_string())
            .spawn(move || self.generate_with(&request, &reporter, &token))?;

        Ok(GenerationTask {
            progress,
            cancel,
            join,
        })
    }

    /// Run on the current thread, reporting progress and honoring `cancel`
    #[tracing::instrument(skip_all, fields(trip_id = request.trip.id))]
    pub fn generate_with(
        &self,
        request: &GenerationRequest,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<EncodedOutput> {
        match self.run(request, reporter, cancel) {
            Ok(output) => {
                reporter.phase(Phase::Completed, "video ready");
                tracing::info!(
                    frames = output.frame_count,
                    duration_secs = output.duration_secs,
                    bytes = output.bytes.len(),
                    mime = %output.mime_type,
                    has_audio = output.has_audio,
                    "montage generated"
                );
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(error = %e, "montage generation failed");
                reporter.error(&e);
                Err(e)
            }
        }
    }

    fn run(
        &self,
        request: &GenerationRequest,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<EncodedOutput> {
        let ffmpeg_path = self.options.ffmpeg_path.as_deref();
        let (width, height) = self.config.dimensions();

        let detected;
        let probe: &dyn CodecProbe = match &self.probe {
            Some(probe) => probe.as_ref(),
            None => {
                detected = FfmpegProbe::new(ffmpeg_path);
                &detected
            }
        };
        // Format and size are fixed before anything is drawn
        let descriptor = negotiate(probe, &PREFERENCES, false)?;

        reporter.phase(Phase::Loading, "loading media");
        let mut fetcher = MediaFetcher::new(&self.options.api_base);
        let items = load_media(
            &request.media,
            &mut fetcher,
            (width, height),
            ffmpeg_path,
            reporter,
            cancel,
        )?;

        reporter.phase(Phase::Processing, "planning montage");
        let groups = group_media(&request.itineraries, &items, &request.letters);
        if groups.is_empty() {
            return Err(Error::InvalidInput(
                "no photo or video belongs to any itinerary".to_string(),
            ));
        }
        let mut rng = match self.config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let timeline = Timeline::build(&groups, &items, &self.config, &mut rng);
        let plan = TimingPlan::from_timeline(&timeline);
        tracing::info!(
            media = timeline.media_count(),
            letters = plan.letters,
            transitions = plan.transitions,
            total_frames = plan.total_frames,
            duration_secs = plan.duration_secs(),
            mime = descriptor.mime_type,
            "montage planned"
        );

        reporter.phase(Phase::Generating, "rendering frames");
        let renderer = FrameRenderer::from_config(&self.config, self.options.font_path.as_deref());
        let mut surface = RenderSurface::new(width, height)?;
        let mut recorder = create_recorder(
            &descriptor,
            RecorderConfig {
                width,
                height,
                fps: FPS,
                bitrate: self.config.quality.bitrate(),
                duration_secs: Some(plan.duration_secs()),
            },
            ffmpeg_path,
        )?;

        let sequencer = Sequencer::new(&renderer, &items, &request.letters, &request.trip)
            .with_fit(self.config.fit)
            .with_ffmpeg_path(ffmpeg_path);
        let frame_count = sequencer.render(&timeline, &mut surface, recorder.as_mut(), reporter, cancel)?;
        let bytes = recorder.finish()?;

        let mut output = EncodedOutput {
            bytes,
            mime_type: descriptor.mime_type.to_string(),
            width,
            height,
            frame_count,
            duration_secs: plan.duration_secs(),
            has_audio: false,
        };

        if let Some(track) = &request.audio {
            cancel.check()?;
            reporter.phase(Phase::Mixing, "mixing audio");
            match fetcher.fetch(&track.source) {
                Ok(path) => {
                    let mixed = AudioMixer::new(probe, ffmpeg_path).mix_or_silent(
                        std::mem::take(&mut output.bytes),
                        descriptor,
                        &path,
                        track.volume,
                        plan.duration_secs(),
                    );
                    output.bytes = mixed.bytes;
                    output.mime_type = mixed.descriptor.mime_type.to_string();
                    output.has_audio = mixed.has_audio;
                }
                Err(e) => {
                    tracing::warn!(error = %e, source = %track.source, "audio track unavailable, keeping silent video");
                }
            }
        }

        Ok(output)
    }
}

/// Fetch and decode every montage candidate. Failures are logged and skipped.
pub fn load_media(
    records: &[MediaRecord],
    fetcher: &mut MediaFetcher,
    canvas: (u32, u32),
    ffmpeg_path: Option<&str>,
    reporter: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<Vec<MediaItem>> {
    let mut items = Vec::new();
    let total = records.len() as u64;

    for (done, record) in records.iter().enumerate() {
        cancel.check()?;
        reporter.step(Phase::Loading, done as u64, total, format!("loading {}", record.path));

        if !record.is_montage_candidate() {
            tracing::debug!(media_id = record.id, kind = ?record.kind, "not a montage candidate, ignored");
            continue;
        }

        let loaded = fetcher.fetch(&record.path).and_then(|path| match record.kind {
            MediaKind::Video => VideoSource::probe_with_fallback(&path, ffmpeg_path, record.duration_secs).and_then(|source| {
                if source.duration_secs > 0.0 {
                    Ok(MediaItem::Video {
                        record: record.clone(),
                        source,
                    })
                } else {
                    Err(Error::Decode("video has zero duration".to_string()))
                }
            }),
            _ => {
                // Kept large enough to cover the canvas, so either fit mode only scales down
                let image = LoadedImage::from_path(&path)?.shrink_to_canvas(canvas.0, canvas.1)?;
                Ok(MediaItem::Photo {
                    record: record.clone(),
                    image,
                })
            }
        });

        match loaded {
            Ok(item) => items.push(item),
            Err(e) => tracing::warn!(media_id = record.id, path = %record.path, error = %e, "media failed to load, dropped"),
        }
    }

    if items.is_empty() {
        return Err(Error::InvalidInput("no photo or video could be loaded".to_string()));
    }
    tracing::debug!(loaded = items.len(), requested = records.len(), "media loaded");
    Ok(items)
}

/// Decode size for a video so that fitting it to the canvas needs no further scaling
fn decode_size(source: &VideoSource, canvas: (u32, u32), fit: FitMode) -> (u32, u32) {
    if source.width == 0 || source.height == 0 {
        return canvas;
    }
    let rect = fit_rect(source.width, source.height, canvas.0, canvas.1, fit);
    (rect.width.max(2) & !1, rect.height.max(2) & !1)
}

/// Walks a timeline and writes every frame to a recorder
pub struct Sequencer<'a> {
    renderer: &'a FrameRenderer,
    items: &'a [MediaItem],
    letters: &'a [LetterPage],
    title: &'a str,
    subtitle: Option<String>,
    fit: FitMode,
    ffmpeg_path: Option<&'a str>,
}

impl<'a> Sequencer<'a> {
    pub fn new(
        renderer: &'a FrameRenderer,
        items: &'a [MediaItem],
        letters: &'a [LetterPage],
        trip: &'a Trip,
    ) -> Self {
        let subtitle = match (trip.start_date, trip.end_date) {
            (Some(start), Some(end)) if start != end => Some(format!(
                "{} - {}",
                start.format("%d/%m/%Y"),
                end.format("%d/%m/%Y")
            )),
            (Some(day), _) | (None, Some(day)) => Some(day.format("%d/%m/%Y").to_string()),
            (None, None) => None,
        };
        Self {
            renderer,
            items,
            letters,
            title: &trip.name,
            subtitle,
            fit: FitMode::default(),
            ffmpeg_path: None,
        }
    }

    pub fn with_fit(mut self, fit: FitMode) -> Self {
        self.fit = fit;
        self
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: Option<&'a str>) -> Self {
        self.ffmpeg_path = ffmpeg_path;
        self
    }

    /// Render and record the whole timeline; returns the number of frames written
    pub fn render(
        &self,
        timeline: &Timeline,
        surface: &mut RenderSurface,
        recorder: &mut dyn Recorder,
        reporter: &ProgressReporter,
        cancel: &CancelToken,
    ) -> Result<u64> {
        let mut out = FrameSink {
            recorder,
            reporter,
            cancel,
            written: 0,
            total: timeline.total_frames(),
        };
        // Incoming frame of the last transition, reused by the segment it led into
        let mut prepared: Option<(usize, Snapshot)> = None;

        for segment in &timeline.segments {
            match segment.kind {
                SegmentKind::Title => {
                    for i in 0..segment.frames {
                        out.check()?;
                        self.renderer.draw_title_card(
                            surface,
                            self.title,
                            self.subtitle.as_deref(),
                            i,
                            segment.frames,
                        );
                        out.emit(surface)?;
                    }
                }
                SegmentKind::Letter(idx) => {
                    let letter = &self.letters[idx];
                    for i in 0..segment.frames {
                        out.check()?;
                        self.renderer.draw_letter_page(surface, letter, i, segment.frames);
                        out.emit(surface)?;
                    }
                }
                SegmentKind::Transition { kind, incoming } => {
                    self.render_transition(surface, &mut out, kind, incoming, segment.frames, &mut prepared)?;
                }
                SegmentKind::Photo(idx) => {
                    let still = match prepared.take() {
                        Some((prepared_idx, snapshot)) if prepared_idx == idx => snapshot,
                        _ => {
                            self.paint_first_frame(surface, idx)?;
                            surface.snapshot()
                        }
                    };
                    for _ in 0..segment.frames {
                        out.check()?;
                        surface.restore(&still);
                        out.emit(surface)?;
                    }
                }
                SegmentKind::Video(idx) => {
                    prepared = None;
                    self.render_video(surface, &mut out, idx, segment.frames)?;
                }
            }
        }

        if out.written != out.total {
            return Err(Error::Encode(format!(
                "wrote {} frames, planned {}",
                out.written, out.total
            )));
        }
        Ok(out.written)
    }

    fn render_transition(
        &self,
        surface: &mut RenderSurface,
        out: &mut FrameSink<'_>,
        kind: TransitionKind,
        incoming: usize,
        frames: u64,
        prepared: &mut Option<(usize, Snapshot)>,
    ) -> Result<()> {
        let outgoing = surface.snapshot();
        self.paint_first_frame(surface, incoming)?;
        let target = surface.snapshot();

        for i in 0..frames {
            out.check()?;
            compose(surface, &outgoing, &target, kind, progress_at(i, frames));
            out.emit(surface)?;
        }

        *prepared = Some((incoming, target));
        Ok(())
    }

    /// Paint the first frame of item `idx`
    fn paint_first_frame(&self, surface: &mut RenderSurface, idx: usize) -> Result<()> {
        match &self.items[idx] {
            MediaItem::Photo { record, image } => {
                self.renderer.draw_media(surface, MediaFrame::Photo(image), record)
            }
            MediaItem::Video { record, source } => {
                let size = decode_size(source, (surface.width(), surface.height()), self.fit);
                match first_frame(source, size.0, size.1, self.ffmpeg_path) {
                    Ok(frame) => self.renderer.draw_media(surface, MediaFrame::VideoFrame(&frame), record),
                    Err(e) => {
                        tracing::warn!(media_id = record.id, error = %e, "first video frame unavailable");
                        surface.fill(Color::BLACK);
                        Ok(())
                    }
                }
            }
        }
    }

    /// Play a video for exactly `frames` frames, holding the last good frame on decode failure
    fn render_video(
        &self,
        surface: &mut RenderSurface,
        out: &mut FrameSink<'_>,
        idx: usize,
        frames: u64,
    ) -> Result<()> {
        let MediaItem::Video { record, source } = &self.items[idx] else {
            return Err(Error::InvalidInput(format!("item {} is not a video", idx)));
        };

        let size = decode_size(source, (surface.width(), surface.height()), self.fit);
        let mut decoder = match VideoDecoder::open(source, size.0, size.1, self.ffmpeg_path) {
            Ok(decoder) => Some(decoder),
            Err(e) => {
                tracing::warn!(media_id = record.id, error = %e, "video decoder failed to start");
                None
            }
        };
        let mut hold: Option<Snapshot> = None;
        let overlay = self.renderer.overlay_for(record, surface.width(), surface.height());

        for i in 0..frames {
            out.check()?;
            let frame = match decoder.as_mut().map(|d| d.read_frame()) {
                Some(Ok(frame)) => frame,
                Some(Err(e)) => {
                    tracing::warn!(media_id = record.id, frame = i, error = %e, "video decode failed, holding last frame");
                    decoder = None;
                    None
                }
                None => None,
            };

            match frame {
                Some(frame) => {
                    self.renderer
                        .draw_media_with(surface, MediaFrame::VideoFrame(&frame), overlay.as_ref())?;
                }
                None => match &hold {
                    Some(snapshot) => surface.restore(snapshot),
                    None => {
                        if i == 0 {
                            surface.fill(Color::BLACK);
                        }
                        hold = Some(surface.snapshot());
                    }
                },
            }
            out.emit(surface)?;
        }

        Ok(())
    }
}

/// Recorder plus bookkeeping shared by every segment
struct FrameSink<'r> {
    recorder: &'r mut dyn Recorder,
    reporter: &'r ProgressReporter,
    cancel: &'r CancelToken,
    written: u64,
    total: u64,
}

impl FrameSink<'_> {
    fn check(&self) -> Result<()> {
        self.cancel.check()
    }

    fn emit(&mut self, surface: &RenderSurface) -> Result<()> {
        self.recorder.write_frame(surface)?;
        self.written += 1;
        self.reporter.frame(self.written, self.total);
        Ok(())
    }
}
