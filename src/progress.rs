//! Progress reporting and cancellation

use crate::{Error, ErrorCode, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError};
use serde::Serialize;
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Slots kept free for phase and terminal events; frame events never fill them
const PHASE_HEADROOM: usize = 6;

/// Stage of a generation run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Fetching and decoding media
    Loading,
    /// Grouping and timeline planning
    Processing,
    /// Rendering and encoding frames
    Generating,
    /// Mixing in the audio track
    Mixing,
    Completed,
    Error,
}

impl Phase {
    /// Percent range `[start, end)` a phase occupies
    fn span(&self) -> (f32, f32) {
        match self {
            Phase::Loading => (0.0, 10.0),
            Phase::Processing => (10.0, 15.0),
            Phase::Generating => (15.0, 90.0),
            Phase::Mixing => (90.0, 99.0),
            Phase::Completed => (100.0, 100.0),
            Phase::Error => (0.0, 0.0),
        }
    }
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    /// 0..=100, never decreasing within a run
    pub percent: f32,
    pub message: String,
    /// Numeric `ErrorCode`, only on `Error` events
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<u8>,
}

/// Sending half of the progress channel, owned by the generation thread.
///
/// Keeps its own receiver handle so a phase event can evict the oldest queued
/// event instead of waiting on a receiver that is not draining.
pub struct ProgressReporter {
    channel: Option<(Sender<ProgressEvent>, Receiver<ProgressEvent>)>,
    capacity: usize,
    percent: Cell<f32>,
}

impl ProgressReporter {
    /// Bounded channel of `capacity` events
    pub fn channel(capacity: usize) -> (Self, Receiver<ProgressEvent>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            Self {
                channel: Some((sender, receiver.clone())),
                capacity,
                percent: Cell::new(0.0),
            },
            receiver,
        )
    }

    /// Reporter that drops every event
    pub fn disabled() -> Self {
        Self {
            channel: None,
            capacity: 0,
            percent: Cell::new(0.0),
        }
    }

    /// Last reported percent
    pub fn percent(&self) -> f32 {
        self.percent.get()
    }

    /// Announce a phase change. Never blocks; a full channel loses its oldest event.
    pub fn phase(&self, phase: Phase, message: impl Into<String>) {
        let start = phase.span().0;
        let event = self.event(phase, start, message.into());
        self.deliver(event);
    }

    /// Report `done` of `total` units inside `phase`. Dropped once only the phase headroom is left.
    pub fn step(&self, phase: Phase, done: u64, total: u64, message: impl Into<String>) {
        let (start, end) = phase.span();
        let fraction = if total == 0 {
            1.0
        } else {
            (done.min(total) as f32) / (total as f32)
        };
        let event = self.event(phase, start + (end - start) * fraction, message.into());
        if let Some((sender, _)) = &self.channel {
            let headroom = PHASE_HEADROOM.min(self.capacity - 1);
            if sender.len() + headroom < self.capacity {
                // Disconnected: frame events are best effort
                let _ = sender.try_send(event);
            }
        }
    }

    /// Frame-level progress during rendering
    pub fn frame(&self, done: u64, total: u64) {
        self.step(Phase::Generating, done, total, format!("frame {}/{}", done, total));
    }

    /// Report a failed run
    pub fn error(&self, error: &Error) {
        let event = ProgressEvent {
            phase: Phase::Error,
            percent: self.percent.get(),
            message: error.to_string(),
            code: Some(ErrorCode::from(error) as u8),
        };
        self.deliver(event);
    }

    fn deliver(&self, mut event: ProgressEvent) {
        let Some((sender, receiver)) = &self.channel else {
            return;
        };
        loop {
            match sender.try_send(event) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => return,
                Err(TrySendError::Full(rejected)) => {
                    event = rejected;
                    if let Ok(evicted) = receiver.try_recv() {
                        tracing::debug!(phase = ?evicted.phase, "progress channel full, oldest event evicted");
                    }
                }
            }
        }
    }

    /// Clamp to the running maximum so percent never goes backwards
    fn event(&self, phase: Phase, percent: f32, message: String) -> ProgressEvent {
        let percent = percent.clamp(0.0, 100.0).max(self.percent.get());
        self.percent.set(percent);
        ProgressEvent {
            phase,
            percent,
            message,
            code: None,
        }
    }
}

/// Shared cancellation flag, checked before every rendered frame
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    /// `Err(Error::Cancelled)` once cancellation was requested
    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            Err(Error::Cancelled)
        } else {
            Ok(())
        }
    }
}
