//! Transition effects between two rendered frames

use crate::surface::{RenderSurface, Snapshot};
use crate::Color;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// How consecutive frames are bridged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    /// Linear cross-dissolve
    #[default]
    Fade,
    /// Horizontal push, incoming frame enters from the right
    Slide,
    /// Outgoing scales up and fades out, incoming scales down into place
    Zoom,
    /// Uniform pick among the concrete kinds at every transition
    #[serde(alias = "aleatoria", alias = "aleatorio")]
    Random,
}

impl TransitionKind {
    pub const CONCRETE: [TransitionKind; 3] =
        [TransitionKind::Fade, TransitionKind::Slide, TransitionKind::Zoom];

    /// Resolve `Random` to a concrete kind; concrete kinds are returned as-is
    pub fn resolve<R: Rng + ?Sized>(self, rng: &mut R) -> TransitionKind {
        match self {
            TransitionKind::Random => Self::CONCRETE[rng.gen_range(0..Self::CONCRETE.len())],
            kind => kind,
        }
    }
}

/// Zoom factor the outgoing frame reaches, and the incoming frame starts from
const ZOOM_FACTOR: f32 = 0.5;

/// Paint one transition frame.
///
/// `progress` runs from 0 (all outgoing) to 1 (all incoming). The surface is
/// fully repainted.
pub fn compose(
    surface: &mut RenderSurface,
    outgoing: &Snapshot,
    incoming: &Snapshot,
    kind: TransitionKind,
    progress: f32,
) {
    let t = progress.clamp(0.0, 1.0);
    match kind {
        TransitionKind::Fade | TransitionKind::Random => {
            surface.restore(outgoing);
            surface.blend(incoming.view(), 0, 0, t);
        }
        TransitionKind::Slide => {
            let width = surface.width() as f32;
            let offset = (t * width).round() as i32;
            surface.fill(Color::BLACK);
            surface.blit(outgoing.view(), -offset, 0);
            surface.blit(incoming.view(), surface.width() as i32 - offset, 0);
        }
        TransitionKind::Zoom => {
            surface.fill(Color::BLACK);
            surface.blend_scaled(outgoing.view(), 1.0 + ZOOM_FACTOR * t, 1.0 - t);
            surface.blend_scaled(incoming.view(), 1.0 + ZOOM_FACTOR * (1.0 - t), t);
        }
    }
}

/// Progress of frame `index` in a transition of `total` frames.
///
/// Both endpoints are excluded: the frames before and after the transition
/// already show the pure outgoing and incoming images.
pub fn progress_at(index: u64, total: u64) -> f32 {
    if total == 0 {
        return 1.0;
    }
    (index + 1) as f32 / (total + 1) as f32
}
