//! Backend records and per-run media items

use crate::image_loader::LoadedImage;
use crate::video_source::VideoSource;
use crate::{secs_to_frames, Result};
use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// A trip as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: i64,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(default, alias = "fecha_inicio")]
    pub start_date: Option<NaiveDate>,
    #[serde(default, alias = "fecha_fin")]
    pub end_date: Option<NaiveDate>,
}

/// A dated segment of a trip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Itinerary {
    pub id: i64,
    #[serde(default, alias = "viaje_id")]
    pub trip_id: Option<i64>,
    #[serde(default, alias = "titulo", alias = "nombre")]
    pub title: Option<String>,
    #[serde(alias = "fecha_inicio")]
    pub start_date: NaiveDate,
    #[serde(alias = "fecha_fin")]
    pub end_date: NaiveDate,
}

impl Itinerary {
    /// Inclusive on both ends
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

/// Kind of a stored media file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum MediaKind {
    Photo,
    Video,
    Audio,
    Gpx,
    Other,
}

impl From<String> for MediaKind {
    fn from(value: String) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "photo" | "foto" | "image" | "imagen" => MediaKind::Photo,
            "video" => MediaKind::Video,
            "audio" => MediaKind::Audio,
            "gpx" => MediaKind::Gpx,
            _ => MediaKind::Other,
        }
    }
}

/// A media file record as returned by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaRecord {
    pub id: i64,
    #[serde(alias = "tipo")]
    pub kind: MediaKind,
    /// Path relative to the API base
    #[serde(alias = "ruta")]
    pub path: String,
    #[serde(default, alias = "fecha_captura", with = "flexible_datetime")]
    pub captured_at: Option<NaiveDateTime>,
    #[serde(default, alias = "descripcion")]
    pub caption: Option<String>,
    /// Duration reported by the backend, for videos
    #[serde(default, alias = "duracion")]
    pub duration_secs: Option<f64>,
    #[serde(default, alias = "itinerario_id")]
    pub itinerary_id: Option<i64>,
}

impl MediaRecord {
    pub fn captured_date(&self) -> Option<NaiveDate> {
        self.captured_at.map(|ts| ts.date())
    }

    pub fn is_montage_candidate(&self) -> bool {
        matches!(self.kind, MediaKind::Photo | MediaKind::Video)
    }
}

/// Manuscript-style title card shown before an itinerary's media
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetterPage {
    #[serde(alias = "titulo")]
    pub title: String,
    #[serde(default, alias = "contenido", alias = "texto")]
    pub body: String,
    #[serde(default, alias = "fecha")]
    pub date: Option<NaiveDate>,
    #[serde(default, alias = "itinerario_id")]
    pub itinerary_id: Option<i64>,
}

/// Background music for the montage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioTrack {
    /// Relative path, absolute URL or local file
    #[serde(alias = "url", alias = "ruta")]
    pub source: String,
    #[serde(default = "default_volume", alias = "volumen")]
    pub volume: f32,
}

fn default_volume() -> f32 {
    1.0
}

/// Everything one generation run consumes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    #[serde(alias = "viaje")]
    pub trip: Trip,
    #[serde(default, alias = "itinerarios")]
    pub itineraries: Vec<Itinerary>,
    #[serde(default, alias = "archivos")]
    pub media: Vec<MediaRecord>,
    #[serde(default, alias = "cartas")]
    pub letters: Vec<LetterPage>,
    #[serde(default)]
    pub audio: Option<AudioTrack>,
}

impl GenerationRequest {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A decoded media item, constructed once per run
#[derive(Debug, Clone)]
pub enum MediaItem {
    Photo {
        record: MediaRecord,
        image: LoadedImage,
    },
    Video {
        record: MediaRecord,
        source: VideoSource,
    },
}

impl MediaItem {
    pub fn record(&self) -> &MediaRecord {
        match self {
            MediaItem::Photo { record, .. } | MediaItem::Video { record, .. } => record,
        }
    }

    pub fn is_photo(&self) -> bool {
        matches!(self, MediaItem::Photo { .. })
    }

    /// Frames this item occupies on the timeline.
    ///
    /// Photos use the configured pace; videos always play their own length.
    pub fn frame_count(&self, photo_duration_secs: f64) -> u64 {
        match self {
            MediaItem::Photo { .. } => secs_to_frames(photo_duration_secs).max(1),
            MediaItem::Video { source, .. } => secs_to_frames(source.duration_secs),
        }
    }

    /// Chronological order: captured items first by timestamp, then by id
    pub fn chronological_cmp(&self, other: &MediaItem) -> Ordering {
        let (a, b) = (self.record(), other.record());
        match (a.captured_at, b.captured_at) {
            (Some(x), Some(y)) => x.cmp(&y).then(a.id.cmp(&b.id)),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => a.id.cmp(&b.id),
        }
    }
}

/// Timestamps arrive as RFC 3339, naive ISO 8601 with `T` or a space, or a bare date
mod flexible_datetime {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};
    use serde::{Deserialize, Deserializer, Serializer};

    const FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y:%m:%d %H:%M:%S",
    ];

    pub fn parse(raw: &str) -> Option<NaiveDateTime> {
        let raw = raw.trim();
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.naive_utc());
        }
        for format in FORMATS {
            if let Ok(ts) = NaiveDateTime::parse_from_str(raw, format) {
                return Some(ts);
            }
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
    }

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDateTime>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(ts) => serializer.serialize_str(&ts.format("%Y-%m-%dT%H:%M:%S").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDateTime>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
        }
    }
}
