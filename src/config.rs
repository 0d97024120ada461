//! Render configuration and generator environment

use crate::transition::TransitionKind;
use crate::{Error, FitMode, Quality, Resolution, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User-facing render settings for one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct RenderConfig {
    /// Seconds each photo stays on screen
    #[serde(alias = "duracionPorFoto")]
    pub photo_duration_secs: f64,
    /// Transition effect between photos and after letter pages
    #[serde(alias = "tipoTransicion")]
    pub transition: TransitionKind,
    /// Seconds each transition lasts
    #[serde(alias = "duracionTransicion")]
    pub transition_duration_secs: f64,
    #[serde(alias = "resolucion")]
    pub resolution: Resolution,
    #[serde(alias = "calidad")]
    pub quality: Quality,
    /// Draw the caption/date bar over media frames
    #[serde(alias = "mostrarTexto")]
    pub show_overlay: bool,
    #[serde(alias = "ajuste")]
    pub fit: FitMode,
    /// Seed for `random` transitions; entropy when absent
    pub random_seed: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            photo_duration_secs: 4.0,
            transition: TransitionKind::Fade,
            transition_duration_secs: 1.0,
            resolution: Resolution::P720,
            quality: Quality::Medium,
            show_overlay: true,
            fit: FitMode::Contain,
            random_seed: None,
        }
    }
}

impl RenderConfig {
    /// Parse a configuration from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: RenderConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !self.photo_duration_secs.is_finite() || self.photo_duration_secs <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "photo duration must be positive, got {}",
                self.photo_duration_secs
            )));
        }
        if !self.transition_duration_secs.is_finite() || self.transition_duration_secs < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "transition duration must be zero or positive, got {}",
                self.transition_duration_secs
            )));
        }
        Ok(())
    }

    /// Canvas size in pixels
    pub fn dimensions(&self) -> (u32, u32) {
        self.resolution.dimensions()
    }
}

/// Environment the generator runs in
#[derive(Debug, Clone)]
pub struct GeneratorOptions {
    /// Base for relative media paths: an `http(s)://` URL or a local directory
    pub api_base: String,
    /// Path to ffmpeg executable (PATH lookup when absent)
    pub ffmpeg_path: Option<String>,
    /// Font used for titles, letter pages and overlays
    pub font_path: Option<PathBuf>,
    /// Capacity of the bounded progress channel
    pub progress_capacity: usize,
}

impl Default for GeneratorOptions {
    fn default() -> Self {
        Self {
            api_base: ".".to_string(),
            ffmpeg_path: None,
            font_path: None,
            progress_capacity: 64,
        }
    }
}

impl GeneratorOptions {
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    pub fn with_ffmpeg_path(mut self, ffmpeg_path: impl Into<String>) -> Self {
        self.ffmpeg_path = Some(ffmpeg_path.into());
        self
    }

    pub fn with_font_path(mut self, font_path: impl Into<PathBuf>) -> Self {
        self.font_path = Some(font_path.into());
        self
    }

    /// Validate the options
    pub fn validate(&self) -> Result<()> {
        if self.api_base.trim().is_empty() {
            return Err(Error::InvalidConfig("api base must not be empty".to_string()));
        }
        if self.progress_capacity == 0 {
            return Err(Error::InvalidConfig(
                "progress channel capacity must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(RenderConfig::default().validate().is_ok());
        assert!(GeneratorOptions::default().validate().is_ok());
    }

    #[test]
    fn test_from_json_with_backend_names() {
        let config = RenderConfig::from_json_str(
            r#"{"duracionPorFoto": 4, "tipoTransicion": "fade", "duracionTransicion": 1, "resolucion": "720p"}"#,
        )
        .unwrap();
        assert_eq!(config.photo_duration_secs, 4.0);
        assert_eq!(config.transition, TransitionKind::Fade);
        assert_eq!(config.transition_duration_secs, 1.0);
        assert_eq!(config.dimensions(), (1280, 720));
        assert!(config.show_overlay);
    }

    #[test]
    fn test_rejects_bad_durations() {
        let config = RenderConfig {
            photo_duration_secs: 0.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = RenderConfig {
            transition_duration_secs: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        assert!(RenderConfig::from_json_str(r#"{"photo_duration_secs": -2}"#).is_err());
    }
}
