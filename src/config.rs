// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON at `$XDG_CONFIG_HOME/fxcam/config.json`. A missing file
//! yields the defaults; a malformed one is reported and also yields the
//! defaults, so a bad edit never prevents the preview from starting.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::backends::camera::{CameraDevice, CameraFormat, Framerate, Orientation, PixelFormat, SourceKind};
use crate::constants::{presentation, timing};
use crate::errors::ConfigError;
use crate::filters::{ComicParams, FilterKind};
use crate::pipeline::{ContentFit, PipelineSettings, Size};

/// Current on-disk config version
pub const CONFIG_VERSION: u32 = 1;

const APP_DIR: &str = "fxcam";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub version: u32,
    /// Frame source to open
    pub source: SourceKind,
    /// Capture resolution
    pub width: u32,
    pub height: u32,
    pub framerate: u32,
    /// Raw pixel format produced by the test pattern
    pub capture_format: PixelFormat,
    /// Format GStreamer converts device frames to before the appsink
    pub output_format: PixelFormat,
    pub filter: FilterKind,
    pub comic: ComicParams,
    /// Mirror the preview horizontally (selfie mode)
    pub mirror_preview: bool,
    pub orientation: Orientation,
    pub content_fit: ContentFit,
    /// Presentation surface size in pixels
    pub target_width: u32,
    pub target_height: u32,
    /// Screen pixel density (1.0 standard, 2.0 HiDPI)
    pub density: f64,
    pub refresh_hz: u32,
    pub drawable_count: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            source: SourceKind::default(),
            width: 640,
            height: 480,
            framerate: timing::DEFAULT_FRAMERATE,
            capture_format: PixelFormat::YUYV,
            output_format: PixelFormat::RGBA,
            filter: FilterKind::default(),
            comic: ComicParams::default(),
            mirror_preview: true,
            orientation: Orientation::default(),
            content_fit: ContentFit::default(),
            target_width: 640,
            target_height: 480,
            density: 1.0,
            refresh_hz: timing::DEFAULT_REFRESH_HZ,
            drawable_count: presentation::DEFAULT_DRAWABLE_COUNT,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR).join(CONFIG_FILE))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Load from the default location, falling back to defaults
    pub fn load() -> Self {
        match Self::config_path() {
            Ok(path) => Self::load_or_default(&path),
            Err(e) => {
                warn!(error = %e, "Using default configuration");
                Self::default()
            }
        }
    }

    /// Load `path`, falling back to defaults when missing or malformed
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "No config file, using defaults");
            return Self::default();
        }
        match Self::load_from(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Ignoring unreadable config file");
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        if config.version != CONFIG_VERSION {
            info!(found = config.version, expected = CONFIG_VERSION, "Config version differs, missing fields use defaults");
        }
        Ok(config)
    }

    pub fn save(&self) -> Result<PathBuf, ConfigError> {
        let path = Self::config_path()?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        debug!(path = %path.display(), "Config saved");
        Ok(())
    }

    /// Device description for the configured source
    pub fn camera_device(&self) -> CameraDevice {
        let name = match &self.source {
            SourceKind::TestPattern => "Test pattern".to_string(),
            SourceKind::V4l2 { path } => path.clone(),
            SourceKind::PipeWire { node } => node.clone().unwrap_or_else(|| "PipeWire camera".to_string()),
        };
        CameraDevice {
            name,
            kind: self.source.clone(),
            format: CameraFormat {
                width: self.width,
                height: self.height,
                framerate: Framerate::from_int(self.framerate),
                pixel_format: self.capture_format,
            },
            mirrored: self.mirror_preview,
            orientation: self.orientation,
        }
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            filter: self.filter,
            comic: self.comic,
            content_fit: self.content_fit,
            orientation: self.orientation,
            mirrored: self.mirror_preview,
            target: Size::new(self.target_width as f64, self.target_height as f64),
            density: self.density,
            refresh_hz: self.refresh_hz,
            drawable_count: self.drawable_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{"filter": "mono", "source": {"kind": "v4l2", "path": "/dev/video2"}}"#).unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.filter, FilterKind::Mono);
        assert_eq!(config.source, SourceKind::V4l2 { path: "/dev/video2".into() });
        assert_eq!(config.refresh_hz, timing::DEFAULT_REFRESH_HZ);
        assert_eq!(config.camera_device().name, "/dev/video2");
    }

    #[test]
    fn test_malformed_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from(&path), Err(ConfigError::Parse(_))));
        assert_eq!(Config::load_or_default(&path), Config::default());
    }

    #[test]
    fn test_pipeline_settings_follow_config() {
        let config = Config {
            mirror_preview: false,
            target_width: 1920,
            target_height: 1080,
            ..Config::default()
        };
        let settings = config.pipeline_settings();
        assert!(!settings.mirrored);
        assert_eq!(settings.target, Size::new(1920.0, 1080.0));
    }
}
