//! File configuration for the demo binary.
//!
//! Everything here has a default, so an empty file (or no file) is valid.
//! Command-line flags override individual values after loading.

use crate::device::{
    CameraDescriptor, DriverCapabilities, ImageFormat, LensDirection, MockConfig, Resolution,
    ResolutionPreset,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Highest frame rate the mock camera accepts.
const MAX_MOCK_FPS: u32 = 240;

/// Which camera to open and how.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Camera name or index.
    pub camera: String,
    /// Lens facing reported for the camera.
    pub lens: LensDirection,
    /// Sensor orientation in degrees (0, 90, 180 or 270).
    pub orientation: u16,
    /// Capture-quality tier.
    pub preset: ResolutionPreset,
    /// Record an audio track.
    pub enable_audio: bool,
    /// Sizes the camera supports, as `[width, height]` pairs.
    pub resolutions: Vec<[u32; 2]>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            camera: "back".to_string(),
            lens: LensDirection::Back,
            orientation: 0,
            preset: ResolutionPreset::High,
            enable_audio: false,
            resolutions: vec![[320, 240], [720, 480], [1280, 720], [1920, 1080]],
        }
    }
}

impl SessionConfig {
    /// Descriptor built from these settings.
    pub fn descriptor(&self) -> CameraDescriptor {
        CameraDescriptor::new(
            self.camera.clone(),
            self.lens,
            self.resolutions
                .iter()
                .map(|[width, height]| Resolution::new(*width, *height))
                .collect(),
        )
        .with_orientation(self.orientation)
    }

    /// Validates the session settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.camera.trim().is_empty() {
            return Err(ConfigError::MissingCamera);
        }
        if self.resolutions.is_empty() {
            return Err(ConfigError::NoResolutions);
        }
        if self.resolutions.iter().any(|[w, h]| *w == 0 || *h == 0) {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.orientation % 90 != 0 || self.orientation >= 360 {
            return Err(ConfigError::InvalidOrientation(self.orientation));
        }
        Ok(())
    }
}

/// Mock camera behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MockSettings {
    /// Frames per second while streaming.
    pub fps: u32,
    /// Whether recordings can be paused.
    pub pause_resume: bool,
    /// Whether stills can be taken while recording.
    pub still_during_recording: bool,
}

impl Default for MockSettings {
    fn default() -> Self {
        Self {
            fps: 30,
            pause_resume: true,
            still_during_recording: true,
        }
    }
}

impl MockSettings {
    /// Mock backend configuration.
    pub fn to_mock_config(&self) -> MockConfig {
        MockConfig {
            fps: self.fps,
            capabilities: DriverCapabilities {
                pause_resume: self.pause_resume,
                still_during_recording: self.still_during_recording,
            },
            format: ImageFormat::Yuv420,
        }
    }

    /// Validates the mock settings.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.fps == 0 || self.fps > MAX_MOCK_FPS {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Output configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory stills and recordings are written to.
    pub dir: PathBuf,
    /// Frames to stream before stopping.
    pub stream_frames: u32,
    /// Metrics server port (0 to disable).
    pub metrics_port: u16,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: std::env::temp_dir(),
            stream_frames: 60,
            metrics_port: 0,
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// No camera named.
    #[error("camera name must not be empty")]
    MissingCamera,
    /// The camera lists no sizes.
    #[error("at least one supported resolution is required")]
    NoResolutions,
    /// A listed size has a zero side.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Sensor orientation is not a quarter turn.
    #[error("invalid sensor orientation {0} (must be 0, 90, 180 or 270)")]
    InvalidOrientation(u16),
    /// Mock frame rate out of range.
    #[error("invalid frame rate (must be 1-240 fps)")]
    InvalidFrameRate,
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// `[session]` table.
    #[serde(default)]
    pub session: SessionConfig,
    /// `[mock]` table.
    #[serde(default)]
    pub mock: MockSettings,
    /// `[output]` table.
    #[serde(default)]
    pub output: OutputConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        let config: FileConfig =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every table.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()?;
        self.mock.validate()
    }
}
