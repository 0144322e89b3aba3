//! Camera descriptors and capture-quality presets.
//!
//! A descriptor is supplied by whoever enumerates cameras; the session
//! controller never queries hardware capabilities itself. Presets are
//! resolved against the descriptor exactly once, when a session opens.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A frame size in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Resolution {
    /// Creates a resolution from width and height.
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total number of pixels.
    #[inline]
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Which way the lens faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensDirection {
    /// Facing the user.
    Front,
    /// Facing away from the user.
    Back,
    /// Detachable or USB camera.
    External,
}

/// Identifies a physical camera and its static capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CameraDescriptor {
    /// Driver-level camera name or id.
    pub name: String,
    /// Lens facing.
    pub lens_direction: LensDirection,
    /// Clockwise sensor rotation in degrees (0, 90, 180 or 270).
    #[serde(default)]
    pub sensor_orientation: u16,
    /// Sizes the device can deliver for preview and recording.
    #[serde(default)]
    pub supported_resolutions: Vec<Resolution>,
}

impl CameraDescriptor {
    /// Creates a descriptor with no orientation offset.
    pub fn new(
        name: impl Into<String>,
        lens_direction: LensDirection,
        supported_resolutions: Vec<Resolution>,
    ) -> Self {
        Self {
            name: name.into(),
            lens_direction,
            sensor_orientation: 0,
            supported_resolutions,
        }
    }

    /// Sets the sensor orientation.
    pub fn with_orientation(mut self, degrees: u16) -> Self {
        self.sensor_orientation = degrees;
        self
    }

    /// Returns true if the device reports exactly this size.
    pub fn supports(&self, resolution: Resolution) -> bool {
        self.supported_resolutions.contains(&resolution)
    }

    /// Largest supported size by pixel area.
    pub fn largest_resolution(&self) -> Option<Resolution> {
        self.supported_resolutions
            .iter()
            .copied()
            .max_by_key(Resolution::area)
    }

    /// Smallest supported size by pixel area.
    pub fn smallest_resolution(&self) -> Option<Resolution> {
        self.supported_resolutions
            .iter()
            .copied()
            .min_by_key(Resolution::area)
    }
}

/// Capture-quality tier chosen when a session opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionPreset {
    /// 320x240.
    Low,
    /// 720x480.
    Medium,
    /// 1280x720.
    High,
    /// 1920x1080.
    VeryHigh,
    /// 3840x2160.
    UltraHigh,
    /// Largest size the device supports.
    Max,
}

impl ResolutionPreset {
    /// All tiers, lowest first.
    pub const ALL: [ResolutionPreset; 6] = [
        ResolutionPreset::Low,
        ResolutionPreset::Medium,
        ResolutionPreset::High,
        ResolutionPreset::VeryHigh,
        ResolutionPreset::UltraHigh,
        ResolutionPreset::Max,
    ];

    /// Nominal size of this tier. `Max` has none; it depends on the device.
    pub fn nominal(self) -> Option<Resolution> {
        match self {
            ResolutionPreset::Low => Some(Resolution::new(320, 240)),
            ResolutionPreset::Medium => Some(Resolution::new(720, 480)),
            ResolutionPreset::High => Some(Resolution::new(1280, 720)),
            ResolutionPreset::VeryHigh => Some(Resolution::new(1920, 1080)),
            ResolutionPreset::UltraHigh => Some(Resolution::new(3840, 2160)),
            ResolutionPreset::Max => None,
        }
    }

    /// Resolves this tier against a descriptor.
    ///
    /// Walks down from the requested tier until the device supports the
    /// nominal size, then falls back to the smallest supported size.
    /// Returns `None` only when the descriptor lists no sizes at all.
    pub fn resolve(self, descriptor: &CameraDescriptor) -> Option<Resolution> {
        if self == ResolutionPreset::Max {
            return descriptor.largest_resolution();
        }

        Self::ALL
            .iter()
            .rev()
            .filter(|tier| **tier <= self)
            .filter_map(|tier| tier.nominal())
            .find(|size| descriptor.supports(*size))
            .or_else(|| descriptor.smallest_resolution())
    }

    /// Wire name of the tier.
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionPreset::Low => "low",
            ResolutionPreset::Medium => "medium",
            ResolutionPreset::High => "high",
            ResolutionPreset::VeryHigh => "veryHigh",
            ResolutionPreset::UltraHigh => "ultraHigh",
            ResolutionPreset::Max => "max",
        }
    }
}

impl fmt::Display for ResolutionPreset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown preset name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown resolution preset: {0}")]
pub struct UnknownPreset(pub String);

impl FromStr for ResolutionPreset {
    type Err = UnknownPreset;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "low" => Ok(ResolutionPreset::Low),
            "medium" => Ok(ResolutionPreset::Medium),
            "high" => Ok(ResolutionPreset::High),
            "veryhigh" => Ok(ResolutionPreset::VeryHigh),
            "ultrahigh" => Ok(ResolutionPreset::UltraHigh),
            "max" => Ok(ResolutionPreset::Max),
            _ => Err(UnknownPreset(s.to_string())),
        }
    }
}
