//! Sub-configuration structs with defaults tuned for phone-camera page captures.

use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where the CLI writes display and diagnostic images
    pub output_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("~/.pageprep/out"),
        }
    }
}

/// Resampling filter used when scaling a page for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResampleFilter {
    /// Nearest neighbour, fastest, blocky
    Nearest,
    /// Bilinear
    #[default]
    Triangle,
    /// Bicubic
    CatmullRom,
    /// Gaussian
    Gaussian,
    /// Lanczos with window 3, sharpest and slowest
    Lanczos3,
    /// Area averaging (box integration over the source footprint)
    Area,
}

impl ResampleFilter {
    /// The `image` crate filter backing this choice.
    ///
    /// Returns `None` for [`ResampleFilter::Area`], which goes through the
    /// thumbnail path instead of `resize`.
    pub fn filter_type(self) -> Option<FilterType> {
        match self {
            Self::Nearest => Some(FilterType::Nearest),
            Self::Triangle => Some(FilterType::Triangle),
            Self::CatmullRom => Some(FilterType::CatmullRom),
            Self::Gaussian => Some(FilterType::Gaussian),
            Self::Lanczos3 => Some(FilterType::Lanczos3),
            Self::Area => None,
        }
    }
}

/// Display scaling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScalingConfig {
    /// Resampling filter
    pub filter: ResampleFilter,

    /// Allow sources smaller than the target box to be enlarged.
    /// Off by default: the factor is capped at 1.0.
    pub allow_upscale: bool,
}

impl Default for ScalingConfig {
    fn default() -> Self {
        Self {
            filter: ResampleFilter::Triangle,
            allow_upscale: false,
        }
    }
}

/// Blur detection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BlurConfig {
    /// Longest edge of the luma image the Laplacian runs on
    pub analysis_max_dimension: u32,

    /// Tiles per axis when locating the blurriest region
    pub grid_size: u32,

    /// Sharpness below this is reported as medium blur
    pub medium_blur_threshold: f64,

    /// Sharpness below this is reported as strong blur
    pub strong_blur_threshold: f64,
}

impl Default for BlurConfig {
    fn default() -> Self {
        Self {
            analysis_max_dimension: 512,
            grid_size: 4,
            medium_blur_threshold: 120.0,
            strong_blur_threshold: 40.0,
        }
    }
}

/// Resource limits to protect against problematic inputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Maximum file size in megabytes
    pub max_file_size_mb: u64,

    /// Maximum decoded image dimension (width or height)
    pub max_image_dimension: u32,

    /// Maximum pixel count of any buffer the pipeline allocates
    pub max_buffer_pixels: u64,

    /// Decode timeout in milliseconds
    pub decode_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_file_size_mb: 100,
            max_image_dimension: 20000,
            max_buffer_pixels: 64_000_000,
            decode_timeout_ms: 10000,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
