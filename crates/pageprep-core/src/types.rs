//! Core data types for the crop-preparation pipeline.
//!
//! These types carry the output of each stage: the scaled page with the
//! metadata needed to map display coordinates back to the capture, the blur
//! analysis, and the packaged result handed to the consumer.

use serde::{Deserialize, Serialize};

use crate::buffer::ImageBuffer;
use crate::config::BlurConfig;
use crate::pipeline::display::DisplayBitmap;

/// An axis-aligned rectangle in pixel space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Intersect with the image rectangle `0..width` x `0..height`.
    pub fn clamp_to(&self, width: u32, height: u32) -> Self {
        let (w, h) = (f64::from(width), f64::from(height));
        let left = self.x.clamp(0.0, w);
        let top = self.y.clamp(0.0, h);
        let right = self.right().clamp(0.0, w);
        let bottom = self.bottom().clamp(0.0, h);
        Self {
            x: left,
            y: top,
            width: (right - left).max(0.0),
            height: (bottom - top).max(0.0),
        }
    }
}

/// A display-fit copy of the source plus the factors to invert the fit.
#[derive(Debug)]
pub struct ScaleResult {
    buffer: ImageBuffer,
    factor: f64,
    source_width: u32,
    source_height: u32,
}

impl ScaleResult {
    pub(crate) fn new(buffer: ImageBuffer, factor: f64, source_width: u32, source_height: u32) -> Self {
        debug_assert!(factor > 0.0);
        Self {
            buffer,
            factor,
            source_width,
            source_height,
        }
    }

    /// The scaled pixels.
    pub fn buffer(&self) -> &ImageBuffer {
        &self.buffer
    }

    /// Uniform factor that was requested from the fit (`scaled = source * factor`).
    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Multiplier taking display lengths back to source lengths.
    pub fn inverse_factor(&self) -> f64 {
        1.0 / self.factor
    }

    /// Effective horizontal factor after rounding to whole pixels.
    pub fn scale_x(&self) -> f64 {
        if self.source_width == 0 || self.buffer.width() == 0 {
            return self.factor;
        }
        f64::from(self.buffer.width()) / f64::from(self.source_width)
    }

    /// Effective vertical factor after rounding to whole pixels.
    pub fn scale_y(&self) -> f64 {
        if self.source_height == 0 || self.buffer.height() == 0 {
            return self.factor;
        }
        f64::from(self.buffer.height()) / f64::from(self.source_height)
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    pub fn scaled_dimensions(&self) -> (u32, u32) {
        self.buffer.dimensions()
    }

    /// Map a point on the scaled image to full-resolution source coordinates.
    pub fn to_source_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x / self.scale_x(), y / self.scale_y())
    }

    /// Map a source point onto the scaled image.
    pub fn to_display_point(&self, x: f64, y: f64) -> (f64, f64) {
        (x * self.scale_x(), y * self.scale_y())
    }

    /// Map a crop rectangle drawn on the scaled image to the source, clamped
    /// to the source bounds.
    pub fn to_source_rect(&self, rect: CropRect) -> CropRect {
        let (left, top) = self.to_source_point(rect.x, rect.y);
        let (right, bottom) = self.to_source_point(rect.right(), rect.bottom());
        CropRect::new(left, top, right - left, bottom - top)
            .clamp_to(self.source_width, self.source_height)
    }

    pub fn release(self) {
        self.buffer.release();
    }
}

/// Coarse classification of the sharpness score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlurVerdict {
    Sharp,
    MediumBlur,
    StrongBlur,
}

impl BlurVerdict {
    /// Classify a sharpness score against the configured thresholds.
    pub fn classify(sharpness: f64, config: &BlurConfig) -> Self {
        if sharpness < config.strong_blur_threshold {
            Self::StrongBlur
        } else if sharpness < config.medium_blur_threshold {
            Self::MediumBlur
        } else {
            Self::Sharp
        }
    }

    /// Whether the user should be warned about this capture.
    pub fn is_blurred(self) -> bool {
        !matches!(self, Self::Sharp)
    }
}

/// Output of the blur detector.
#[derive(Debug)]
pub struct BlurDetectionResult {
    /// Variance of the Laplacian response; lower is blurrier
    pub sharpness: f64,

    /// Classification of `sharpness`
    pub verdict: BlurVerdict,

    /// Laplacian magnitude map at analysis resolution, owned independently
    /// of the source
    pub diagnostic: ImageBuffer,

    /// Least sharp grid tile, in source coordinates
    pub blurriest_region: Option<CropRect>,
}

impl BlurDetectionResult {
    pub fn release(self) {
        self.diagnostic.release();
    }
}

/// Everything the crop screen needs, handed over on task completion.
///
/// The consumer owns all three buffers once it receives this value.
#[derive(Debug)]
pub struct CropPreparationResult {
    pub display: DisplayBitmap,
    pub scale: ScaleResult,
    pub blur: BlurDetectionResult,
}

impl CropPreparationResult {
    /// Release every buffer the result owns.
    pub fn release(self) {
        self.display.release();
        self.scale.release();
        self.blur.release();
    }

    /// Build a serializable summary for reports.
    pub fn summary(&self) -> PreparationSummary {
        let (source_width, source_height) = self.scale.source_dimensions();
        PreparationSummary {
            source_width,
            source_height,
            display_width: self.display.width(),
            display_height: self.display.height(),
            scale_factor: self.scale.factor(),
            inverse_scale_factor: self.scale.inverse_factor(),
            sharpness: self.blur.sharpness,
            verdict: self.blur.verdict,
            blurriest_region: self.blur.blurriest_region,
            display_png: None,
        }
    }
}

/// Serializable summary of a completed preparation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreparationSummary {
    pub source_width: u32,
    pub source_height: u32,
    pub display_width: u32,
    pub display_height: u32,
    pub scale_factor: f64,
    pub inverse_scale_factor: f64,
    pub sharpness: f64,
    pub verdict: BlurVerdict,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub blurriest_region: Option<CropRect>,

    /// Base64-encoded PNG of the display bitmap
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_png: Option<String>,
}
