//! Fit a captured page inside a display box, preserving aspect ratio.

use crate::buffer::{BufferRole, ImageBuffer};
use crate::config::{LimitsConfig, ScalingConfig};
use crate::error::PipelineError;
use crate::types::ScaleResult;

/// Computes display-fit factors and produces scaled copies of a source.
pub struct ImageScaler {
    config: ScalingConfig,
    limits: LimitsConfig,
}

impl ImageScaler {
    /// Create a new scaler with the given configuration.
    pub fn new(config: ScalingConfig, limits: LimitsConfig) -> Self {
        Self { config, limits }
    }

    /// Scale `source` to fit inside `target_width` x `target_height`.
    ///
    /// Zero targets are clamped to 1. A degenerate source yields an empty
    /// buffer with factor 1.0. The source is left untouched and still owned
    /// by the caller.
    pub fn scale(
        &self,
        source: &ImageBuffer,
        target_width: u32,
        target_height: u32,
    ) -> Result<ScaleResult, PipelineError> {
        let (source_width, source_height) = source.dimensions();
        let (target_width, target_height) = clamp_target(target_width, target_height);

        if source.is_empty() {
            tracing::warn!(
                source_width,
                source_height,
                "Scaling a degenerate source, returning empty buffer"
            );
            return Ok(ScaleResult::new(
                source.derive_empty(BufferRole::Scaled),
                1.0,
                source_width,
                source_height,
            ));
        }

        let factor = fit_factor(
            (source_width, source_height),
            (target_width, target_height),
            self.config.allow_upscale,
        );
        let (width, height) = scaled_dimensions(
            (source_width, source_height),
            (target_width, target_height),
            factor,
        );

        let pixels = u64::from(width) * u64::from(height);
        if pixels > self.limits.max_buffer_pixels {
            return Err(PipelineError::BufferTooLarge {
                width,
                height,
                max_pixels: self.limits.max_buffer_pixels,
            });
        }

        tracing::debug!(
            "Scaling {}x{} -> {}x{} (factor {:.4}, filter {:?})",
            source_width,
            source_height,
            width,
            height,
            factor,
            self.config.filter
        );

        let image = if (width, height) == (source_width, source_height) {
            source.image().clone()
        } else {
            match self.config.filter.filter_type() {
                Some(filter) => source.image().resize_exact(width, height, filter),
                None => source.image().thumbnail_exact(width, height),
            }
        };

        Ok(ScaleResult::new(
            source.derive(image, BufferRole::Scaled),
            factor,
            source_width,
            source_height,
        ))
    }
}

/// Zero is not a usable bound; clamp it to one pixel.
fn clamp_target(target_width: u32, target_height: u32) -> (u32, u32) {
    if target_width == 0 || target_height == 0 {
        tracing::warn!(
            target_width,
            target_height,
            "Scaling to a zero target, clamping to 1"
        );
    }
    (target_width.max(1), target_height.max(1))
}

/// Uniform factor that fits `source` entirely inside `target`.
pub fn fit_factor(source: (u32, u32), target: (u32, u32), allow_upscale: bool) -> f64 {
    let (source_width, source_height) = source;
    let (target_width, target_height) = target;
    if source_width == 0 || source_height == 0 {
        return 1.0;
    }

    let factor_x = f64::from(target_width) / f64::from(source_width);
    let factor_y = f64::from(target_height) / f64::from(source_height);
    let factor = factor_x.min(factor_y);

    if allow_upscale {
        factor
    } else {
        factor.min(1.0)
    }
}

/// Whole-pixel output size for `factor`, never exceeding the target box and
/// never collapsing below one pixel.
pub fn scaled_dimensions(source: (u32, u32), target: (u32, u32), factor: f64) -> (u32, u32) {
    let width = (f64::from(source.0) * factor).round() as u32;
    let height = (f64::from(source.1) * factor).round() as u32;
    (
        width.clamp(1, target.0.max(1)),
        height.clamp(1, target.1.max(1)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLedger;
    use crate::config::ResampleFilter;
    use image::DynamicImage;

    fn scaler() -> ImageScaler {
        ImageScaler::new(ScalingConfig::default(), LimitsConfig::default())
    }

    fn source(width: u32, height: u32) -> ImageBuffer {
        ImageBuffer::new(DynamicImage::new_rgb8(width, height))
    }

    #[test]
    fn test_fit_limited_by_height() {
        let result = scaler().scale(&source(3000, 4000), 800, 600).unwrap();
        assert_eq!(result.scaled_dimensions(), (450, 600));
        assert!((result.factor() - 0.15).abs() < 1e-9);
        assert!((result.scale_x() - result.scale_y()).abs() < 1e-9);
    }

    #[test]
    fn test_exact_fit_keeps_dimensions() {
        let result = scaler().scale(&source(800, 600), 800, 600).unwrap();
        assert_eq!(result.scaled_dimensions(), (800, 600));
        assert_eq!(result.factor(), 1.0);
    }

    #[test]
    fn test_no_upscale_by_default() {
        let result = scaler().scale(&source(400, 300), 800, 600).unwrap();
        assert_eq!(result.scaled_dimensions(), (400, 300));
        assert_eq!(result.factor(), 1.0);
    }

    #[test]
    fn test_upscale_when_allowed() {
        let config = ScalingConfig {
            allow_upscale: true,
            ..ScalingConfig::default()
        };
        let scaler = ImageScaler::new(config, LimitsConfig::default());
        let result = scaler.scale(&source(400, 300), 800, 600).unwrap();
        assert_eq!(result.scaled_dimensions(), (800, 600));
        assert!((result.factor() - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_target_is_clamped() {
        let result = scaler().scale(&source(3000, 4000), 0, 600).unwrap();
        assert_eq!(result.scaled_dimensions(), (1, 1));
        assert!(result.factor() > 0.0);
    }

    #[test]
    fn test_degenerate_source_returns_empty_buffer() {
        let result = scaler().scale(&source(0, 10), 800, 600).unwrap();
        assert!(result.buffer().is_empty());
        assert_eq!(result.factor(), 1.0);
    }

    #[test]
    fn test_output_fits_and_keeps_aspect() {
        let cases = [
            ((3000, 4000), (800, 600)),
            ((4000, 3000), (1080, 1920)),
            ((1234, 987), (333, 777)),
            ((5000, 10), (100, 100)),
            ((17, 4096), (640, 480)),
        ];
        for (src, target) in cases {
            let result = scaler().scale(&source(src.0, src.1), target.0, target.1).unwrap();
            let (w, h) = result.scaled_dimensions();
            assert!(w <= target.0 && h <= target.1, "{src:?} -> {target:?} gave {w}x{h}");

            // Rounding to whole pixels moves each side by at most half a pixel.
            let expected_w = f64::from(src.0) * result.factor();
            let expected_h = f64::from(src.1) * result.factor();
            assert!((f64::from(w) - expected_w).abs() <= 0.5 || w == 1);
            assert!((f64::from(h) - expected_h).abs() <= 0.5 || h == 1);
        }
    }

    #[test]
    fn test_area_filter() {
        let config = ScalingConfig {
            filter: ResampleFilter::Area,
            ..ScalingConfig::default()
        };
        let scaler = ImageScaler::new(config, LimitsConfig::default());
        let result = scaler.scale(&source(1000, 500), 100, 100).unwrap();
        assert_eq!(result.scaled_dimensions(), (100, 50));
    }

    #[test]
    fn test_pixel_budget_enforced() {
        let limits = LimitsConfig {
            max_buffer_pixels: 100,
            ..LimitsConfig::default()
        };
        let scaler = ImageScaler::new(ScalingConfig::default(), limits);
        let err = scaler.scale(&source(200, 200), 50, 50).unwrap_err();
        assert!(matches!(err, PipelineError::BufferTooLarge { .. }));
    }

    #[test]
    fn test_scaled_buffer_is_tracked_and_source_untouched() {
        let ledger = BufferLedger::new();
        let src = ImageBuffer::tracked(DynamicImage::new_rgb8(100, 100), &ledger);
        let result = scaler().scale(&src, 10, 10).unwrap();

        assert_eq!(ledger.allocated_for(BufferRole::Scaled), 1);
        assert_eq!(src.dimensions(), (100, 100));
        assert_eq!(result.buffer().role(), BufferRole::Scaled);

        result.release();
        assert_eq!(ledger.live(), 1);
    }
}
