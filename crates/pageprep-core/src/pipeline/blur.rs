//! Blur detection on captured pages.
//!
//! Sharpness is the variance of the 4-neighbour Laplacian over a downsampled
//! luma copy of the page. Text on a focused page produces strong second
//! derivatives at every glyph edge; defocus or shake smooths them out and the
//! variance collapses. The absolute Laplacian response doubles as the
//! diagnostic image, and the page is tiled to find the least sharp region.

use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, GrayImage, Luma};

use crate::buffer::{BufferRole, ImageBuffer};
use crate::config::BlurConfig;
use crate::types::{BlurDetectionResult, BlurVerdict, CropRect};

/// Score reported when there is nothing to measure.
pub const SENTINEL_SHARPNESS: f64 = 0.0;

/// Smallest analysis edge the 3x3 kernel can run on.
const MIN_ANALYSIS_EDGE: u32 = 3;

/// Largest tile grid per axis, matching config validation.
const MAX_GRID_SIZE: u32 = 64;

/// Computes a sharpness score and a diagnostic map for a page.
pub struct BlurDetector {
    config: BlurConfig,
}

impl BlurDetector {
    /// Create a new detector with the given configuration.
    ///
    /// `grid_size` is clamped to `1..=64` so an unvalidated config cannot
    /// overflow the tile table.
    pub fn new(mut config: BlurConfig) -> Self {
        config.grid_size = config.grid_size.clamp(1, MAX_GRID_SIZE);
        config.analysis_max_dimension = config.analysis_max_dimension.max(MIN_ANALYSIS_EDGE);
        Self { config }
    }

    /// Measure how sharp `source` is.
    ///
    /// Never fails: an empty or tiny source yields [`SENTINEL_SHARPNESS`], a
    /// strong-blur verdict and an empty diagnostic buffer. The source is only
    /// read.
    pub fn detect(&self, source: &ImageBuffer) -> BlurDetectionResult {
        if source.is_empty() {
            return self.sentinel(source, "empty source");
        }

        let luma = self.analysis_image(source.image());
        let (width, height) = luma.dimensions();
        if width < 3 || height < 3 {
            return self.sentinel(source, "source too small for a 3x3 kernel");
        }

        let map = laplacian(&luma, self.config.grid_size);
        let sharpness = map.global.variance();
        let verdict = BlurVerdict::classify(sharpness, &self.config);

        let scale_x = f64::from(source.width()) / f64::from(width);
        let scale_y = f64::from(source.height()) / f64::from(height);
        let blurriest_region = map.blurriest_tile().map(|tile| {
            CropRect::new(
                tile.x * scale_x,
                tile.y * scale_y,
                tile.width * scale_x,
                tile.height * scale_y,
            )
            .clamp_to(source.width(), source.height())
        });

        tracing::debug!(
            "Blur detection on {}x{} (analysed at {}x{}): sharpness {:.2}, {:?}",
            source.width(),
            source.height(),
            width,
            height,
            sharpness,
            verdict
        );

        BlurDetectionResult {
            sharpness,
            verdict,
            diagnostic: source.derive(DynamicImage::ImageLuma8(map.response), BufferRole::Diagnostic),
            blurriest_region,
        }
    }

    /// Luma copy no larger than `analysis_max_dimension` on its longest edge.
    fn analysis_image(&self, image: &DynamicImage) -> GrayImage {
        let (width, height) = image.dimensions();
        match analysis_dimensions(width, height, self.config.analysis_max_dimension) {
            Some((w, h)) => image.resize_exact(w, h, FilterType::Triangle).to_luma8(),
            None => image.to_luma8(),
        }
    }

    fn sentinel(&self, source: &ImageBuffer, reason: &str) -> BlurDetectionResult {
        tracing::warn!(
            width = source.width(),
            height = source.height(),
            "Blur detection skipped: {}",
            reason
        );
        BlurDetectionResult {
            sharpness: SENTINEL_SHARPNESS,
            verdict: BlurVerdict::classify(SENTINEL_SHARPNESS, &self.config),
            diagnostic: source.derive_empty(BufferRole::Diagnostic),
            blurriest_region: None,
        }
    }
}

/// Downsampled size for analysis, or `None` when the image already fits.
///
/// The aspect ratio is kept, except that a short edge never drops below
/// [`MIN_ANALYSIS_EDGE`] unless it was already that small.
fn analysis_dimensions(width: u32, height: u32, max: u32) -> Option<(u32, u32)> {
    let longest = width.max(height);
    if longest <= max {
        return None;
    }
    let ratio = f64::from(max) / f64::from(longest);
    let shrink = |edge: u32| {
        let scaled = (f64::from(edge) * ratio).round() as u32;
        scaled.clamp(MIN_ANALYSIS_EDGE.min(edge), edge)
    };
    Some((shrink(width), shrink(height)))
}

/// Running first and second moments of the Laplacian response.
#[derive(Debug, Default, Clone, Copy)]
struct Moments {
    sum: i64,
    sum_sq: i64,
    count: u64,
}

impl Moments {
    fn push(&mut self, value: i32) {
        let value = i64::from(value);
        self.sum += value;
        self.sum_sq += value * value;
        self.count += 1;
    }

    fn variance(&self) -> f64 {
        if self.count == 0 {
            return SENTINEL_SHARPNESS;
        }
        let n = self.count as f64;
        let mean = self.sum as f64 / n;
        let mean_sq = self.sum_sq as f64 / n;
        (mean_sq - mean * mean).max(0.0)
    }
}

struct LaplacianMap {
    response: GrayImage,
    global: Moments,
    tiles: Vec<Moments>,
    grid: u32,
}

impl LaplacianMap {
    /// Least sharp tile in analysis coordinates, first in row-major order on ties.
    fn blurriest_tile(&self) -> Option<CropRect> {
        let (width, height) = self.response.dimensions();
        let mut best: Option<(usize, f64)> = None;
        for (index, tile) in self.tiles.iter().enumerate() {
            if tile.count == 0 {
                continue;
            }
            let variance = tile.variance();
            if best.map_or(true, |(_, v)| variance < v) {
                best = Some((index, variance));
            }
        }

        best.map(|(index, _)| {
            let col = index as u32 % self.grid;
            let row = index as u32 / self.grid;
            let x0 = col * width / self.grid;
            let x1 = (col + 1) * width / self.grid;
            let y0 = row * height / self.grid;
            let y1 = (row + 1) * height / self.grid;
            CropRect::new(
                f64::from(x0),
                f64::from(y0),
                f64::from(x1 - x0),
                f64::from(y1 - y0),
            )
        })
    }
}

/// Apply the kernel `[[0, 1, 0], [1, -4, 1], [0, 1, 0]]` to every interior pixel.
fn laplacian(luma: &GrayImage, grid: u32) -> LaplacianMap {
    let (width, height) = luma.dimensions();
    let stride = width as usize;
    let data = luma.as_raw();
    let mut response = GrayImage::new(width, height);
    let mut global = Moments::default();
    let mut tiles = vec![Moments::default(); (grid * grid) as usize];

    for y in 1..height - 1 {
        let row = y as usize * stride;
        let tile_row = y * grid / height;
        for x in 1..width - 1 {
            let i = row + x as usize;
            let center = i32::from(data[i]);
            let lap = i32::from(data[i - stride])
                + i32::from(data[i + stride])
                + i32::from(data[i - 1])
                + i32::from(data[i + 1])
                - 4 * center;

            global.push(lap);
            let tile_col = x * grid / width;
            tiles[(tile_row * grid + tile_col) as usize].push(lap);
            response.put_pixel(x, y, Luma([lap.unsigned_abs().min(255) as u8]));
        }
    }

    LaplacianMap {
        response,
        global,
        tiles,
        grid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferLedger;

    fn detector() -> BlurDetector {
        BlurDetector::new(BlurConfig::default())
    }

    fn checkerboard(width: u32, height: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x + y) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        })
    }

    #[test]
    fn test_flat_image_is_strongly_blurred() {
        let flat = GrayImage::from_pixel(64, 64, Luma([128]));
        let result = detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(flat)));
        assert!(result.sharpness.abs() < 1e-9);
        assert_eq!(result.verdict, BlurVerdict::StrongBlur);
    }

    #[test]
    fn test_smooth_ramp_scores_zero() {
        let ramp = GrayImage::from_fn(64, 64, |x, _| Luma([(x * 4) as u8]));
        let result = detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(ramp)));
        assert!(result.sharpness < 1.0);
        assert!(result.verdict.is_blurred());
    }

    #[test]
    fn test_high_frequency_detail_is_sharp() {
        let result =
            detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(checkerboard(64, 64))));
        assert!(result.sharpness > BlurConfig::default().medium_blur_threshold);
        assert_eq!(result.verdict, BlurVerdict::Sharp);
    }

    #[test]
    fn test_deterministic() {
        let source = ImageBuffer::new(DynamicImage::ImageLuma8(checkerboard(40, 30)));
        let a = detector().detect(&source);
        let b = detector().detect(&source);
        assert_eq!(a.sharpness, b.sharpness);
        assert_eq!(a.blurriest_region, b.blurriest_region);
    }

    #[test]
    fn test_diagnostic_is_downsampled_and_independent() {
        let ledger = BufferLedger::new();
        let source = ImageBuffer::tracked(DynamicImage::new_rgb8(2048, 1024), &ledger);
        let result = detector().detect(&source);

        assert_eq!(result.diagnostic.dimensions(), (512, 256));
        assert_eq!(result.diagnostic.role(), BufferRole::Diagnostic);
        assert_eq!(ledger.live(), 2);

        drop(source);
        assert_eq!(result.diagnostic.width(), 512);
        result.release();
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_blurriest_region_finds_flat_half() {
        let image = GrayImage::from_fn(64, 64, |x, y| {
            if x < 32 && (x + y) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let result = detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(image)));
        let region = result.blurriest_region.unwrap();
        assert!(region.x >= 32.0);
        assert_eq!(region.width, 16.0);
    }

    #[test]
    fn test_region_mapped_to_source_coordinates() {
        // 8px blocks survive the 2x downsample to analysis resolution.
        let image = GrayImage::from_fn(1024, 1024, |x, y| {
            if x < 512 && (x / 8 + y / 8) % 2 == 0 {
                Luma([255])
            } else {
                Luma([0])
            }
        });
        let result = detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(image)));
        let region = result.blurriest_region.unwrap();
        assert!(region.x >= 512.0);
        assert!(region.right() <= 1024.0);
    }

    #[test]
    fn test_analysis_dimensions() {
        assert_eq!(analysis_dimensions(400, 300, 512), None);
        assert_eq!(analysis_dimensions(2048, 1024, 512), Some((512, 256)));
        assert_eq!(analysis_dimensions(4000, 10, 512), Some((512, 3)));
        assert_eq!(analysis_dimensions(4000, 2, 512), Some((512, 2)));
    }

    #[test]
    fn test_thin_sharp_strip_is_measured() {
        // 64px columns survive the ~8x horizontal downsample as hard edges.
        let strip = GrayImage::from_fn(4000, 10, |x, _| {
            if (x / 64) % 2 == 0 {
                Luma([0])
            } else {
                Luma([255])
            }
        });
        let result = detector().detect(&ImageBuffer::new(DynamicImage::ImageLuma8(strip)));

        assert_eq!(result.diagnostic.dimensions(), (512, 3));
        assert!(result.sharpness > BlurConfig::default().strong_blur_threshold);
        assert_ne!(result.verdict, BlurVerdict::StrongBlur);
    }

    #[test]
    fn test_oversized_grid_is_clamped() {
        let detector = BlurDetector::new(BlurConfig {
            grid_size: 70_000,
            ..BlurConfig::default()
        });
        assert_eq!(detector.config.grid_size, MAX_GRID_SIZE);

        let result =
            detector.detect(&ImageBuffer::new(DynamicImage::ImageLuma8(checkerboard(128, 128))));
        assert_eq!(result.verdict, BlurVerdict::Sharp);
        assert!(result.blurriest_region.is_some());
    }

    #[test]
    fn test_empty_source_returns_sentinel() {
        let result = detector().detect(&ImageBuffer::new(DynamicImage::new_luma8(0, 0)));
        assert_eq!(result.sharpness, SENTINEL_SHARPNESS);
        assert_eq!(result.verdict, BlurVerdict::StrongBlur);
        assert!(result.diagnostic.is_empty());
        assert!(result.blurriest_region.is_none());
    }

    #[test]
    fn test_tiny_source_returns_sentinel() {
        let result = detector().detect(&ImageBuffer::new(DynamicImage::new_luma8(2, 50)));
        assert_eq!(result.sharpness, SENTINEL_SHARPNESS);
        assert!(result.diagnostic.is_empty());
    }
}
