//! Benchmarks for the crop-preparation pipeline.
//!
//! Run with: cargo bench -p pageprep-core

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use pageprep_core::config::{BlurConfig, Config, LimitsConfig, ScalingConfig};
use pageprep_core::pipeline::{
    BlurDetector, CropPreparationTask, DisplayConverter, ImageScaler, PageDecoder, ResultSink,
};
use pageprep_core::ImageBuffer;

/// A page-sized image with text-like horizontal strokes.
fn page(width: u32, height: u32) -> ImageBuffer {
    let image = GrayImage::from_fn(width, height, |x, y| {
        if (y / 6) % 4 == 0 && (x / 9) % 3 != 0 {
            Luma([20])
        } else {
            Luma([235])
        }
    });
    ImageBuffer::new(DynamicImage::ImageLuma8(image))
}

fn benchmark_blur_detection(c: &mut Criterion) {
    let source = page(2480, 3508);
    let detector = BlurDetector::new(BlurConfig::default());

    c.bench_function("blur_detect_a4_300dpi", |b| {
        b.iter(|| detector.detect(black_box(&source)).release())
    });
}

fn benchmark_scaling(c: &mut Criterion) {
    let source = page(2480, 3508);
    let scaler = ImageScaler::new(ScalingConfig::default(), LimitsConfig::default());

    c.bench_function("scale_a4_to_1080x1920", |b| {
        b.iter(|| {
            if let Ok(scaled) = scaler.scale(black_box(&source), 1080, 1920) {
                scaled.release();
            }
        })
    });
}

fn benchmark_display_conversion(c: &mut Criterion) {
    let source = page(2480, 3508);
    let scaler = ImageScaler::new(ScalingConfig::default(), LimitsConfig::default());
    let Ok(scaled) = scaler.scale(&source, 1080, 1920) else {
        eprintln!("Skipping display benchmark: scaling failed");
        return;
    };

    c.bench_function("display_convert_1080", |b| {
        b.iter(|| {
            if let Ok(bitmap) = DisplayConverter::convert(black_box(&scaled)) {
                bitmap.release();
            }
        })
    });
}

fn benchmark_full_task(c: &mut Criterion) {
    let source = page(2480, 3508).into_shared();
    let config = Config::default();

    c.bench_function("crop_preparation_task", |b| {
        b.iter(|| {
            let task = CropPreparationTask::new(source.clone(), 1080, 1920, &config);
            task.run(ResultSink::callback(|result| result.release()))
        })
    });
}

fn benchmark_decode(c: &mut Criterion) {
    let mut encoded = std::io::Cursor::new(Vec::new());
    if page(1240, 1754)
        .image()
        .write_to(&mut encoded, image::ImageFormat::Png)
        .is_err()
    {
        eprintln!("Skipping decode benchmark: fixture encoding failed");
        return;
    }
    let bytes = encoded.into_inner();

    let decoder = PageDecoder::new(LimitsConfig::default());
    let rt = tokio::runtime::Runtime::new().unwrap();
    let path = std::path::Path::new("page.png");

    c.bench_function("decode_png_page", |b| {
        b.iter(|| {
            let _ = rt.block_on(decoder.decode_bytes(black_box(bytes.clone()), path));
        })
    });
}

criterion_group!(
    benches,
    benchmark_blur_detection,
    benchmark_scaling,
    benchmark_display_conversion,
    benchmark_full_task,
    benchmark_decode,
);
criterion_main!(benches);
