//! Crop-preparation pipeline components.
//!
//! This module contains the stages that turn a captured page into what the
//! crop screen needs:
//! - **decode**: Load captured pages from disk or memory
//! - **blur**: Score sharpness and build a diagnostic map
//! - **scaler**: Fit the page inside the display area
//! - **display**: Convert the scaled page into a presentable bitmap
//! - **cancel**: Cooperative cancellation and checkpoints
//! - **sink**: Delivery of finished results
//! - **task**: The cancellable background task tying the stages together

pub mod blur;
pub mod cancel;
pub mod decode;
pub mod display;
pub mod scaler;
pub mod sink;
pub mod task;

// Re-exports for convenient access
pub use blur::{BlurDetector, SENTINEL_SHARPNESS};
pub use cancel::{CancellationToken, Checkpoint};
pub use decode::{format_name, DecodedPage, PageDecoder};
pub use display::{DisplayBitmap, DisplayConverter};
pub use scaler::{fit_factor, scaled_dimensions, ImageScaler};
pub use sink::ResultSink;
pub use task::{Canceller, CropPreparationTask, TaskHandle, TaskOutcome, TaskState};
