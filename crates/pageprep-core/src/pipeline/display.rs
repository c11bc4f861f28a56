//! Conversion of scaled pages into bitmaps a UI can present directly.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, GenericImageView, RgbaImage};

use crate::buffer::{BufferRole, ImageBuffer};
use crate::error::PipelineError;
use crate::types::ScaleResult;

/// An RGBA8 bitmap ready for presentation.
#[derive(Debug)]
pub struct DisplayBitmap {
    buffer: ImageBuffer,
}

impl DisplayBitmap {
    pub fn width(&self) -> u32 {
        self.buffer.width()
    }

    pub fn height(&self) -> u32 {
        self.buffer.height()
    }

    pub fn buffer(&self) -> &ImageBuffer {
        &self.buffer
    }

    /// Raw RGBA bytes, row-major, four bytes per pixel.
    pub fn as_rgba(&self) -> &[u8] {
        self.buffer.image().as_bytes()
    }

    /// Encode as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        self.buffer.to_png_bytes()
    }

    /// Encode as PNG and return it base64-encoded, for embedding in JSON.
    pub fn to_png_base64(&self) -> Result<String, PipelineError> {
        Ok(BASE64.encode(self.to_png_bytes()?))
    }

    pub fn release(self) {
        self.buffer.release();
    }
}

/// Turns a scale result into a [`DisplayBitmap`].
pub struct DisplayConverter;

impl DisplayConverter {
    /// Copy the scaled pixels into freshly allocated RGBA8 storage.
    ///
    /// The storage is reserved fallibly so an out-of-memory condition fails
    /// this task instead of aborting the process.
    pub fn convert(scaled: &ScaleResult) -> Result<DisplayBitmap, PipelineError> {
        let source = scaled.buffer();
        let (width, height) = source.dimensions();
        let bytes = width as usize * height as usize * 4;

        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(bytes)
            .map_err(|_| PipelineError::Allocation {
                stage: "display".to_string(),
                bytes,
            })?;

        match source.image() {
            DynamicImage::ImageRgba8(rgba) => pixels.extend_from_slice(rgba.as_raw()),
            other => {
                for (_, _, pixel) in other.pixels() {
                    pixels.extend_from_slice(&pixel.0);
                }
            }
        }

        let rgba = RgbaImage::from_raw(width, height, pixels).ok_or_else(|| {
            PipelineError::Encode(format!("display buffer does not match {width}x{height}"))
        })?;

        Ok(DisplayBitmap {
            buffer: source.derive(DynamicImage::ImageRgba8(rgba), BufferRole::Display),
        })
    }
}
