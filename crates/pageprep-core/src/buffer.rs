//! Owned pixel buffers and allocation accounting.
//!
//! Every buffer the pipeline produces is an [`ImageBuffer`] with exactly one
//! owner. Releasing consumes the buffer, so a double release or a use after
//! release does not compile. Buffers that are dropped without an explicit
//! [`ImageBuffer::release`] are released by `Drop`.
//!
//! A [`BufferLedger`] can be attached to a source buffer. Every buffer derived
//! from it reports its allocation and release to the same ledger, which is how
//! tests prove a cancelled task leaves nothing behind.

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{DynamicImage, GenericImageView, ImageFormat};

use crate::error::PipelineError;

/// Reference-counted handle to a read-only source buffer.
///
/// The caller keeps one clone for the later full-resolution crop while the
/// preparation task holds another for the duration of its run.
pub type SharedImage = Arc<ImageBuffer>;

/// Pixel layout of a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    GrayAlpha8,
    Rgb8,
    Rgba8,
    /// 16-bit or floating point layouts
    Other,
}

impl PixelFormat {
    fn of(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(_) => Self::Gray8,
            DynamicImage::ImageLumaA8(_) => Self::GrayAlpha8,
            DynamicImage::ImageRgb8(_) => Self::Rgb8,
            DynamicImage::ImageRgba8(_) => Self::Rgba8,
            _ => Self::Other,
        }
    }
}

/// What a buffer is used for in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferRole {
    /// Full-resolution capture supplied by the caller
    Source,
    /// Blur detector output for visualization
    Diagnostic,
    /// Display-fit copy of the source
    Scaled,
    /// RGBA bitmap ready for presentation
    Display,
}

impl BufferRole {
    const COUNT: usize = 4;

    fn index(self) -> usize {
        match self {
            Self::Source => 0,
            Self::Diagnostic => 1,
            Self::Scaled => 2,
            Self::Display => 3,
        }
    }
}

/// Thread-safe allocation counters shared by a family of buffers.
#[derive(Debug, Default)]
pub struct BufferLedger {
    allocated: AtomicUsize,
    released: AtomicUsize,
    by_role: [AtomicUsize; BufferRole::COUNT],
}

impl BufferLedger {
    /// Create an empty ledger ready to be attached to a source buffer.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Total buffers ever allocated against this ledger.
    pub fn allocated(&self) -> usize {
        self.allocated.load(Ordering::SeqCst)
    }

    /// Total buffers released.
    pub fn released(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }

    /// Buffers currently alive.
    pub fn live(&self) -> usize {
        self.allocated().saturating_sub(self.released())
    }

    /// Buffers ever allocated with the given role.
    pub fn allocated_for(&self, role: BufferRole) -> usize {
        self.by_role[role.index()].load(Ordering::SeqCst)
    }

    fn record_allocation(&self, role: BufferRole) {
        self.allocated.fetch_add(1, Ordering::SeqCst);
        self.by_role[role.index()].fetch_add(1, Ordering::SeqCst);
    }

    fn record_release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// An owned pixel buffer.
pub struct ImageBuffer {
    image: DynamicImage,
    role: BufferRole,
    ledger: Option<Arc<BufferLedger>>,
}

impl ImageBuffer {
    /// Wrap a decoded image as an untracked source buffer.
    pub fn new(image: DynamicImage) -> Self {
        Self {
            image,
            role: BufferRole::Source,
            ledger: None,
        }
    }

    /// Wrap a decoded image as a source buffer tracked by `ledger`.
    pub fn tracked(image: DynamicImage, ledger: &Arc<BufferLedger>) -> Self {
        ledger.record_allocation(BufferRole::Source);
        Self {
            image,
            role: BufferRole::Source,
            ledger: Some(Arc::clone(ledger)),
        }
    }

    /// Create a new buffer derived from this one, inheriting its ledger.
    pub(crate) fn derive(&self, image: DynamicImage, role: BufferRole) -> Self {
        if let Some(ledger) = &self.ledger {
            ledger.record_allocation(role);
        }
        Self {
            image,
            role,
            ledger: self.ledger.clone(),
        }
    }

    /// Create an empty 0x0 buffer derived from this one.
    pub(crate) fn derive_empty(&self, role: BufferRole) -> Self {
        self.derive(DynamicImage::new_luma8(0, 0), role)
    }

    /// Move this buffer behind a reference-counted handle.
    pub fn into_shared(self) -> SharedImage {
        Arc::new(self)
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width()) * u64::from(self.height())
    }

    /// Size of the pixel storage in bytes.
    pub fn byte_len(&self) -> usize {
        self.image.as_bytes().len()
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::of(&self.image)
    }

    pub fn role(&self) -> BufferRole {
        self.role
    }

    /// True when either dimension is zero.
    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Borrow the pixels.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    /// Encode the pixels as PNG.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        if self.is_empty() {
            return Err(PipelineError::Encode(format!(
                "cannot encode empty {:?} buffer",
                self.role
            )));
        }
        let mut out = Cursor::new(Vec::new());
        self.image
            .write_to(&mut out, ImageFormat::Png)
            .map_err(|e| PipelineError::Encode(e.to_string()))?;
        Ok(out.into_inner())
    }

    /// Release the buffer now.
    pub fn release(self) {
        drop(self);
    }
}

impl Drop for ImageBuffer {
    fn drop(&mut self) {
        if let Some(ledger) = &self.ledger {
            ledger.record_release();
        }
        tracing::trace!(
            role = ?self.role,
            width = self.image.width(),
            height = self.image.height(),
            "Released image buffer"
        );
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("format", &self.format())
            .field("role", &self.role)
            .field("tracked", &self.ledger.is_some())
            .finish()
    }
}
