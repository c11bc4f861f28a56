//! Loading captured pages from disk or memory into source buffers.
//!
//! Decoding runs on the blocking pool under a timeout, after cheap checks on
//! file size and header bytes so a bad file fails before any pixels are
//! allocated.

use image::{GenericImageView, ImageFormat};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::buffer::{BufferLedger, ImageBuffer, SharedImage};
use crate::config::LimitsConfig;
use crate::error::PipelineError;

/// Header signatures of the capture formats we accept, with their offsets.
const SIGNATURES: &[(usize, &[u8])] = &[
    (0, &[0xFF, 0xD8, 0xFF]),             // JPEG
    (0, &[0x89, b'P', b'N', b'G']),       // PNG
    (0, b"II\x2A\x00"),                   // TIFF, little-endian
    (0, b"MM\x00\x2A"),                   // TIFF, big-endian
    (8, b"WEBP"),                         // WebP (RIFF container)
    (0, b"BM"),                           // BMP
    (0, b"GIF8"),                         // GIF
];

/// A decoded page ready for crop preparation.
#[derive(Debug)]
pub struct DecodedPage {
    /// Source buffer, shareable with a preparation task
    pub image: SharedImage,
    /// Detected image format
    pub format: ImageFormat,
    /// Encoded size in bytes
    pub file_size: u64,
}

/// Decoder for captured pages with configurable limits.
pub struct PageDecoder {
    limits: LimitsConfig,
    ledger: Option<Arc<BufferLedger>>,
}

impl PageDecoder {
    /// Create a new decoder with the given limits.
    pub fn new(limits: LimitsConfig) -> Self {
        Self {
            limits,
            ledger: None,
        }
    }

    /// Track every decoded page, and everything derived from it, in `ledger`.
    pub fn with_ledger(mut self, ledger: Arc<BufferLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Read and decode the page at `path`.
    pub async fn decode(&self, path: &Path) -> Result<DecodedPage, PipelineError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|_| PipelineError::FileNotFound(path.to_path_buf()))?;

        let max_bytes = self.limits.max_file_size_mb * 1024 * 1024;
        if metadata.len() > max_bytes {
            return Err(PipelineError::FileTooLarge {
                path: path.to_path_buf(),
                size_mb: metadata.len() / (1024 * 1024),
                max_mb: self.limits.max_file_size_mb,
            });
        }

        let bytes = tokio::fs::read(path).await.map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot read file: {}", e),
        })?;
        self.decode_bytes(bytes, path).await
    }

    /// Decode an in-memory encoded page with validation and timeout.
    ///
    /// `path` is only used for format fallback and error messages.
    pub async fn decode_bytes(
        &self,
        bytes: Vec<u8>,
        path: &Path,
    ) -> Result<DecodedPage, PipelineError> {
        if !has_known_signature(&bytes) {
            return Err(PipelineError::Decode {
                path: path.to_path_buf(),
                message: "Unrecognized image format (invalid magic bytes)".to_string(),
            });
        }

        let file_size = bytes.len() as u64;
        let path_owned = path.to_path_buf();
        let timeout_duration = Duration::from_millis(self.limits.decode_timeout_ms);

        let decoded = timeout(timeout_duration, async {
            tokio::task::spawn_blocking(move || decode_sync(bytes, &path_owned)).await
        })
        .await;

        let (image, format) = match decoded {
            Ok(Ok(result)) => result?,
            Ok(Err(e)) => {
                return Err(PipelineError::Decode {
                    path: path.to_path_buf(),
                    message: format!("Task join error: {}", e),
                })
            }
            Err(_) => {
                return Err(PipelineError::Timeout {
                    path: path.to_path_buf(),
                    stage: "decode".to_string(),
                    timeout_ms: self.limits.decode_timeout_ms,
                })
            }
        };

        let (width, height) = image.dimensions();
        let max_dim = self.limits.max_image_dimension;
        if width > max_dim || height > max_dim {
            return Err(PipelineError::ImageTooLarge {
                path: path.to_path_buf(),
                width,
                height,
                max_dim,
            });
        }

        tracing::debug!(
            "Decoded {:?}: {}x{} {} ({} bytes)",
            path,
            width,
            height,
            format_name(format),
            file_size
        );

        let buffer = match &self.ledger {
            Some(ledger) => ImageBuffer::tracked(image, ledger),
            None => ImageBuffer::new(image),
        };
        Ok(DecodedPage {
            image: buffer.into_shared(),
            format,
            file_size,
        })
    }
}

/// Synchronous decode, run on the blocking pool.
fn decode_sync(
    bytes: Vec<u8>,
    path: &Path,
) -> Result<(image::DynamicImage, ImageFormat), PipelineError> {
    let reader = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| PipelineError::Decode {
            path: path.to_path_buf(),
            message: format!("Cannot detect image format: {}", e),
        })?;
    let format = match reader.format() {
        Some(f) => f,
        None => ImageFormat::from_path(path).map_err(|_| PipelineError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: path
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("unknown")
                .to_string(),
        })?,
    };
    let image = reader.decode().map_err(|e| PipelineError::Decode {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok((image, format))
}

fn has_known_signature(bytes: &[u8]) -> bool {
    SIGNATURES.iter().any(|(offset, magic)| {
        bytes
            .get(*offset..offset + magic.len())
            .is_some_and(|window| window == *magic)
    })
}

/// Short lowercase name for an image format.
pub fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        ImageFormat::Bmp => "bmp",
        _ => "unknown",
    }
}
