//! Error types for the crop-preparation pipeline.
//!
//! Errors are organized by stage so a failed task reports where it stopped
//! and with which input. Cancellation is deliberately absent: a cancelled task
//! is a terminal outcome, not an error.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for pageprep operations.
#[derive(Error, Debug)]
pub enum PagePrepError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Pipeline processing errors
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Pipeline processing errors, organized by stage.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Image decoding failed
    #[error("Decode error for {path}: {message}")]
    Decode { path: PathBuf, message: String },

    /// Operation timed out
    #[error("Timeout in {stage} stage for {path} after {timeout_ms}ms")]
    Timeout {
        path: PathBuf,
        stage: String,
        timeout_ms: u64,
    },

    /// File exceeds size limit
    #[error("File too large: {path} ({size_mb}MB > {max_mb}MB)")]
    FileTooLarge {
        path: PathBuf,
        size_mb: u64,
        max_mb: u64,
    },

    /// Decoded image dimensions exceed limit
    #[error("Image too large: {path} ({width}x{height} > {max_dim})")]
    ImageTooLarge {
        path: PathBuf,
        width: u32,
        height: u32,
        max_dim: u32,
    },

    /// Unsupported image format
    #[error("Unsupported format for {path}: {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// A derived buffer would exceed the configured pixel budget
    #[error("Buffer too large: {width}x{height} exceeds {max_pixels} pixels")]
    BufferTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    /// Pixel storage could not be allocated
    #[error("Allocation of {bytes} bytes failed in {stage} stage")]
    Allocation { stage: String, bytes: usize },

    /// A pipeline stage panicked on the worker
    #[error("Worker panicked: {0}")]
    WorkerPanicked(String),

    /// Encoding a buffer for presentation failed
    #[error("Encode error: {0}")]
    Encode(String),
}

/// Convenience type alias for pageprep results.
pub type Result<T> = std::result::Result<T, PagePrepError>;

/// Convenience type alias for pipeline-specific results.
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
