//! PagePrep Core - crop preparation for captured document pages.
//!
//! Before a captured page is shown on a crop screen it has to be checked for
//! blur, scaled to fit the available display area and converted into a
//! bitmap the UI can draw. PagePrep runs those three steps as one
//! cancellable background task that hands its result over exactly once.
//!
//! # Architecture
//!
//! ```text
//! Page → Decode → Blur Detection → Scale → Display Bitmap → Sink
//!                      ↑             ↑            ↑
//!                  checkpoint    checkpoint   checkpoint
//! ```
//!
//! A cancel request is honoured at the next checkpoint; a cancelled task
//! releases everything it allocated and never publishes.
//!
//! # Usage
//!
//! ```rust,ignore
//! use pageprep_core::{Config, PagePrep, ResultSink};
//!
//! #[tokio::main]
//! async fn main() -> pageprep_core::Result<()> {
//!     let prep = PagePrep::new(Config::load()?)?;
//!     let page = prep.decoder().decode("./page.jpg".as_ref()).await?;
//!
//!     let (sink, rx) = ResultSink::channel();
//!     let handle = prep.start_crop_preparation(page.image, 1080, 1920, sink);
//!     // handle.cancel() from anywhere if the user navigates away
//!     if handle.wait().await.is_completed() {
//!         let result = rx.await.expect("completed tasks deliver");
//!         println!("sharpness {:.1}", result.blur.sharpness);
//!     }
//!     Ok(())
//! }
//! ```

// Module declarations
pub mod buffer;
pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod types;

// Re-exports for convenient access
pub use buffer::{BufferLedger, BufferRole, ImageBuffer, PixelFormat, SharedImage};
pub use config::Config;
pub use error::{ConfigError, PagePrepError, PipelineError, PipelineResult, Result};
pub use output::{OutputFormat, PreparationReport, ReportWriter};
pub use pipeline::{
    BlurDetector, CancellationToken, Canceller, Checkpoint, CropPreparationTask, DecodedPage,
    DisplayBitmap, ImageScaler, PageDecoder, ResultSink, TaskHandle, TaskOutcome, TaskState,
};
pub use types::{
    BlurDetectionResult, BlurVerdict, CropPreparationResult, CropRect, PreparationSummary,
    ScaleResult,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Entry point tying a validated configuration to decoders and tasks.
pub struct PagePrep {
    config: Config,
}

impl PagePrep {
    /// Create a new instance, rejecting out-of-range configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        tracing::debug!("Initializing PagePrep v{}", VERSION);
        Ok(Self { config })
    }

    /// Get a reference to the current configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// A decoder using the configured limits.
    pub fn decoder(&self) -> PageDecoder {
        PageDecoder::new(self.config.limits.clone())
    }

    /// Build a task without starting it, e.g. to attach a checkpoint hook.
    pub fn prepare(
        &self,
        source: SharedImage,
        target_width: u32,
        target_height: u32,
    ) -> CropPreparationTask {
        CropPreparationTask::new(source, target_width, target_height, &self.config)
    }

    /// Start preparing `source` for a `target_width` x `target_height`
    /// display area on the blocking pool. Must be called within a runtime.
    ///
    /// The returned handle cancels or awaits the task; the result goes to
    /// `sink` only if the task completes.
    pub fn start_crop_preparation(
        &self,
        source: SharedImage,
        target_width: u32,
        target_height: u32,
        sink: ResultSink,
    ) -> TaskHandle {
        self.prepare(source, target_width, target_height).spawn(sink)
    }
}
