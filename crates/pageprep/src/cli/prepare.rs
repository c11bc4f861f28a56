//! The `pageprep prepare` command: run one crop preparation and report it.

use clap::{Args, ValueEnum};
use pageprep_core::output::OutputFormat as CoreOutputFormat;
use pageprep_core::{
    Config, CropPreparationResult, PagePrep, PreparationReport, PreparationSummary,
    ReportWriter, ResultSink, TaskOutcome,
};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Arguments for the `prepare` command.
#[derive(Args, Debug)]
pub struct PrepareArgs {
    /// Captured page to prepare
    #[arg(required = true)]
    pub input: PathBuf,

    /// Width of the display area in pixels
    #[arg(long)]
    pub width: u32,

    /// Height of the display area in pixels
    #[arg(long)]
    pub height: u32,

    /// Cancel the task after this many milliseconds
    #[arg(long, value_name = "MS")]
    pub cancel_after_ms: Option<u64>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Output file (defaults to stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write display and diagnostic PNGs into the configured output directory
    #[arg(long)]
    pub write_images: bool,

    /// Embed the display bitmap as base64 PNG in the report
    #[arg(long)]
    pub embed_display: bool,
}

/// Supported output formats.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed JSON object
    Json,
    /// One JSON object per line (newline-delimited)
    Jsonl,
}

impl From<OutputFormat> for CoreOutputFormat {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Json => CoreOutputFormat::Json,
            OutputFormat::Jsonl => CoreOutputFormat::JsonLines,
        }
    }
}

/// Execute the prepare command.
pub async fn execute(args: PrepareArgs, config: Config) -> anyhow::Result<()> {
    let output_dir = config.output_dir();
    let prep = PagePrep::new(config)?;

    let page = prep.decoder().decode(&args.input).await?;
    tracing::info!(
        "Preparing {:?} ({}x{}) for a {}x{} display area",
        args.input,
        page.image.width(),
        page.image.height(),
        args.width,
        args.height
    );

    let (sink, rx) = ResultSink::channel();
    let handle = prep.start_crop_preparation(page.image, args.width, args.height, sink);

    if let Some(ms) = args.cancel_after_ms {
        let canceller = handle.canceller();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(ms)).await;
            if canceller.cancel() {
                tracing::info!("Cancellation requested after {}ms", ms);
            } else {
                tracing::debug!("Task finished before the {}ms cancel deadline", ms);
            }
        });
    }

    let outcome = handle.wait().await;
    let summary = match &outcome {
        TaskOutcome::Completed { .. } => match rx.await {
            Ok(result) => {
                let summary = summarize(&result, &args, &output_dir);
                result.release();
                Some(summary?)
            }
            Err(_) => None,
        },
        _ => None,
    };

    let report = PreparationReport::from_outcome(args.input.clone(), &outcome, summary);
    write_report(&report, &args)?;

    match outcome {
        TaskOutcome::Failed(e) => Err(e.into()),
        _ => Ok(()),
    }
}

/// Build the report summary, embedding or writing images as requested.
fn summarize(
    result: &CropPreparationResult,
    args: &PrepareArgs,
    output_dir: &Path,
) -> anyhow::Result<PreparationSummary> {
    let mut summary = result.summary();
    if summary.verdict.is_blurred() {
        tracing::warn!(
            "Page looks blurred (sharpness {:.1}, {:?})",
            summary.sharpness,
            summary.verdict
        );
    }
    if args.embed_display && !result.display.buffer().is_empty() {
        summary.display_png = Some(result.display.to_png_base64()?);
    }
    if args.write_images {
        write_images(result, &args.input, output_dir)?;
    }
    Ok(summary)
}

/// Write `<stem>.display.png` and `<stem>.blur.png` into `dir`.
fn write_images(
    result: &CropPreparationResult,
    input: &Path,
    dir: &Path,
) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;
    let stem = input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("page");

    let mut written = Vec::new();
    for (suffix, buffer) in [
        ("display", result.display.buffer()),
        ("blur", &result.blur.diagnostic),
    ] {
        if buffer.is_empty() {
            tracing::warn!("Skipping empty {} image", suffix);
            continue;
        }
        let path = dir.join(format!("{stem}.{suffix}.png"));
        std::fs::write(&path, buffer.to_png_bytes()?)?;
        tracing::info!("Wrote {:?}", path);
        written.push(path);
    }
    Ok(written)
}

fn write_report(report: &PreparationReport, args: &PrepareArgs) -> anyhow::Result<()> {
    let format = CoreOutputFormat::from(args.format);
    match &args.output {
        Some(path) => {
            let path = PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned());
            let file = File::create(&path)?;
            let mut writer = ReportWriter::new(BufWriter::new(file), format, true);
            writer.write(report)?;
            writer.flush()?;
            tracing::info!("Report written to {:?}", path);
        }
        None => {
            let stdout = std::io::stdout();
            let mut writer = ReportWriter::new(stdout.lock(), format, true);
            writer.write(report)?;
            writer.flush()?;
        }
    }
    Ok(())
}
