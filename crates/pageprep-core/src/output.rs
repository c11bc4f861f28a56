//! Reports describing how a preparation ended, written as JSON or JSON Lines.

use serde::Serialize;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::error::Result;
use crate::pipeline::{Checkpoint, TaskOutcome};
use crate::types::PreparationSummary;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// One JSON document per report, optionally pretty-printed
    Json,
    /// One compact JSON object per line
    JsonLines,
}

impl OutputFormat {
    /// Parse format from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "jsonl" | "jsonlines" | "ndjson" => Some(Self::JsonLines),
            _ => None,
        }
    }
}

/// Terminal state of one preparation, ready for serialization.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PreparationReport {
    Completed {
        input: PathBuf,
        summary: PreparationSummary,
    },
    Cancelled {
        input: PathBuf,
        checkpoint: String,
    },
    Failed {
        input: PathBuf,
        error: String,
    },
}

impl PreparationReport {
    /// Build a report from a task outcome.
    ///
    /// `summary` is taken from the delivered result; a completed outcome
    /// without one (the consumer dropped it) is reported as failed.
    pub fn from_outcome(
        input: PathBuf,
        outcome: &TaskOutcome,
        summary: Option<PreparationSummary>,
    ) -> Self {
        match (outcome, summary) {
            (TaskOutcome::Completed { .. }, Some(summary)) => Self::Completed { input, summary },
            (TaskOutcome::Completed { .. }, None) => Self::Failed {
                input,
                error: "result was not received".to_string(),
            },
            (TaskOutcome::Cancelled(checkpoint), _) => Self::cancelled(input, *checkpoint),
            (TaskOutcome::Failed(error), _) => Self::Failed {
                input,
                error: error.to_string(),
            },
        }
    }

    pub fn cancelled(input: PathBuf, checkpoint: Checkpoint) -> Self {
        Self::Cancelled {
            input,
            checkpoint: checkpoint.to_string(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Serializes reports to an underlying writer.
pub struct ReportWriter<W: Write> {
    writer: W,
    format: OutputFormat,
    pretty: bool,
    written: usize,
}

impl<W: Write> ReportWriter<W> {
    /// `pretty` only affects [`OutputFormat::Json`].
    pub fn new(writer: W, format: OutputFormat, pretty: bool) -> Self {
        Self {
            writer,
            format,
            pretty,
            written: 0,
        }
    }

    /// Write one report followed by a newline.
    ///
    /// Serialization happens before any byte reaches the writer, so a failed
    /// report never leaves a partial line behind.
    pub fn write(&mut self, report: &PreparationReport) -> Result<()> {
        let json = if self.pretty && self.format == OutputFormat::Json {
            serde_json::to_vec_pretty(report)?
        } else {
            serde_json::to_vec(report)?
        };
        self.writer.write_all(&json)?;
        writeln!(self.writer)?;
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
