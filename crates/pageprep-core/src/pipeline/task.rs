//! The crop-preparation task: blur detection, scaling and display conversion
//! as one cancellable unit of background work.
//!
//! The task walks a small state machine. Each stage owns the buffers produced
//! so far and hands them to the next stage by value, so at any point exactly
//! one stage owns every buffer. Between stages the task polls its
//! [`CancellationToken`]; when cancellation is honoured the current stage is
//! dropped, releasing what it owned, and nothing is published.
//!
//! Publishing and cancelling are mutually exclusive. The final checkpoint and
//! the transition to `Completed` happen under the same lock that
//! [`Canceller::cancel`] takes, so a cancel that reports success always wins
//! and a task that completed can no longer be cancelled.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::buffer::SharedImage;
use crate::config::Config;
use crate::error::PipelineError;
use crate::types::{BlurDetectionResult, CropPreparationResult, ScaleResult};

use super::blur::BlurDetector;
use super::cancel::{CancellationToken, Checkpoint};
use super::display::DisplayConverter;
use super::scaler::ImageScaler;
use super::sink::ResultSink;

/// Lifecycle of a task. Terminal states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// How a task ended.
#[derive(Debug)]
pub enum TaskOutcome {
    /// The result was handed to the sink; dimensions of the display bitmap
    Completed { width: u32, height: u32 },
    /// Cancellation was honoured at this checkpoint; nothing was published
    Cancelled(Checkpoint),
    /// A stage failed; nothing was published
    Failed(PipelineError),
}

impl TaskOutcome {
    /// The terminal state matching this outcome.
    pub fn state(&self) -> TaskState {
        match self {
            Self::Completed { .. } => TaskState::Completed,
            Self::Cancelled(_) => TaskState::Cancelled,
            Self::Failed(_) => TaskState::Failed,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// State shared between the worker and every [`Canceller`].
#[derive(Debug)]
struct TaskControl {
    state: Mutex<TaskState>,
    token: CancellationToken,
}

impl TaskControl {
    fn new() -> Self {
        Self {
            state: Mutex::new(TaskState::Pending),
            token: CancellationToken::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TaskState> {
        // The guarded value is a plain enum, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn state(&self) -> TaskState {
        *self.lock()
    }

    fn cancel(&self) -> bool {
        let state = self.lock();
        if state.is_terminal() {
            return false;
        }
        self.token.cancel();
        true
    }

    /// Move a non-terminal task into `next`.
    fn transition(&self, next: TaskState) {
        let mut state = self.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }

    /// Final checkpoint: become `Completed` unless a cancel got in first.
    fn try_complete(&self) -> bool {
        let mut state = self.lock();
        if state.is_terminal() {
            return false;
        }
        if self.token.is_cancelled() {
            *state = TaskState::Cancelled;
            return false;
        }
        *state = TaskState::Completed;
        true
    }
}

/// Cheap, cloneable handle for cancelling a task from any thread.
#[derive(Debug, Clone)]
pub struct Canceller {
    control: Arc<TaskControl>,
}

impl Canceller {
    /// Request cancellation.
    ///
    /// Returns `true` if the task had not reached a terminal state; it is
    /// then guaranteed never to publish. Returns `false` if the task already
    /// finished, in which case any result has been or will be delivered.
    pub fn cancel(&self) -> bool {
        self.control.cancel()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.token.is_cancelled()
    }

    pub fn state(&self) -> TaskState {
        self.control.state()
    }
}

type CheckpointHook = Box<dyn Fn(Checkpoint) + Send + 'static>;

/// Pipeline stages, each owning the buffers produced so far.
enum Stage {
    DetectBlur,
    Scale {
        blur: BlurDetectionResult,
    },
    Render {
        blur: BlurDetectionResult,
        scale: ScaleResult,
    },
}

/// Why the pipeline stopped short of publishing.
enum Stop {
    Cancelled(Checkpoint),
    Failed(PipelineError),
}

/// A single-shot, cancellable crop-preparation job.
///
/// Build one per request with [`CropPreparationTask::new`], keep a
/// [`Canceller`] if needed, then either [`run`](Self::run) it on the current
/// thread or [`spawn`](Self::spawn) it onto the blocking pool.
pub struct CropPreparationTask {
    source: SharedImage,
    target_width: u32,
    target_height: u32,
    blur: BlurDetector,
    scaler: ImageScaler,
    control: Arc<TaskControl>,
    on_checkpoint: Option<CheckpointHook>,
}

impl CropPreparationTask {
    /// Prepare `source` for display inside `target_width` x `target_height`.
    pub fn new(source: SharedImage, target_width: u32, target_height: u32, config: &Config) -> Self {
        if target_width == 0 || target_height == 0 {
            tracing::warn!(
                "Crop preparation requested with zero target ({}x{})",
                target_width,
                target_height
            );
        }
        Self {
            source,
            target_width,
            target_height,
            blur: BlurDetector::new(config.blur.clone()),
            scaler: ImageScaler::new(config.scaling.clone(), config.limits.clone()),
            control: Arc::new(TaskControl::new()),
            on_checkpoint: None,
        }
    }

    /// Observe each checkpoint just before cancellation is checked there.
    ///
    /// Runs on the worker thread. Useful for progress reporting.
    pub fn on_checkpoint<F>(mut self, hook: F) -> Self
    where
        F: Fn(Checkpoint) + Send + 'static,
    {
        self.on_checkpoint = Some(Box::new(hook));
        self
    }

    pub fn canceller(&self) -> Canceller {
        Canceller {
            control: Arc::clone(&self.control),
        }
    }

    pub fn state(&self) -> TaskState {
        self.control.state()
    }

    /// Run to a terminal state on the current thread, delivering to `sink` on
    /// completion. The sink is dropped unused otherwise.
    pub fn run(self, sink: ResultSink) -> TaskOutcome {
        let start = Instant::now();
        self.control.transition(TaskState::Running);
        tracing::debug!(
            "Preparing {}x{} page for {}x{}",
            self.source.width(),
            self.source.height(),
            self.target_width,
            self.target_height
        );

        let prepared = panic::catch_unwind(AssertUnwindSafe(|| self.prepare()))
            .unwrap_or_else(|payload| Err(Stop::Failed(PipelineError::WorkerPanicked(
                panic_message(payload.as_ref()),
            ))));

        let outcome = match prepared {
            Ok(result) => {
                let (width, height) = (result.display.width(), result.display.height());
                // Ownership has moved to the consumer by the time its callback
                // runs, so a panic there does not change the outcome.
                match panic::catch_unwind(AssertUnwindSafe(|| sink.deliver(result))) {
                    Ok(true) => {}
                    Ok(false) => tracing::debug!("Result consumer went away before delivery"),
                    Err(payload) => tracing::error!(
                        "Result consumer panicked during delivery: {}",
                        panic_message(payload.as_ref())
                    ),
                }
                TaskOutcome::Completed { width, height }
            }
            Err(Stop::Cancelled(checkpoint)) => {
                self.control.transition(TaskState::Cancelled);
                tracing::debug!("Crop preparation cancelled at {}", checkpoint);
                TaskOutcome::Cancelled(checkpoint)
            }
            Err(Stop::Failed(error)) => {
                self.control.transition(TaskState::Failed);
                tracing::error!("Crop preparation failed: {}", error);
                TaskOutcome::Failed(error)
            }
        };

        tracing::debug!("Crop preparation finished in {:?}: {:?}", start.elapsed(), outcome.state());
        outcome
    }

    /// Run on tokio's blocking pool. Must be called within a runtime.
    pub fn spawn(self, sink: ResultSink) -> TaskHandle {
        let canceller = self.canceller();
        let join = tokio::task::spawn_blocking(move || self.run(sink));
        TaskHandle { canceller, join }
    }

    /// Drive the stages until the result is packaged or the pipeline stops.
    /// Buffers owned by an abandoned stage are released before returning.
    fn prepare(&self) -> Result<CropPreparationResult, Stop> {
        let mut stage = Stage::DetectBlur;
        loop {
            stage = match stage {
                Stage::DetectBlur => {
                    let started = Instant::now();
                    let blur = self.blur.detect(&self.source);
                    tracing::trace!("  Blur: {:?}", started.elapsed());

                    if self.cancelled_at(Checkpoint::AfterBlur) {
                        blur.release();
                        return Err(Stop::Cancelled(Checkpoint::AfterBlur));
                    }
                    Stage::Scale { blur }
                }

                Stage::Scale { blur } => {
                    let started = Instant::now();
                    let scale = match self.scaler.scale(
                        &self.source,
                        self.target_width,
                        self.target_height,
                    ) {
                        Ok(scale) => scale,
                        Err(e) => {
                            blur.release();
                            return Err(Stop::Failed(e));
                        }
                    };
                    tracing::trace!("  Scale: {:?}", started.elapsed());

                    if self.cancelled_at(Checkpoint::AfterScale) {
                        scale.release();
                        blur.release();
                        return Err(Stop::Cancelled(Checkpoint::AfterScale));
                    }
                    Stage::Render { blur, scale }
                }

                Stage::Render { blur, scale } => {
                    let started = Instant::now();
                    let display = match DisplayConverter::convert(&scale) {
                        Ok(display) => display,
                        Err(e) => {
                            scale.release();
                            blur.release();
                            return Err(Stop::Failed(e));
                        }
                    };
                    tracing::trace!("  Display: {:?}", started.elapsed());

                    let result = CropPreparationResult {
                        display,
                        scale,
                        blur,
                    };
                    self.notify(Checkpoint::AfterDisplay);
                    if !self.control.try_complete() {
                        tracing::trace!("Checkpoint {} honoured cancellation", Checkpoint::AfterDisplay);
                        result.release();
                        return Err(Stop::Cancelled(Checkpoint::AfterDisplay));
                    }
                    return Ok(result);
                }
            };
        }
    }

    fn notify(&self, checkpoint: Checkpoint) {
        if let Some(hook) = &self.on_checkpoint {
            hook(checkpoint);
        }
    }

    fn cancelled_at(&self, checkpoint: Checkpoint) -> bool {
        self.notify(checkpoint);
        let cancelled = self.control.token.is_cancelled();
        if cancelled {
            tracing::trace!("Checkpoint {} honoured cancellation", checkpoint);
        }
        cancelled
    }
}

/// Handle to a task running on the blocking pool.
#[derive(Debug)]
pub struct TaskHandle {
    canceller: Canceller,
    join: tokio::task::JoinHandle<TaskOutcome>,
}

impl TaskHandle {
    /// See [`Canceller::cancel`].
    pub fn cancel(&self) -> bool {
        self.canceller.cancel()
    }

    pub fn state(&self) -> TaskState {
        self.canceller.state()
    }

    /// A cancel handle that can move to another thread.
    pub fn canceller(&self) -> Canceller {
        self.canceller.clone()
    }

    /// Wait for the task to reach a terminal state.
    pub async fn wait(self) -> TaskOutcome {
        match self.join.await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.canceller.control.transition(TaskState::Failed);
                TaskOutcome::Failed(PipelineError::WorkerPanicked(e.to_string()))
            }
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
