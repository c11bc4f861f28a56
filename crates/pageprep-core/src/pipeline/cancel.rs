//! Cooperative cancellation for preparation tasks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A flag that any thread may raise and the worker polls between stages.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Points in the pipeline where a pending cancellation is honoured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    /// After blur detection, before scaling
    AfterBlur,
    /// After scaling, before display conversion
    AfterScale,
    /// After display conversion, decided atomically with publishing
    AfterDisplay,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Checkpoint::AfterBlur => write!(f, "after-blur"),
            Checkpoint::AfterScale => write!(f, "after-scale"),
            Checkpoint::AfterDisplay => write!(f, "after-display"),
        }
    }
}
