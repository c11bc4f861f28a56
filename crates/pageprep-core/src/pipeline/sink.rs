//! Delivery of finished results to whoever submitted the task.

use std::fmt;

use tokio::sync::oneshot;

use crate::types::CropPreparationResult;

type Callback = Box<dyn FnOnce(CropPreparationResult) + Send + 'static>;

/// Where a completed task hands its result.
///
/// Each sink is consumed by its single delivery, so a task can publish at
/// most once.
pub enum ResultSink {
    /// Send through a oneshot channel; the consumer awaits the receiver on
    /// its own executor.
    Channel(oneshot::Sender<CropPreparationResult>),

    /// Invoke a callback on the worker thread. The consumer is responsible
    /// for redispatching to its own thread.
    Callback(Callback),
}

impl ResultSink {
    /// Create a channel sink and the receiver the consumer awaits.
    pub fn channel() -> (Self, oneshot::Receiver<CropPreparationResult>) {
        let (tx, rx) = oneshot::channel();
        (Self::Channel(tx), rx)
    }

    /// Create a callback sink.
    pub fn callback<F>(f: F) -> Self
    where
        F: FnOnce(CropPreparationResult) + Send + 'static,
    {
        Self::Callback(Box::new(f))
    }

    /// Hand over `result`. Returns false when the consumer has gone away,
    /// in which case the result's buffers are released here.
    pub(crate) fn deliver(self, result: CropPreparationResult) -> bool {
        match self {
            Self::Channel(tx) => match tx.send(result) {
                Ok(()) => true,
                Err(result) => {
                    tracing::debug!("Result receiver dropped, releasing result");
                    result.release();
                    false
                }
            },
            Self::Callback(f) => {
                f(result);
                true
            }
        }
    }
}

impl fmt::Debug for ResultSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Channel(_) => f.write_str("ResultSink::Channel"),
            Self::Callback(_) => f.write_str("ResultSink::Callback"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferLedger, BufferRole, ImageBuffer};
    use crate::pipeline::{BlurDetector, DisplayConverter, ImageScaler};
    use crate::config::Config;
    use image::DynamicImage;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    fn result(ledger: &Arc<BufferLedger>) -> CropPreparationResult {
        let config = Config::default();
        let source = ImageBuffer::tracked(DynamicImage::new_rgb8(40, 20), ledger);
        let blur = BlurDetector::new(config.blur).detect(&source);
        let scale = ImageScaler::new(config.scaling, config.limits)
            .scale(&source, 20, 20)
            .unwrap();
        let display = DisplayConverter::convert(&scale).unwrap();
        CropPreparationResult {
            display,
            scale,
            blur,
        }
    }

    #[test]
    fn test_channel_delivery() {
        let ledger = BufferLedger::new();
        let (sink, mut rx) = ResultSink::channel();

        assert!(sink.deliver(result(&ledger)));
        let received = rx.try_recv().unwrap();
        assert_eq!(received.display.buffer().role(), BufferRole::Display);
        received.release();
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_closed_channel_releases() {
        let ledger = BufferLedger::new();
        let (sink, rx) = ResultSink::channel();
        drop(rx);

        assert!(!sink.deliver(result(&ledger)));
        assert_eq!(ledger.live(), 0);
    }

    #[test]
    fn test_callback_delivery() {
        let ledger = BufferLedger::new();
        let called = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let sink = ResultSink::callback(move |result| {
            flag.store(true, Ordering::SeqCst);
            assert_eq!(result.display.width(), 20);
            result.release();
        });

        assert_eq!(format!("{sink:?}"), "ResultSink::Callback");
        assert!(sink.deliver(result(&ledger)));
        assert!(called.load(Ordering::SeqCst));
        assert_eq!(ledger.live(), 0);
    }
}
