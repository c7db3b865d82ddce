// src/progress.rs
use crate::errors::{AnalysisError, ErrorKind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

/// Status notifications emitted while an analysis runs. They are advisory; the
/// authoritative answer is the value returned by `analyze`.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    Preparing,
    Uploading { percent: u8 },
    Analyzing,
    ProcessingResponse,
    /// A transient failure is being retried after `delay`.
    Retrying {
        attempt: u32,
        delay: Duration,
        cause: ErrorKind,
    },
    Complete,
    /// `message` is the user-facing text of the failure.
    Error { kind: ErrorKind, message: String },
}

impl ProgressEvent {
    pub fn failed(err: &AnalysisError) -> Self {
        ProgressEvent::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Complete | ProgressEvent::Error { .. })
    }

    pub fn message(&self) -> String {
        match self {
            ProgressEvent::Preparing => "Preparing image for analysis...".to_string(),
            ProgressEvent::Uploading { percent } => format!("Uploading image... {percent}%"),
            ProgressEvent::Analyzing => "AI analyzing your image...".to_string(),
            ProgressEvent::ProcessingResponse => "Processing results...".to_string(),
            ProgressEvent::Retrying { delay, cause, .. } => {
                let reason = match cause {
                    ErrorKind::ServerError => "Server error",
                    _ => "Connection issue",
                };
                format!("{reason}. Retrying in {} seconds...", delay.as_secs())
            }
            ProgressEvent::Complete => "Analysis complete!".to_string(),
            ProgressEvent::Error { message, .. } => message.clone(),
        }
    }
}

/// Sending half of a progress stream. Cloning shares the terminal latch, so
/// once any clone emits `Complete` or `Error` every later event is dropped.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::UnboundedSender<ProgressEvent>>,
    finished: Arc<AtomicBool>,
}

impl ProgressReporter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ProgressEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let reporter = Self {
            tx: Some(tx),
            finished: Arc::new(AtomicBool::new(false)),
        };
        (reporter, rx)
    }

    /// A reporter nobody listens to.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn emit(&self, event: ProgressEvent) {
        if event.is_terminal() {
            if self.finished.swap(true, Ordering::SeqCst) {
                return;
            }
        } else if self.finished.load(Ordering::SeqCst) {
            return;
        }

        if let Some(tx) = &self.tx {
            // A dropped receiver just means nobody is watching anymore.
            let _ = tx.send(event);
        }
    }

    /// Reporter for one analysis: same listener, fresh terminal latch.
    pub fn for_call(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            finished: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}
