//! Textual progress reporting.

use std::sync::mpsc;
use std::sync::Mutex;
use tracing::info;

/// Receives human-readable progress updates. May be called from the
/// orchestrator thread and the image sub-task thread.
pub trait ProgressMonitor: Send + Sync {
    fn set_progress_text(&self, text: &str);
}

impl<F> ProgressMonitor for F
where
    F: Fn(&str) + Send + Sync,
{
    fn set_progress_text(&self, text: &str) {
        self(text)
    }
}

/// Writes progress to the log only.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressMonitor for LogProgress {
    fn set_progress_text(&self, text: &str) {
        info!(progress = text, "Ingest progress");
    }
}

/// Forwards progress over a channel; updates are dropped once the receiver
/// is gone.
pub struct ChannelProgress {
    tx: Mutex<mpsc::Sender<String>>,
}

impl ChannelProgress {
    pub fn new(tx: mpsc::Sender<String>) -> Self {
        Self { tx: Mutex::new(tx) }
    }
}

impl ProgressMonitor for ChannelProgress {
    fn set_progress_text(&self, text: &str) {
        let tx = self.tx.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let _ = tx.send(text.to_string());
    }
}
