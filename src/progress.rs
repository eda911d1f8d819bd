//! Installation progress broadcast
//!
//! Only one installation runs at a time, so the notifier holds a single shared
//! status value. Subscribers (the `/events` stream, `/status` polls) always see
//! the latest stage; intermediate updates may be coalesced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Coarse installation stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Waiting,
    Downloading,
    Extracting,
    Complete,
    Error,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Waiting => "waiting",
            Stage::Downloading => "downloading",
            Stage::Extracting => "extracting",
            Stage::Complete => "complete",
            Stage::Error => "error",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    /// Percentage 0-100, when known
    pub progress: Option<u8>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new<S: Into<String>>(stage: Stage, message: S, progress: Option<u8>) -> Self {
        Self {
            stage,
            message: message.into(),
            progress: progress.map(|p| p.min(100)),
            timestamp: Utc::now(),
        }
    }

    pub fn waiting() -> Self {
        Self::new(Stage::Waiting, "Waiting for a download link or upload", None)
    }
}

/// Percentage of `done` over `total`, `None` when the total is unknown.
pub fn percent(done: u64, total: Option<u64>) -> Option<u8> {
    match total {
        Some(total) if total > 0 => Some(((done.min(total) * 100) / total) as u8),
        _ => None,
    }
}

/// Shared, cloneable handle publishing the current [`ProgressEvent`].
#[derive(Debug, Clone)]
pub struct ProgressNotifier {
    tx: watch::Sender<ProgressEvent>,
}

impl Default for ProgressNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressNotifier {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(ProgressEvent::waiting());
        Self { tx }
    }

    /// Replace the current status. Never fails, even with no subscribers.
    pub fn publish(&self, event: ProgressEvent) {
        log::debug!(
            "progress {} {:?}: {}",
            event.stage.as_str(),
            event.progress,
            event.message
        );
        self.tx.send_replace(event);
    }

    pub fn update<S: Into<String>>(&self, stage: Stage, message: S, progress: Option<u8>) {
        self.publish(ProgressEvent::new(stage, message, progress));
    }

    pub fn current(&self) -> ProgressEvent {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }
}
