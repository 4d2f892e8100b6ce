//! Progress events flowing from the sync task to the foreground renderer.

use std::path::PathBuf;
use tokio::sync::mpsc;

pub const DEFAULT_PROGRESS_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    ChannelStarted {
        channel: String,
        /// 1-based position in the batch
        position: usize,
        total: usize,
    },
    FetchTick {
        channel: String,
        items: usize,
        status: String,
    },
    ChannelSkipped {
        channel: String,
        path: PathBuf,
    },
    ChannelDone {
        channel: String,
        path: PathBuf,
        messages_written: usize,
    },
    ChannelFailed {
        channel: String,
        error: String,
    },
    BatchDone {
        finished: usize,
        skipped: usize,
        failed: usize,
        cancelled: usize,
    },
}

/// Sending half of the bounded progress channel.
///
/// Lifecycle events (`emit`) wait for room in the channel so the renderer
/// never misses a channel transition. Fetch ticks (`tick`) are sent with
/// `try_send` and dropped when the channel is full; the next tick carries
/// the newer count anyway. A closed receiver silences both.
#[derive(Debug, Clone, Default)]
pub struct ProgressReporter {
    tx: Option<mpsc::Sender<ProgressEvent>>,
}

impl ProgressReporter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ProgressEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A reporter that discards everything.
    pub fn disabled() -> Self {
        Self::default()
    }

    pub async fn emit(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            if tx.send(event).await.is_err() {
                tracing::debug!("Progress receiver dropped");
            }
        }
    }

    pub fn tick(&self, event: ProgressEvent) {
        if let Some(tx) = &self.tx {
            let _ = tx.try_send(event);
        }
    }
}
