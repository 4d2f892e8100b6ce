//! Channel synchronization: orchestration and progress reporting.

mod orchestrator;
mod progress;

pub use orchestrator::{
    FailedChannel, FinishedChannel, SyncError, SyncOptions, SyncOrchestrator, SyncReport,
};
pub use progress::{ProgressEvent, ProgressReporter, DEFAULT_PROGRESS_CAPACITY};
