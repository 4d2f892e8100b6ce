//! Sequential per-channel sync: fetch, export, record.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::progress::{ProgressEvent, ProgressReporter};
use crate::export::{
    export_path, relative_path, scan_file, ExportError, ExportMode, ExportWriter, WriteStatus,
};
use crate::meta::MetadataIndex;
use crate::slack::{FetchProgress, HistoryFetcher, SlackChannel, SlackError, UserDirectory};

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Fetch failed: {0}")]
    Fetch(#[from] SlackError),

    #[error("Export failed: {0}")]
    Export(#[from] ExportError),
}

#[derive(Debug, Clone)]
pub struct SyncOptions {
    pub mode: ExportMode,
    pub export_root: PathBuf,
    /// Optional subfolder of the export root
    pub folder: Option<String>,
    /// Persist the index after every channel instead of only at the end
    pub save_each_channel: bool,
}

impl SyncOptions {
    pub fn new(export_root: impl Into<PathBuf>, mode: ExportMode) -> Self {
        Self {
            mode,
            export_root: export_root.into(),
            folder: None,
            save_each_channel: true,
        }
    }

    pub fn target_dir(&self) -> PathBuf {
        match self.folder.as_deref().filter(|f| !f.is_empty()) {
            Some(folder) => self.export_root.join(folder),
            None => self.export_root.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinishedChannel {
    pub channel_id: String,
    pub name: String,
    pub path: PathBuf,
    pub status: WriteStatus,
    pub messages_written: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FailedChannel {
    pub channel_id: String,
    pub name: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncReport {
    pub finished: Vec<FinishedChannel>,
    pub skipped: Vec<String>,
    pub failed: Vec<FailedChannel>,
    pub cancelled: Vec<String>,
    /// Set when the final index save failed; export files are still valid
    pub index_error: Option<String>,
}

impl SyncReport {
    pub fn total_messages(&self) -> usize {
        self.finished.iter().map(|f| f.messages_written).sum()
    }
}

enum ChannelOutcome {
    Skipped(PathBuf),
    Finished(FinishedChannel),
}

/// Where incremental fetching resumes for a channel with an existing export.
struct Resume {
    since: Option<String>,
    previous_count: u64,
}

pub struct SyncOrchestrator {
    fetcher: HistoryFetcher,
    writer: ExportWriter,
    index: Arc<MetadataIndex>,
    users: UserDirectory,
    options: SyncOptions,
    progress: ProgressReporter,
}

impl SyncOrchestrator {
    pub fn new(
        fetcher: HistoryFetcher,
        writer: ExportWriter,
        index: Arc<MetadataIndex>,
        users: UserDirectory,
        options: SyncOptions,
    ) -> Self {
        Self {
            fetcher,
            writer,
            index,
            users,
            options,
            progress: ProgressReporter::disabled(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Sync `channels` one at a time, in order. Per-channel failures are
    /// recorded in the report and do not stop the batch.
    pub async fn run(&self, channels: &[SlackChannel], cancel: &CancellationToken) -> SyncReport {
        let mut report = SyncReport::default();
        let total = channels.len();

        tracing::info!(
            "Syncing {} channels ({} mode) into {}",
            total,
            self.options.mode,
            self.options.target_dir().display()
        );

        for (i, channel) in channels.iter().enumerate() {
            let name = channel.display_name().to_string();

            if cancel.is_cancelled() {
                report
                    .cancelled
                    .extend(channels[i..].iter().map(|c| c.display_name().to_string()));
                break;
            }

            self.progress
                .emit(ProgressEvent::ChannelStarted {
                    channel: name.clone(),
                    position: i + 1,
                    total,
                })
                .await;

            match self.sync_channel(channel, cancel).await {
                Ok(ChannelOutcome::Skipped(path)) => {
                    tracing::info!("Skipped {} (export exists)", name);
                    self.progress
                        .emit(ProgressEvent::ChannelSkipped {
                            channel: name.clone(),
                            path,
                        })
                        .await;
                    report.skipped.push(name);
                }
                Ok(ChannelOutcome::Finished(done)) => {
                    tracing::info!("Synced {}: {} new messages", name, done.messages_written);
                    self.progress
                        .emit(ProgressEvent::ChannelDone {
                            channel: name.clone(),
                            path: done.path.clone(),
                            messages_written: done.messages_written,
                        })
                        .await;
                    report.finished.push(done);
                }
                Err(SyncError::Fetch(SlackError::Cancelled)) => {
                    tracing::info!("Sync cancelled during {}", name);
                    report
                        .cancelled
                        .extend(channels[i..].iter().map(|c| c.display_name().to_string()));
                    break;
                }
                Err(e) => {
                    tracing::error!("Error syncing channel {}: {}", name, e);
                    self.progress
                        .emit(ProgressEvent::ChannelFailed {
                            channel: name.clone(),
                            error: e.to_string(),
                        })
                        .await;
                    report.failed.push(FailedChannel {
                        channel_id: channel.id.clone(),
                        name,
                        error: e.to_string(),
                    });
                }
            }
        }

        if let Err(e) = self.index.save().await {
            tracing::warn!("Failed to save index: {}", e);
            report.index_error = Some(e.to_string());
        }

        self.progress
            .emit(ProgressEvent::BatchDone {
                finished: report.finished.len(),
                skipped: report.skipped.len(),
                failed: report.failed.len(),
                cancelled: report.cancelled.len(),
            })
            .await;

        report
    }

    async fn sync_channel(
        &self,
        channel: &SlackChannel,
        cancel: &CancellationToken,
    ) -> Result<ChannelOutcome, SyncError> {
        let name = channel.display_name();
        let target_dir = self.options.target_dir();
        let path = export_path(name, &target_dir);
        let relative = relative_path(&path, &self.options.export_root);
        let exists = tokio::fs::try_exists(&path).await.map_err(ExportError::from)?;

        if self.options.mode == ExportMode::Skip && exists {
            return Ok(ChannelOutcome::Skipped(path));
        }

        let resume = if self.options.mode == ExportMode::Incremental && exists {
            self.resume_point(channel, &path, &relative).await?
        } else {
            Resume {
                since: None,
                previous_count: 0,
            }
        };

        tracing::debug!(
            "Fetching {} ({}) since {}",
            name,
            channel.id,
            resume.since.as_deref().unwrap_or("the beginning")
        );

        let progress = &self.progress;
        let mut on_progress = |p: FetchProgress| {
            progress.tick(ProgressEvent::FetchTick {
                channel: name.to_string(),
                items: p.items,
                status: p.status,
            })
        };
        let mut messages = self
            .fetcher
            .fetch_history(&channel.id, resume.since.as_deref(), &mut on_progress, cancel)
            .await?;

        if let Some(since) = resume.since.as_deref() {
            messages.retain(|m| m.message.ts.as_str() > since);
        }
        let latest_ts = messages.iter().map(|m| m.message.ts.clone()).max();

        let outcome = self
            .writer
            .write_channel(name, &messages, &self.users, self.options.mode, &target_dir)
            .await?;

        let message_count = match outcome.status {
            WriteStatus::Appended => resume.previous_count + outcome.messages_written as u64,
            _ => outcome.messages_written as u64,
        };
        self.index
            .record_download(&channel.id, name, &relative, message_count, latest_ts.as_deref())
            .await;

        if self.options.save_each_channel {
            if let Err(e) = self.index.save().await {
                tracing::warn!("Failed to save index after {}: {}", name, e);
            }
        }

        Ok(ChannelOutcome::Finished(FinishedChannel {
            channel_id: channel.id.clone(),
            name: name.to_string(),
            path: outcome.path,
            status: outcome.status,
            messages_written: outcome.messages_written,
        }))
    }

    /// Resume from the index, or from the export file itself when the index
    /// has no usable record for it. An unreadable export fails the channel
    /// so nothing is appended without a known resume point.
    async fn resume_point(
        &self,
        channel: &SlackChannel,
        path: &Path,
        relative: &str,
    ) -> Result<Resume, ExportError> {
        if let Some(meta) = self.index.lookup_by_id(&channel.id).await {
            if meta.path == relative {
                if let Some(ts) = meta.last_message_ts {
                    return Ok(Resume {
                        since: Some(ts),
                        previous_count: meta.message_count,
                    });
                }
            }
        }

        let summary = scan_file(path).await.map_err(|source| ExportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.index.ensure_channel(&channel.id, channel.display_name()).await;
        Ok(Resume {
            // the export only keeps whole seconds, so resume after the full second
            since: summary
                .last_message_at
                .map(|t| format!("{}.999999", t.timestamp())),
            previous_count: summary.message_count as u64,
        })
    }
}
