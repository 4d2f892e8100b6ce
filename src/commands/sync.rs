use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::cli::{label_direct_messages, parse_selection, select_channels, SyncArgs};
use crate::config::Config;
use crate::error::AppError;
use crate::export::ExportWriter;
use crate::meta::MetadataIndex;
use crate::slack::{HistoryFetcher, SlackChannel};
use crate::sync::{
    ProgressEvent, ProgressReporter, SyncOptions, SyncOrchestrator, SyncReport, DEFAULT_PROGRESS_CAPACITY,
};

pub async fn sync_channels(config: &Config, args: SyncArgs) -> Result<(), AppError> {
    let session = super::connect(config).await?;
    let mut channels = session
        .cache
        .channels(session.api.as_ref(), &config.retry, args.refresh)
        .await?;
    let users = session
        .cache
        .users(session.api.as_ref(), &config.retry, args.refresh)
        .await?;
    label_direct_messages(&mut channels, &users);

    let selected = if args.channels.is_empty() {
        prompt_for_channels(&channels).await?
    } else {
        select_channels(&channels, &args.channels)?
    };
    if selected.is_empty() {
        println!("No channels selected.");
        return Ok(());
    }

    let index = Arc::new(MetadataIndex::load(MetadataIndex::path_for(&config.export_root)).await);
    let fetcher = HistoryFetcher::new(session.api.clone(), config.retry)
        .with_page_size(config.page_size)
        .with_page_delay(config.page_delay);
    let writer = ExportWriter::new(session.api.clone(), config.retry).with_attachments(config.download_attachments);
    let mut options = SyncOptions::new(&config.export_root, config.mode);
    options.folder = args.folder;
    options.save_each_channel = config.save_index_each_channel;

    let (reporter, events) = ProgressReporter::channel(DEFAULT_PROGRESS_CAPACITY);
    let orchestrator = SyncOrchestrator::new(fetcher, writer, index, users, options).with_progress(reporter);

    let cancel = super::cancel_on_ctrl_c();
    let batch_cancel = cancel.clone();
    let total = selected.len();
    let batch = tokio::spawn(async move { orchestrator.run(&selected, &batch_cancel).await });

    render_progress(events, total).await;
    let report = batch.await?;
    print_report(&report);
    Ok(())
}

/// Show a numbered list of active channels and read a selection like `1,3-5`.
async fn prompt_for_channels(channels: &[SlackChannel]) -> Result<Vec<SlackChannel>, AppError> {
    let candidates: Vec<&SlackChannel> = channels.iter().filter(|c| !c.is_archived).collect();
    for (i, channel) in candidates.iter().enumerate() {
        println!("{:>4}. {}", i + 1, channel.display_name());
    }
    print!("Select channels (e.g. 1,3-5): ");
    std::io::stdout().flush()?;

    let line = tokio::task::spawn_blocking(|| {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).map(|_| line)
    })
    .await??;

    if line.trim().is_empty() {
        return Ok(Vec::new());
    }
    let picked = parse_selection(&line, candidates.len())?;
    Ok(picked.into_iter().map(|i| candidates[i].clone()).collect())
}

/// Drain progress events until the batch drops its reporter.
async fn render_progress(mut events: mpsc::Receiver<ProgressEvent>, total: usize) {
    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = events.recv().await {
        match event {
            ProgressEvent::ChannelStarted { channel, .. } => {
                bar.set_message(format!("#{}", channel));
            }
            ProgressEvent::FetchTick { channel, items, status } => {
                bar.set_message(format!("#{}: {} messages {}", channel, items, status));
            }
            ProgressEvent::ChannelSkipped { channel, path } => {
                bar.println(format!("  skipped #{} ({} exists)", channel, path.display()));
                bar.inc(1);
            }
            ProgressEvent::ChannelDone {
                channel,
                path,
                messages_written,
            } => {
                bar.println(format!(
                    "  #{}: {} messages -> {}",
                    channel,
                    messages_written,
                    path.display()
                ));
                bar.inc(1);
            }
            ProgressEvent::ChannelFailed { channel, error } => {
                bar.println(format!("  #{} failed: {}", channel, error));
                bar.inc(1);
            }
            ProgressEvent::BatchDone { .. } => break,
        }
    }
    bar.finish_and_clear();
}

fn print_report(report: &SyncReport) {
    println!(
        "\nSync finished: {} exported ({} messages), {} skipped, {} failed, {} cancelled",
        report.finished.len(),
        report.total_messages(),
        report.skipped.len(),
        report.failed.len(),
        report.cancelled.len()
    );
    for failed in &report.failed {
        println!("  failed #{}: {}", failed.name, failed.error);
    }
    if !report.cancelled.is_empty() {
        println!("  not started: {}", report.cancelled.join(", "));
    }
    if let Some(error) = &report.index_error {
        println!("  warning: index was not saved: {}", error);
    }
}
