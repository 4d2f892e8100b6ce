//! Markdown rendering of channel history.

use chrono::{Local, TimeZone};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;

use super::cleaner::{clean_text, resolve_author};
use super::types::{ExportError, ExportMode, WriteOutcome, WriteStatus};
use crate::slack::{
    is_system_message, ts_to_datetime, with_retry, EnrichedMessage, RetryPolicy, SlackApi, SlackFile,
    SlackMessage, UserDirectory,
};

pub const ATTACHMENTS_DIR: &str = "attachments";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Replace characters that are not allowed in file names.
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "_".to_string()
    } else {
        cleaned
    }
}

/// Where a channel's export lives inside `target_dir`.
pub fn export_path(channel_name: &str, target_dir: &Path) -> PathBuf {
    target_dir.join(format!("{}.md", sanitize_filename(channel_name)))
}

/// Local wall-clock rendering of a Slack `ts`.
pub fn format_ts(ts: &str) -> String {
    match ts_to_datetime(ts) {
        Some(time) => Local.from_utc_datetime(&time.naive_utc()).format(TIME_FORMAT).to_string(),
        None => ts.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum AttachmentLink {
    Local(String),
    Remote(String),
    Failed(String),
}

pub struct ExportWriter {
    api: Arc<dyn SlackApi>,
    retry: RetryPolicy,
    download_attachments: bool,
}

impl ExportWriter {
    pub fn new(api: Arc<dyn SlackApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            download_attachments: false,
        }
    }

    pub fn with_attachments(mut self, enabled: bool) -> Self {
        self.download_attachments = enabled;
        self
    }

    /// Render `messages` into `<target_dir>/<channel>.md` according to `mode`.
    pub async fn write_channel(
        &self,
        channel_name: &str,
        messages: &[EnrichedMessage],
        users: &UserDirectory,
        mode: ExportMode,
        target_dir: &Path,
    ) -> Result<WriteOutcome, ExportError> {
        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|source| ExportError::CreateDir {
                path: target_dir.to_path_buf(),
                source,
            })?;

        let path = export_path(channel_name, target_dir);
        let exists = tokio::fs::try_exists(&path).await?;

        let append = match mode {
            ExportMode::Skip if exists => {
                tracing::debug!("Skipping existing export {}", path.display());
                return Ok(WriteOutcome {
                    path,
                    status: WriteStatus::Skipped,
                    messages_written: 0,
                });
            }
            ExportMode::Incremental => exists,
            ExportMode::Skip | ExportMode::Overwrite => false,
        };

        let ordered = ordered_messages(messages);
        if append && ordered.is_empty() {
            return Ok(WriteOutcome {
                path,
                status: WriteStatus::Appended,
                messages_written: 0,
            });
        }

        let links = self.resolve_attachments(channel_name, &ordered, target_dir).await;

        let mut buf = Vec::new();
        if !append {
            write_header(&mut buf, channel_name)?;
        }
        for (message, replies) in &ordered {
            render_message(&mut buf, message, replies, users, &links)?;
        }

        let mut file = if append {
            tokio::fs::OpenOptions::new().append(true).open(&path).await
        } else {
            tokio::fs::File::create(&path).await
        }
        .map_err(|source| ExportError::Open {
            path: path.clone(),
            source,
        })?;

        let write = async {
            file.write_all(&buf).await?;
            file.flush().await?;
            file.sync_all().await
        };
        write.await.map_err(|source| ExportError::Write {
            path: path.clone(),
            source,
        })?;

        tracing::debug!(
            "{} {} messages to {}",
            if append { "Appended" } else { "Wrote" },
            ordered.len(),
            path.display()
        );

        Ok(WriteOutcome {
            path,
            status: if append {
                WriteStatus::Appended
            } else {
                WriteStatus::Created
            },
            messages_written: ordered.len(),
        })
    }

    async fn resolve_attachments(
        &self,
        channel_name: &str,
        ordered: &[(&SlackMessage, Vec<&SlackMessage>)],
        target_dir: &Path,
    ) -> HashMap<String, AttachmentLink> {
        let mut links = HashMap::new();
        let files: Vec<SlackFile> = ordered
            .iter()
            .flat_map(|(message, replies)| std::iter::once(*message).chain(replies.iter().copied()))
            .flat_map(|m| m.files.iter().cloned())
            .collect();

        for file in &files {
            if links.contains_key(&file.id) {
                continue;
            }
            let link = if self.download_attachments {
                match self.download_attachment(file, channel_name, target_dir).await {
                    Ok(relative) => AttachmentLink::Local(relative),
                    Err(e) => {
                        tracing::warn!("Failed to download attachment {}: {}", file.name, e);
                        AttachmentLink::Failed(file.url_private.clone())
                    }
                }
            } else {
                AttachmentLink::Remote(file.url_private.clone())
            };
            links.insert(file.id.clone(), link);
        }
        links
    }

    /// Download into `attachments/<channel>/<id>_<name>`, reusing an existing copy.
    /// Returns the path relative to `target_dir`.
    async fn download_attachment(
        &self,
        file: &SlackFile,
        channel_name: &str,
        target_dir: &Path,
    ) -> Result<String, ExportError> {
        let channel_dir = sanitize_filename(channel_name);
        let filename = format!("{}_{}", file.id, sanitize_filename(&file.name));
        let relative = format!("{}/{}/{}", ATTACHMENTS_DIR, channel_dir, filename);

        let dir = target_dir.join(ATTACHMENTS_DIR).join(&channel_dir);
        let dest = dir.join(&filename);
        if tokio::fs::try_exists(&dest).await? {
            return Ok(relative);
        }

        tokio::fs::create_dir_all(&dir).await?;
        let url = file.download_url();
        let bytes = with_retry(&self.retry, "files.download", || self.api.download_file(url)).await?;

        let partial = dir.join(format!("{}.part", filename));
        tokio::fs::write(&partial, &bytes).await?;
        tokio::fs::rename(&partial, &dest).await?;
        Ok(relative)
    }
}

/// Drop housekeeping messages and sort parents and replies oldest-first.
fn ordered_messages(messages: &[EnrichedMessage]) -> Vec<(&SlackMessage, Vec<&SlackMessage>)> {
    let mut ordered: Vec<_> = messages
        .iter()
        .filter(|m| !is_system_message(m.message.subtype.as_deref()))
        .map(|m| {
            let mut replies: Vec<&SlackMessage> = m
                .replies
                .iter()
                .filter(|r| !is_system_message(r.subtype.as_deref()))
                .collect();
            replies.sort_by(|a, b| a.ts.cmp(&b.ts));
            (&m.message, replies)
        })
        .collect();
    ordered.sort_by(|a, b| a.0.ts.cmp(&b.0.ts));
    ordered
}

fn write_header<W: Write>(w: &mut W, channel_name: &str) -> std::io::Result<()> {
    writeln!(w, "# {}", channel_name)?;
    writeln!(w)?;
    writeln!(w, "Exported: {}", Local::now().format(TIME_FORMAT))?;
    writeln!(w)?;
    writeln!(w, "---")?;
    writeln!(w)
}

fn render_message<W: Write>(
    w: &mut W,
    message: &SlackMessage,
    replies: &[&SlackMessage],
    users: &UserDirectory,
    links: &HashMap<String, AttachmentLink>,
) -> std::io::Result<()> {
    writeln!(w, "### {} - {}", resolve_author(message, users), format_ts(&message.ts))?;
    writeln!(w)?;
    render_body(w, message, users, links, "")?;

    for reply in replies {
        writeln!(w, "> **{}** - {}", resolve_author(reply, users), format_ts(&reply.ts))?;
        writeln!(w, "> ")?;
        render_body(w, reply, users, links, "> ")?;
    }

    writeln!(w, "---")?;
    writeln!(w)
}

fn render_body<W: Write>(
    w: &mut W,
    message: &SlackMessage,
    users: &UserDirectory,
    links: &HashMap<String, AttachmentLink>,
    prefix: &str,
) -> std::io::Result<()> {
    let text = clean_text(&message.text, users);
    if !text.is_empty() {
        for line in text.lines() {
            // a leading `#` would read back as a message header
            let escape = if line.starts_with('#') { "\\" } else { "" };
            writeln!(w, "{}{}{}", prefix, escape, line)?;
        }
        writeln!(w)?;
    }

    if !message.files.is_empty() {
        for file in &message.files {
            match links.get(&file.id) {
                Some(AttachmentLink::Local(path)) if file.is_image() => {
                    writeln!(w, "{}![{}]({})", prefix, file.name, path)?
                }
                Some(AttachmentLink::Local(path)) => writeln!(w, "{}📎 [{}]({})", prefix, file.name, path)?,
                Some(AttachmentLink::Failed(url)) => {
                    writeln!(w, "{}📎 [{}]({}) *(download failed)*", prefix, file.name, url)?
                }
                Some(AttachmentLink::Remote(url)) => writeln!(w, "{}📎 [{}]({})", prefix, file.name, url)?,
                None => writeln!(w, "{}📎 [{}]({})", prefix, file.name, file.url_private)?,
            }
        }
        writeln!(w)?;
    }
    Ok(())
}
