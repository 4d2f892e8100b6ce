//! Recovers sync state from existing Markdown exports.

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use super::writer::ATTACHMENTS_DIR;

static MESSAGE_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^### .* - (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2})$").unwrap());

pub const ANALYSIS_SUFFIX: &str = "_analysis.md";

/// What could be read back out of one export file.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    /// Number of top-level message headers
    pub message_count: usize,
    /// Time of the newest message header, second precision
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScannedExport {
    pub channel_name: String,
    /// Relative to the scanned root, `/`-separated
    pub relative_path: String,
    pub file_size: u64,
    pub summary: ExportSummary,
}

/// Parse the message headers of an export.
pub fn parse_export(content: &str) -> ExportSummary {
    let mut message_count = 0;
    let mut last: Option<NaiveDateTime> = None;

    for line in content.lines().filter(|l| l.starts_with("### ")) {
        message_count += 1;
        if let Some(caps) = MESSAGE_HEADER.captures(line) {
            if let Ok(time) = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M:%S") {
                last = Some(last.map_or(time, |prev| prev.max(time)));
            }
        }
    }

    ExportSummary {
        message_count,
        last_message_at: last.and_then(|t| {
            Local
                .from_local_datetime(&t)
                .earliest()
                .map(|local| local.with_timezone(&Utc))
        }),
    }
}

/// `path` relative to `root` with `/` separators, as stored in the index.
pub fn relative_path(path: &Path, root: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Summarize an export on disk. Invalid UTF-8 (e.g. a tail cut mid-character)
/// is replaced rather than rejected so the headers before it still count.
pub async fn scan_file(path: &Path) -> std::io::Result<ExportSummary> {
    let bytes = tokio::fs::read(path).await?;
    Ok(parse_export(&String::from_utf8_lossy(&bytes)))
}

/// Walk `root` for channel exports, skipping hidden directories, attachments
/// and analysis reports. Unreadable files are logged and left out.
pub fn scan_export_dir(root: &Path) -> std::io::Result<Vec<ScannedExport>> {
    let mut found = Vec::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let name = entry.file_name().to_string_lossy().to_string();

            if entry.file_type()?.is_dir() {
                if !name.starts_with('.') && name != ATTACHMENTS_DIR {
                    pending.push(path);
                }
                continue;
            }

            if !name.ends_with(".md") || name.ends_with(ANALYSIS_SUFFIX) {
                continue;
            }

            let bytes = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!("Failed to read {}: {}", path.display(), e);
                    continue;
                }
            };

            found.push(ScannedExport {
                channel_name: name.trim_end_matches(".md").to_string(),
                relative_path: relative_path(&path, root),
                file_size: bytes.len() as u64,
                summary: parse_export(&String::from_utf8_lossy(&bytes)),
            });
        }
    }

    found.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(found)
}
