//! Export types and error definitions

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to create directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Download failed: {0}")]
    Download(#[from] crate::slack::SlackError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to do when the export file already exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Leave existing exports untouched
    Skip,
    /// Append only messages newer than the last export
    #[default]
    Incremental,
    /// Rewrite the export from scratch
    Overwrite,
}

impl fmt::Display for ExportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExportMode::Skip => "skip",
            ExportMode::Incremental => "incremental",
            ExportMode::Overwrite => "overwrite",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteStatus {
    /// File created or truncated, header written
    Created,
    /// Messages appended to an existing file
    Appended,
    /// Existing file left alone
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    pub path: PathBuf,
    pub status: WriteStatus,
    /// Top-level messages written in this call
    pub messages_written: usize,
}
