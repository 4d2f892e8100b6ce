use thiserror::Error;

use crate::ai::LlmError;
use crate::cli::SelectionError;
use crate::config::ConfigError;
use crate::export::ExportError;
use crate::meta::MetaError;
use crate::slack::SlackError;

/// Errors that stop a command before any channel work starts.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Slack: {0}")]
    Slack(#[from] SlackError),
    #[error("Index: {0}")]
    Meta(#[from] MetaError),
    #[error("Export: {0}")]
    Export(#[from] ExportError),
    #[error("LLM: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Selection(#[from] SelectionError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}
