//! Slack channel history export with incremental sync and LLM summaries.

pub mod ai;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod export;
pub mod meta;
pub mod slack;
pub mod sync;

pub use error::AppError;
