pub mod analyzer;
pub mod batch;
pub mod client;
pub mod cost;
pub mod prompts;
pub mod report;
pub mod types;

pub use analyzer::{ChannelAnalyzer, Summarizer};
pub use batch::{collect_exports, AnalyzeError, AnalyzeReport, AnalyzedChannel, BatchAnalyzer};
pub use client::{ChatModel, LlmClient};
pub use cost::calculate_cost;
pub use prompts::ChannelKind;
pub use report::write_report;
pub use types::*;
