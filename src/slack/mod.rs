//! Slack Web API access: client, retry, history fetching and workspace cache.

mod api;
mod cache;
mod client;
mod history;
mod retry;
mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use api::SlackApi;
pub use cache::{UserDirectory, WorkspaceCache, DEFAULT_CACHE_TTL};
pub use client::SlackClient;
pub use history::{FetchProgress, HistoryFetcher, DEFAULT_PAGE_DELAY_MS, DEFAULT_PAGE_SIZE};
pub use retry::{with_retry, RetryPolicy};
pub use types::*;
