use async_trait::async_trait;

use super::types::{
    HistoryPage, HistoryRequest, Page, SlackAuthInfo, SlackChannel, SlackError, SlackUser,
};

/// The subset of the Slack Web API the exporter depends on.
///
/// Every method performs exactly one remote call so that callers can wrap it
/// in [`with_retry`](super::retry::with_retry) individually.
#[async_trait]
pub trait SlackApi: Send + Sync {
    async fn auth_test(&self) -> Result<SlackAuthInfo, SlackError>;

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackError>;

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<SlackUser>, SlackError>;

    async fn conversation_history(&self, request: &HistoryRequest) -> Result<HistoryPage, SlackError>;

    /// One page of a thread. The first message of the first page is the parent.
    async fn conversation_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, SlackError>;

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackError>;
}
