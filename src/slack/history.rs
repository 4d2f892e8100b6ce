//! Channel history fetching with thread expansion.

use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use super::api::SlackApi;
use super::retry::{with_retry, RetryPolicy};
use super::types::{EnrichedMessage, HistoryRequest, SlackError, SlackMessage};

pub const DEFAULT_PAGE_SIZE: u32 = 200;
pub const DEFAULT_PAGE_DELAY_MS: u64 = 100;

/// Progress tick emitted while a channel is being fetched.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchProgress {
    /// Messages fetched so far (top-level plus replies)
    pub items: usize,
    /// Always 0: Slack does not report a total up front
    pub total_known: usize,
    pub status: String,
}

pub struct HistoryFetcher {
    api: Arc<dyn SlackApi>,
    retry: RetryPolicy,
    page_size: u32,
    page_delay: Duration,
}

impl HistoryFetcher {
    pub fn new(api: Arc<dyn SlackApi>, retry: RetryPolicy) -> Self {
        Self {
            api,
            retry,
            page_size: DEFAULT_PAGE_SIZE,
            page_delay: Duration::from_millis(DEFAULT_PAGE_DELAY_MS),
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Fetch every message of a channel newer than `since`, with threads attached.
    ///
    /// Messages keep the order the API returned them in. Any error that
    /// survives the retry policy aborts the whole fetch.
    pub async fn fetch_history(
        &self,
        channel_id: &str,
        since: Option<&str>,
        progress: &mut (dyn FnMut(FetchProgress) + Send),
        cancel: &CancellationToken,
    ) -> Result<Vec<EnrichedMessage>, SlackError> {
        let mut enriched: Vec<EnrichedMessage> = Vec::new();
        let mut items = 0usize;
        let mut cursor: Option<String> = None;
        let mut page_number = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(SlackError::Cancelled);
            }

            let request = HistoryRequest {
                channel_id: channel_id.to_string(),
                oldest: since.map(String::from),
                cursor: cursor.clone(),
                limit: self.page_size,
            };
            let page = with_retry(&self.retry, "conversations.history", || {
                self.api.conversation_history(&request)
            })
            .await?;
            page_number += 1;

            tracing::debug!(
                "Got {} messages from channel {} (page {}, has_more: {})",
                page.messages.len(),
                channel_id,
                page_number,
                page.has_more
            );

            items += page.messages.len();
            progress(FetchProgress {
                items,
                total_known: 0,
                status: format!("Fetched page {}", page_number),
            });

            let is_last = page.is_last();
            let next_cursor = page.next_cursor;

            for message in page.messages {
                let mut entry = EnrichedMessage::new(message);
                if entry.message.has_replies() {
                    if cancel.is_cancelled() {
                        return Err(SlackError::Cancelled);
                    }
                    entry.replies = self.fetch_thread(channel_id, &entry.message).await?;
                    items += entry.replies.len();
                    progress(FetchProgress {
                        items,
                        total_known: 0,
                        status: format!("Fetched thread {}", entry.message.ts),
                    });
                }
                enriched.push(entry);
            }

            if is_last {
                break;
            }
            cursor = next_cursor;
            sleep(self.page_delay).await;
        }

        Ok(enriched)
    }

    /// All replies of a thread, excluding the parent the API echoes back.
    async fn fetch_thread(&self, channel_id: &str, parent: &SlackMessage) -> Result<Vec<SlackMessage>, SlackError> {
        let thread_ts = parent.thread_ts.as_deref().unwrap_or(&parent.ts);
        let mut replies = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = with_retry(&self.retry, "conversations.replies", || {
                self.api
                    .conversation_replies(channel_id, thread_ts, cursor.as_deref())
            })
            .await?;

            let is_last = page.is_last();
            replies.extend(page.messages.into_iter().filter(|m| m.ts != parent.ts));

            if is_last {
                break;
            }
            cursor = page.next_cursor;
        }

        Ok(replies)
    }
}
