//! In-memory Slack API used by unit tests.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use super::api::SlackApi;
use super::types::{
    HistoryPage, HistoryRequest, Page, SlackAuthInfo, SlackChannel, SlackError, SlackFile,
    SlackMessage, SlackUser,
};

type Script = VecDeque<Result<HistoryPage, SlackError>>;

/// Scripted fake: every history/replies call pops the next queued response.
/// An exhausted script answers with an empty last page.
#[derive(Default)]
pub struct FakeSlackApi {
    channels: Vec<SlackChannel>,
    users: Vec<SlackUser>,
    history: Mutex<HashMap<String, Script>>,
    replies: Mutex<HashMap<String, Script>>,
    files: HashMap<String, Vec<u8>>,
    history_requests: Mutex<Vec<HistoryRequest>>,
    list_calls: Mutex<u32>,
}

impl FakeSlackApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_channels(mut self, channels: Vec<SlackChannel>) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_users(mut self, users: Vec<SlackUser>) -> Self {
        self.users = users;
        self
    }

    pub fn with_history(self, channel_id: &str, pages: Vec<HistoryPage>) -> Self {
        push(&self.history, channel_id, pages.into_iter().map(Ok));
        self
    }

    pub fn with_history_error(self, channel_id: &str, err: SlackError) -> Self {
        push(&self.history, channel_id, std::iter::once(Err(err)));
        self
    }

    pub fn with_replies(self, thread_ts: &str, pages: Vec<HistoryPage>) -> Self {
        push(&self.replies, thread_ts, pages.into_iter().map(Ok));
        self
    }

    pub fn with_replies_error(self, thread_ts: &str, err: SlackError) -> Self {
        push(&self.replies, thread_ts, std::iter::once(Err(err)));
        self
    }

    pub fn with_file(mut self, url: &str, bytes: &[u8]) -> Self {
        self.files.insert(url.to_string(), bytes.to_vec());
        self
    }

    pub fn history_requests(&self) -> Vec<HistoryRequest> {
        self.history_requests.lock().unwrap().clone()
    }

    pub fn list_calls(&self) -> u32 {
        *self.list_calls.lock().unwrap()
    }
}

fn push(
    scripts: &Mutex<HashMap<String, Script>>,
    key: &str,
    responses: impl Iterator<Item = Result<HistoryPage, SlackError>>,
) {
    scripts
        .lock()
        .unwrap()
        .entry(key.to_string())
        .or_default()
        .extend(responses);
}

fn pop(scripts: &Mutex<HashMap<String, Script>>, key: &str) -> Result<HistoryPage, SlackError> {
    scripts
        .lock()
        .unwrap()
        .get_mut(key)
        .and_then(|script| script.pop_front())
        .unwrap_or_else(|| Ok(HistoryPage::default()))
}

#[async_trait]
impl SlackApi for FakeSlackApi {
    async fn auth_test(&self) -> Result<SlackAuthInfo, SlackError> {
        Ok(SlackAuthInfo {
            team_id: "T1".into(),
            team_name: "Acme".into(),
            user_id: "U0".into(),
            user_name: "tester".into(),
        })
    }

    async fn list_channels(&self, _cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackError> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(Page {
            items: self.channels.clone(),
            next_cursor: None,
        })
    }

    async fn list_users(&self, _cursor: Option<&str>) -> Result<Page<SlackUser>, SlackError> {
        *self.list_calls.lock().unwrap() += 1;
        Ok(Page {
            items: self.users.clone(),
            next_cursor: None,
        })
    }

    async fn conversation_history(&self, request: &HistoryRequest) -> Result<HistoryPage, SlackError> {
        self.history_requests.lock().unwrap().push(request.clone());
        pop(&self.history, &request.channel_id)
    }

    async fn conversation_replies(
        &self,
        _channel_id: &str,
        thread_ts: &str,
        _cursor: Option<&str>,
    ) -> Result<HistoryPage, SlackError> {
        pop(&self.replies, thread_ts)
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackError> {
        self.files
            .get(url)
            .cloned()
            .ok_or_else(|| SlackError::Api("bad status: 404 Not Found".into()))
    }
}

pub fn message(ts: &str, user: &str, text: &str) -> SlackMessage {
    SlackMessage {
        ts: ts.to_string(),
        user: Some(user.to_string()),
        text: text.to_string(),
        ..Default::default()
    }
}

pub fn thread_parent(ts: &str, user: &str, text: &str, reply_count: u32) -> SlackMessage {
    SlackMessage {
        thread_ts: Some(ts.to_string()),
        reply_count,
        ..message(ts, user, text)
    }
}

pub fn with_file(mut msg: SlackMessage, id: &str, name: &str, mimetype: &str) -> SlackMessage {
    msg.files.push(SlackFile {
        id: id.to_string(),
        name: name.to_string(),
        mimetype: mimetype.to_string(),
        url_private: format!("https://files.slack.test/{}", name),
        url_private_download: None,
    });
    msg
}

/// A history page; `Some(cursor)` marks more pages to come.
pub fn page(messages: Vec<SlackMessage>, next_cursor: Option<&str>) -> HistoryPage {
    HistoryPage {
        messages,
        has_more: next_cursor.is_some(),
        next_cursor: next_cursor.map(String::from),
    }
}

pub fn channel(id: &str, name: &str) -> SlackChannel {
    SlackChannel {
        id: id.to_string(),
        name: name.to_string(),
        ..Default::default()
    }
}

pub fn user(id: &str, real_name: &str) -> SlackUser {
    SlackUser {
        id: id.to_string(),
        name: real_name.to_lowercase(),
        real_name: Some(real_name.to_string()),
        display_name: None,
        is_bot: false,
        deleted: false,
    }
}
