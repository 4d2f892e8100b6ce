//! Slack data types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SlackError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error: {0}")]
    Api(String),

    #[error("Rate limited (HTTP 429)")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Max retries ({retries}) exceeded for {operation}: {source}")]
    RetriesExhausted {
        operation: String,
        retries: u32,
        #[source]
        source: Box<SlackError>,
    },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SlackError {
    /// Classifies the error as a rate-limit signal.
    ///
    /// Returns `None` for errors that must not be retried, `Some(None)` for a
    /// rate limit without a server-provided delay and `Some(Some(d))` when the
    /// API asked for a specific wait.
    pub fn rate_limit_delay(&self) -> Option<Option<Duration>> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            Self::RetriesExhausted { .. } | Self::Cancelled => None,
            other => {
                let text = other.to_string();
                if text.contains("rate_limited") || text.contains("ratelimited") || text.contains("429") {
                    Some(None)
                } else {
                    None
                }
            }
        }
    }
}

/// Auth test response info
#[derive(Debug, Clone)]
pub struct SlackAuthInfo {
    pub team_id: String,
    pub team_name: String,
    pub user_id: String,
    pub user_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackChannel {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub is_archived: bool,
    #[serde(default)]
    pub is_private: bool,
    #[serde(default)]
    pub is_im: bool,
    #[serde(default)]
    pub is_mpim: bool,
    /// For DMs (is_im=true), this is the user ID of the other person
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub member_count: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<String>,
}

impl SlackChannel {
    pub fn is_dm(&self) -> bool {
        self.is_im || self.is_mpim
    }

    /// Name used for display and for the export file.
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Slack user info
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackUser {
    pub id: String,
    pub name: String,
    pub real_name: Option<String>,
    pub display_name: Option<String>,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub deleted: bool,
}

impl SlackUser {
    /// Preferred human-readable name: real name, then display name, then handle.
    pub fn best_name(&self) -> &str {
        self.real_name
            .as_deref()
            .filter(|s| !s.is_empty())
            .or(self.display_name.as_deref().filter(|s| !s.is_empty()))
            .unwrap_or(&self.name)
    }
}

/// A file shared in a message.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackFile {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub mimetype: String,
    #[serde(default)]
    pub url_private: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_private_download: Option<String>,
}

impl SlackFile {
    pub fn download_url(&self) -> &str {
        self.url_private_download
            .as_deref()
            .filter(|u| !u.is_empty())
            .unwrap_or(&self.url_private)
    }

    pub fn is_image(&self) -> bool {
        self.mimetype.starts_with("image/")
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    pub ts: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_ts: Option<String>,
    #[serde(default)]
    pub reply_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<SlackFile>,
}

impl SlackMessage {
    pub fn has_replies(&self) -> bool {
        self.reply_count > 0
    }
}

/// A top-level message together with its thread replies.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrichedMessage {
    pub message: SlackMessage,
    pub replies: Vec<SlackMessage>,
}

impl EnrichedMessage {
    pub fn new(message: SlackMessage) -> Self {
        Self {
            message,
            replies: Vec::new(),
        }
    }
}

/// One page of a cursor-paginated list.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_cursor: Option<String>,
}

/// One page of `conversations.history` or `conversations.replies`.
#[derive(Debug, Clone, Default)]
pub struct HistoryPage {
    pub messages: Vec<SlackMessage>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

impl HistoryPage {
    pub fn is_last(&self) -> bool {
        !self.has_more || self.next_cursor.is_none()
    }
}

/// Parameters for a `conversations.history` call.
#[derive(Debug, Clone)]
pub struct HistoryRequest {
    pub channel_id: String,
    pub oldest: Option<String>,
    pub cursor: Option<String>,
    pub limit: u32,
}

/// Convert a Slack `ts` ("1700000000.123456") to a UTC timestamp.
pub fn ts_to_datetime(ts: &str) -> Option<DateTime<Utc>> {
    let (secs, frac) = ts.split_once('.').unwrap_or((ts, "0"));
    let secs: i64 = secs.parse().ok()?;
    let micros: u32 = format!("{:0<6}", frac).get(..6)?.parse().ok()?;
    DateTime::from_timestamp(secs, micros * 1000)
}

/// Inverse of [`ts_to_datetime`], microsecond precision.
pub fn datetime_to_ts(time: &DateTime<Utc>) -> String {
    format!("{}.{:06}", time.timestamp(), time.timestamp_subsec_micros())
}

/// Subtypes that are channel housekeeping rather than conversation.
pub fn is_system_message(subtype: Option<&str>) -> bool {
    matches!(
        subtype,
        Some(
            "channel_join"
                | "channel_leave"
                | "channel_purpose"
                | "channel_topic"
                | "channel_name"
                | "channel_archive"
                | "channel_unarchive"
                | "group_join"
                | "group_leave"
                | "group_purpose"
                | "group_topic"
                | "group_name"
                | "group_archive"
                | "group_unarchive"
                | "pinned_item"
                | "unpinned_item"
                | "ekm_access_denied"
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slack_error_display() {
        let err = SlackError::Auth("invalid_auth".into());
        assert_eq!(err.to_string(), "Authentication error: invalid_auth");

        let err = SlackError::Api("channel_not_found".into());
        assert_eq!(err.to_string(), "API error: channel_not_found");
    }

    #[test]
    fn test_rate_limit_classification() {
        let explicit = SlackError::RateLimited {
            retry_after: Some(Duration::from_secs(3)),
        };
        assert_eq!(explicit.rate_limit_delay(), Some(Some(Duration::from_secs(3))));

        let textual = SlackError::Api("ratelimited".into());
        assert_eq!(textual.rate_limit_delay(), Some(None));

        let status = SlackError::Api("HTTP 429 Too Many Requests".into());
        assert_eq!(status.rate_limit_delay(), Some(None));

        let other = SlackError::Api("not_in_channel".into());
        assert_eq!(other.rate_limit_delay(), None);
    }

    #[test]
    fn test_exhausted_is_not_retryable() {
        let err = SlackError::RetriesExhausted {
            operation: "conversations.history".into(),
            retries: 5,
            source: Box::new(SlackError::RateLimited { retry_after: None }),
        };
        assert_eq!(err.rate_limit_delay(), None);
        assert!(err.to_string().contains("conversations.history"));
    }

    #[test]
    fn test_message_deserialize_defaults() {
        let json = r#"{"ts": "1700000000.000100", "text": "hi"}"#;
        let msg: SlackMessage = serde_json::from_str(json).unwrap();
        assert_eq!(msg.reply_count, 0);
        assert!(msg.files.is_empty());
        assert!(msg.user.is_none());
        assert!(!msg.has_replies());
    }

    #[test]
    fn test_message_with_files() {
        let json = r#"{
            "ts": "1700000000.000100",
            "user": "U123",
            "text": "see attached",
            "reply_count": 2,
            "files": [{"id": "F1", "name": "a.png", "mimetype": "image/png",
                       "url_private": "https://files/a.png",
                       "url_private_download": "https://files/download/a.png"}]
        }"#;
        let msg: SlackMessage = serde_json::from_str(json).unwrap();
        assert!(msg.has_replies());
        assert_eq!(msg.files.len(), 1);
        assert!(msg.files[0].is_image());
        assert_eq!(msg.files[0].download_url(), "https://files/download/a.png");
    }

    #[test]
    fn test_file_download_url_falls_back() {
        let file = SlackFile {
            id: "F1".into(),
            name: "doc.pdf".into(),
            mimetype: "application/pdf".into(),
            url_private: "https://files/doc.pdf".into(),
            url_private_download: Some(String::new()),
        };
        assert_eq!(file.download_url(), "https://files/doc.pdf");
        assert!(!file.is_image());
    }

    #[test]
    fn test_user_best_name() {
        let user = SlackUser {
            id: "U1".into(),
            name: "jdoe".into(),
            real_name: Some(String::new()),
            display_name: Some("John".into()),
            is_bot: false,
            deleted: false,
        };
        assert_eq!(user.best_name(), "John");
    }

    #[test]
    fn test_channel_display_name_for_dm() {
        let channel = SlackChannel {
            id: "D123".into(),
            is_im: true,
            ..Default::default()
        };
        assert!(channel.is_dm());
        assert_eq!(channel.display_name(), "D123");
    }

    #[test]
    fn test_system_messages() {
        assert!(is_system_message(Some("channel_join")));
        assert!(is_system_message(Some("pinned_item")));
        assert!(!is_system_message(Some("bot_message")));
        assert!(!is_system_message(Some("me_message")));
        assert!(!is_system_message(None));
    }

    #[test]
    fn test_ts_conversion() {
        let time = ts_to_datetime("1700000000.123456").unwrap();
        assert_eq!(time.timestamp(), 1_700_000_000);
        assert_eq!(time.timestamp_subsec_micros(), 123_456);
        assert_eq!(datetime_to_ts(&time), "1700000000.123456");

        assert_eq!(ts_to_datetime("1700000000").unwrap().timestamp(), 1_700_000_000);
        assert_eq!(ts_to_datetime("1.5").unwrap().timestamp_subsec_micros(), 500_000);
        assert!(ts_to_datetime("not-a-ts").is_none());
    }

    #[test]
    fn test_history_page_is_last() {
        let page = HistoryPage {
            messages: vec![],
            has_more: true,
            next_cursor: None,
        };
        assert!(page.is_last());
    }
}
