//! Slack Web API client

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE, RETRY_AFTER};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use super::api::SlackApi;
use super::types::{
    HistoryPage, HistoryRequest, Page, SlackAuthInfo, SlackChannel, SlackError, SlackMessage,
    SlackUser,
};

const SLACK_API_BASE: &str = "https://slack.com/api";
const CHANNEL_TYPES: &str = "public_channel,private_channel,mpim,im";
const REQUEST_TIMEOUT_SECS: u64 = 60;

pub struct SlackClient {
    http: Client,
    token: String,
    session_cookie: Option<String>,
    team_id: Option<String>,
    base_url: String,
}

impl SlackClient {
    pub fn new(token: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            token,
            session_cookie: None,
            team_id: None,
            base_url: SLACK_API_BASE.to_string(),
        }
    }

    /// Browser session tokens (`xoxc-`) are only accepted together with the `d` cookie.
    pub fn with_session_cookie(mut self, cookie: Option<String>) -> Self {
        self.session_cookie = cookie.filter(|c| !c.is_empty());
        self
    }

    /// Set the team ID (required for Enterprise Grid workspaces)
    pub fn with_team_id(mut self, team_id: String) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder.bearer_auth(&self.token);
        match self
            .session_cookie
            .as_deref()
            .and_then(|c| HeaderValue::from_str(&format!("d={}", c)).ok())
        {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        }
    }

    /// Issue a GET against a Web API method and unwrap the `ok` envelope.
    async fn call(&self, method: &str, params: &[(&str, String)]) -> Result<serde_json::Value, SlackError> {
        let request = self
            .http
            .get(format!("{}/{}", self.base_url, method))
            .query(params);
        let response = self.authorize(request).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlackError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }

        if !response.status().is_success() {
            return Err(SlackError::Api(format!("HTTP {}", response.status())));
        }

        let json: serde_json::Value = response.json().await?;
        check_envelope(json)
    }

    fn team_param(&self, params: &mut Vec<(&'static str, String)>) {
        if let Some(ref tid) = self.team_id {
            params.push(("team_id", tid.clone()));
        }
    }
}

fn check_envelope(json: serde_json::Value) -> Result<serde_json::Value, SlackError> {
    if json["ok"].as_bool().unwrap_or(false) {
        return Ok(json);
    }
    let error = json["error"].as_str().unwrap_or("Unknown error").to_string();
    Err(match error.as_str() {
        "ratelimited" | "rate_limited" => SlackError::RateLimited { retry_after: None },
        "invalid_auth" | "not_authed" | "token_revoked" | "token_expired" | "account_inactive" => {
            SlackError::Auth(error)
        }
        _ => SlackError::Api(error),
    })
}

fn next_cursor(json: &serde_json::Value) -> Option<String> {
    json["response_metadata"]["next_cursor"]
        .as_str()
        .filter(|c| !c.is_empty())
        .map(String::from)
}

fn parse_list<T: DeserializeOwned>(json: &serde_json::Value, key: &str) -> Result<Vec<T>, SlackError> {
    match json.get(key) {
        Some(value) if !value.is_null() => serde_json::from_value(value.clone())
            .map_err(|e| SlackError::Parse(format!("{}: {}", key, e))),
        _ => Ok(Vec::new()),
    }
}

fn parse_history(json: serde_json::Value) -> Result<HistoryPage, SlackError> {
    let messages: Vec<SlackMessage> = parse_list(&json, "messages")?;
    Ok(HistoryPage {
        messages,
        has_more: json["has_more"].as_bool().unwrap_or(false),
        next_cursor: next_cursor(&json),
    })
}

fn parse_channel(ch: &serde_json::Value) -> SlackChannel {
    let is_private = ch["is_private"].as_bool().unwrap_or(false);
    let is_group = ch["is_group"].as_bool().unwrap_or(false);
    SlackChannel {
        id: ch["id"].as_str().unwrap_or_default().to_string(),
        name: ch["name"].as_str().unwrap_or_default().to_string(),
        is_archived: ch["is_archived"].as_bool().unwrap_or(false),
        // Private channels can have is_private=true OR is_group=true (legacy)
        is_private: is_private || is_group,
        is_im: ch["is_im"].as_bool().unwrap_or(false),
        is_mpim: ch["is_mpim"].as_bool().unwrap_or(false),
        user: ch["user"].as_str().map(String::from),
        member_count: ch["num_members"].as_i64(),
        topic: ch["topic"]["value"].as_str().filter(|s| !s.is_empty()).map(String::from),
        purpose: ch["purpose"]["value"].as_str().filter(|s| !s.is_empty()).map(String::from),
    }
}

fn parse_user(user: &serde_json::Value) -> SlackUser {
    SlackUser {
        id: user["id"].as_str().unwrap_or_default().to_string(),
        name: user["name"].as_str().unwrap_or_default().to_string(),
        real_name: user["real_name"].as_str().map(String::from),
        display_name: user["profile"]["display_name"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(String::from),
        is_bot: user["is_bot"].as_bool().unwrap_or(false),
        deleted: user["deleted"].as_bool().unwrap_or(false),
    }
}

#[async_trait]
impl SlackApi for SlackClient {
    /// Test the token and get auth info (team, user)
    async fn auth_test(&self) -> Result<SlackAuthInfo, SlackError> {
        let json = self.call("auth.test", &[]).await?;
        Ok(SlackAuthInfo {
            team_id: json["team_id"].as_str().unwrap_or_default().to_string(),
            team_name: json["team"].as_str().unwrap_or_default().to_string(),
            user_id: json["user_id"].as_str().unwrap_or_default().to_string(),
            user_name: json["user"].as_str().unwrap_or_default().to_string(),
        })
    }

    async fn list_channels(&self, cursor: Option<&str>) -> Result<Page<SlackChannel>, SlackError> {
        let mut params = vec![
            ("types", CHANNEL_TYPES.to_string()),
            ("limit", "1000".to_string()),
            ("exclude_archived", "false".to_string()),
        ];
        self.team_param(&mut params);
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let json = self.call("conversations.list", &params).await?;
        let items = json["channels"]
            .as_array()
            .map(|channels| channels.iter().map(parse_channel).collect())
            .unwrap_or_default();

        Ok(Page {
            items,
            next_cursor: next_cursor(&json),
        })
    }

    async fn list_users(&self, cursor: Option<&str>) -> Result<Page<SlackUser>, SlackError> {
        let mut params = vec![("limit", "200".to_string())];
        self.team_param(&mut params);
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let json = self.call("users.list", &params).await?;
        let items = json["members"]
            .as_array()
            .map(|users| users.iter().map(parse_user).collect())
            .unwrap_or_default();

        Ok(Page {
            items,
            next_cursor: next_cursor(&json),
        })
    }

    async fn conversation_history(&self, request: &HistoryRequest) -> Result<HistoryPage, SlackError> {
        let mut params = vec![
            ("channel", request.channel_id.clone()),
            ("limit", request.limit.to_string()),
        ];
        if let Some(ref ts) = request.oldest {
            params.push(("oldest", ts.clone()));
        }
        if let Some(ref c) = request.cursor {
            params.push(("cursor", c.clone()));
        }

        let json = self.call("conversations.history", &params).await?;
        parse_history(json)
    }

    async fn conversation_replies(
        &self,
        channel_id: &str,
        thread_ts: &str,
        cursor: Option<&str>,
    ) -> Result<HistoryPage, SlackError> {
        let mut params = vec![
            ("channel", channel_id.to_string()),
            ("ts", thread_ts.to_string()),
            ("limit", "200".to_string()),
        ];
        if let Some(c) = cursor {
            params.push(("cursor", c.to_string()));
        }

        let json = self.call("conversations.replies", &params).await?;
        parse_history(json)
    }

    async fn download_file(&self, url: &str) -> Result<Vec<u8>, SlackError> {
        let response = self.authorize(self.http.get(url)).send().await?;

        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(SlackError::RateLimited {
                retry_after: retry_after(response.headers()),
            });
        }
        if !response.status().is_success() {
            return Err(SlackError::Api(format!("bad status: {}", response.status())));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

/// Seconds from a `Retry-After` header, if present and numeric.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
