//! Slack mrkdwn to Markdown conversion and author resolution.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::slack::{SlackMessage, UserDirectory};

static USER_MENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<@([UW][A-Z0-9]+)(?:\|([^>]+))?>").unwrap());
static CHANNEL_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<#([CG][A-Z0-9]+)(?:\|([^>]*))?>").unwrap());
static LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<((?:https?|mailto):[^|>]+)(?:\|([^>]+))?>").unwrap());
static SPECIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!([a-z]+)(?:\^[^|>]*)?(?:\|([^>]+))?>").unwrap());
static STRIKE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"~([^~\n]+)~").unwrap());

/// Placeholder for a user that is not in the directory: `User` plus the last
/// four characters of the ID.
pub fn masked_name(user_id: &str) -> String {
    let start = user_id
        .char_indices()
        .rev()
        .nth(3)
        .map(|(i, _)| i)
        .unwrap_or(0);
    format!("User {}", &user_id[start..])
}

/// Name shown in the message header.
pub fn resolve_author(message: &SlackMessage, users: &UserDirectory) -> String {
    if let Some(name) = message
        .user
        .as_deref()
        .and_then(|id| users.get(id))
        .filter(|n| !n.is_empty())
    {
        return name.to_string();
    }
    if message.bot_id.is_some() {
        if let Some(username) = message.username.as_deref().filter(|n| !n.is_empty()) {
            return username.to_string();
        }
    }
    match message.user.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => masked_name(id),
        None => "Unknown".to_string(),
    }
}

/// Convert Slack's mrkdwn to standard Markdown.
pub fn clean_text(text: &str, users: &UserDirectory) -> String {
    let text = USER_MENTION.replace_all(text, |caps: &Captures| {
        if let Some(label) = caps.get(2) {
            return format!("@{}", label.as_str());
        }
        let id = &caps[1];
        match users.get(id) {
            Some(name) if !name.is_empty() => format!("@{}", name),
            _ => format!("@{}", masked_name(id)),
        }
    });

    let text = CHANNEL_REF.replace_all(&text, |caps: &Captures| match caps.get(2) {
        Some(name) if !name.as_str().is_empty() => format!("#{}", name.as_str()),
        _ => format!("#{}", &caps[1]),
    });

    let text = LINK.replace_all(&text, |caps: &Captures| match caps.get(2) {
        Some(label) => format!("[{}]({})", label.as_str(), &caps[1]),
        None => caps[1].to_string(),
    });

    let text = SPECIAL.replace_all(&text, |caps: &Captures| match &caps[1] {
        keyword @ ("here" | "channel" | "everyone") => format!("@{}", keyword),
        other => match caps.get(2) {
            Some(label) => format!("@{}", label.as_str()),
            None => format!("@{}", other),
        },
    });

    let text = unescape_html(&text);
    STRIKE.replace_all(&text, "~~$1~~").into_owned()
}

/// Slack only escapes `&`, `<` and `>`; the quote entities show up in pasted content.
fn unescape_html(text: &str) -> String {
    if !text.contains('&') {
        return text.to_string();
    }
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
