//! Index document types and error definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MetaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to replace index file: {0}")]
    Persist(#[from] tempfile::PersistError),

    #[error("Channel {0} not found in index")]
    ChannelNotFound(String),
}

/// Contents of `.meta/index.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelMeta>,
}

/// Sync state of one exported channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelMeta {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Export file, relative to the export root
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_at: Option<DateTime<Utc>>,
    /// Raw Slack `ts` of the newest exported message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message_ts: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_downloaded_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<AnalysisMeta>,
}

impl ChannelMeta {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }
}

/// Record of the last LLM analysis run on a channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisMeta {
    pub last_analyzed_at: DateTime<Utc>,
    pub model: String,
    pub provider: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    /// Estimated cost in USD
    pub cost: f64,
    pub language: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_fields_ignored() {
        let json = r#"{
            "last_updated": "2024-01-01T00:00:00Z",
            "channels": {
                "C1": {"id": "C1", "name": "general", "path": "general.md",
                       "message_count": 3, "color": "blue"}
            },
            "version": 2
        }"#;
        let doc: IndexDocument = serde_json::from_str(json).unwrap();
        let general = &doc.channels["C1"];
        assert_eq!(general.message_count, 3);
        assert!(general.last_message_at.is_none());
        assert!(general.analysis.is_none());
    }

    #[test]
    fn test_absent_optionals_omitted() {
        let meta = ChannelMeta::new("C1", "general");
        let json = serde_json::to_string(&meta).unwrap();
        assert!(!json.contains("analysis"));
        assert!(!json.contains("last_message_ts"));
        assert!(json.contains("\"message_count\":0"));
    }
}
