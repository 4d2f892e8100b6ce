//! Three-pass LLM analysis of an exported channel: topics, contributors, summary.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::Arc;

use super::client::ChatModel;
use super::prompts::{self, ChannelKind};
use super::types::{AnalysisResult, ChatMessage, Contributor, LlmError, Topic, Usage};
use crate::export::parse_export;

/// Budget for the JSON extraction passes.
const EXTRACTION_CHARS: usize = 15_000;
/// The summary prompt carries the topic list too, so it gets less conversation.
const SUMMARY_CHARS: usize = 12_000;
const TEMPERATURE: f32 = 0.2;
/// Reasoning models spend output tokens on thinking.
const MAX_TOKENS: u32 = 16_000;

const TRUNCATION_MARKER: &str = "\n\n[... content truncated ...]";

/// Produces an analysis for one exported channel.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, channel_name: &str, content: &str) -> Result<AnalysisResult, LlmError>;
}

pub struct ChannelAnalyzer {
    model: Arc<dyn ChatModel>,
    language: String,
}

impl ChannelAnalyzer {
    pub fn new(model: Arc<dyn ChatModel>, language: impl Into<String>) -> Self {
        Self {
            model,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    async fn ask(&self, system: &str, prompt: String, usage: &mut Usage) -> Result<String, LlmError> {
        let messages = [ChatMessage::system(system), ChatMessage::user(prompt)];
        let completion = self.model.chat(&messages, TEMPERATURE, MAX_TOKENS).await?;
        *usage += completion.usage;
        Ok(completion.text)
    }
}

#[async_trait]
impl Summarizer for ChannelAnalyzer {
    async fn summarize(&self, channel_name: &str, content: &str) -> Result<AnalysisResult, LlmError> {
        let mut usage = Usage::default();
        let excerpt = truncate_for_llm(content, EXTRACTION_CHARS);

        tracing::info!("Extracting topics for #{}", channel_name);
        let response = self
            .ask(prompts::TOPICS_SYSTEM, prompts::topics_prompt(excerpt.as_ref()), &mut usage)
            .await?;
        let topics = parse_topics(&response);

        tracing::info!("Analyzing contributors for #{}", channel_name);
        let response = self
            .ask(
                prompts::CONTRIBUTORS_SYSTEM,
                prompts::contributors_prompt(excerpt.as_ref()),
                &mut usage,
            )
            .await?;
        let contributors = parse_contributors(&response);

        tracing::info!("Writing {} summary for #{}", self.language, channel_name);
        let kind = ChannelKind::classify(channel_name);
        let prompt = prompts::summary_prompt(
            channel_name,
            &topics,
            kind,
            &self.language,
            truncate_for_llm(content, SUMMARY_CHARS).as_ref(),
        );
        let summary = self
            .ask(&prompts::summary_system(&self.language), prompt, &mut usage)
            .await?;

        Ok(AnalysisResult {
            channel_name: channel_name.to_string(),
            total_messages: parse_export(content).message_count,
            topics,
            contributors,
            summary: summary.trim().to_string(),
            usage,
        })
    }
}

/// Cut `content` to at most `max_bytes`, preferring the last newline when it
/// falls in the second half of the budget.
pub fn truncate_for_llm(content: &str, max_bytes: usize) -> std::borrow::Cow<'_, str> {
    if content.len() <= max_bytes {
        return content.into();
    }
    let mut end = max_bytes;
    while end > 0 && !content.is_char_boundary(end) {
        end -= 1;
    }
    let mut truncated = &content[..end];
    if let Some(newline) = truncated.rfind('\n') {
        if newline > max_bytes / 2 {
            truncated = &truncated[..newline];
        }
    }
    format!("{truncated}{TRUNCATION_MARKER}").into()
}

/// Strip a surrounding markdown code fence, if any.
pub fn extract_json(response: &str) -> &str {
    let mut s = response.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest;
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

#[derive(Deserialize)]
struct TopicsEnvelope {
    #[serde(default)]
    topics: Vec<Topic>,
}

#[derive(Deserialize)]
struct ContributorsEnvelope {
    #[serde(default)]
    contributors: Vec<Contributor>,
}

/// Malformed model output degrades to an empty section rather than failing the analysis.
fn parse_lenient<T: DeserializeOwned>(response: &str, what: &str) -> Option<T> {
    match serde_json::from_str(extract_json(response)) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            tracing::warn!("Could not parse {} from model response: {}", what, e);
            None
        }
    }
}

pub fn parse_topics(response: &str) -> Vec<Topic> {
    let mut topics = parse_lenient::<TopicsEnvelope>(response, "topics")
        .map(|e| e.topics)
        .unwrap_or_default();
    topics.sort_by(|a, b| b.importance.cmp(&a.importance));
    topics
}

pub fn parse_contributors(response: &str) -> Vec<Contributor> {
    let mut contributors = parse_lenient::<ContributorsEnvelope>(response, "contributors")
        .map(|e| e.contributors)
        .unwrap_or_default();
    contributors.sort_by(|a, b| b.message_count.cmp(&a.message_count));
    contributors
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::ai::types::{Completion, Provider};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replies with canned completions in order and records every prompt.
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<Completion, LlmError>>>,
        pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<Result<Completion, LlmError>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }

        pub fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> Result<Completion, LlmError> {
            Ok(Completion {
                text: text.to_string(),
                usage: Usage {
                    input_tokens,
                    output_tokens,
                },
            })
        }
    }

    #[async_trait]
    impl ChatModel for ScriptedModel {
        async fn chat(&self, messages: &[ChatMessage], _: f32, _: u32) -> Result<Completion, LlmError> {
            self.prompts.lock().unwrap().push(messages.to_vec());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Api("script exhausted".into())))
        }

        fn provider(&self) -> Provider {
            Provider::OpenAi
        }

        fn model(&self) -> &str {
            "gpt-4o-mini"
        }
    }
}
