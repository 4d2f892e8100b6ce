//! Chat completion client for OpenAI-compatible and Gemini endpoints.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::types::{ChatMessage, Completion, LlmError, Provider, Usage};

const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A model that answers a chat conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError>;

    fn provider(&self) -> Provider;

    fn model(&self) -> &str;
}

pub struct LlmClient {
    http: Client,
    provider: Provider,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(provider: Provider, api_key: String) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .unwrap_or_default();
        Self {
            http,
            provider,
            api_key,
            base_url: provider.default_base_url().to_string(),
            model: provider.default_model().to_string(),
        }
    }

    /// Set the model to use. Empty keeps the provider default.
    pub fn with_model(mut self, model: Option<&str>) -> Self {
        if let Some(model) = model.filter(|m| !m.trim().is_empty()) {
            self.model = model.trim().to_string();
        }
        self
    }

    pub fn with_base_url(mut self, base_url: Option<&str>) -> Self {
        if let Some(url) = base_url.filter(|u| !u.trim().is_empty()) {
            self.base_url = url.trim().trim_end_matches('/').to_string();
        }
        self
    }

    async fn chat_openai(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let request = OpenAiRequest {
            model: &self.model,
            messages,
            temperature,
            max_tokens,
        };
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!("Making OpenAI request to: {}", url);

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;
        let body = read_success(response).await?;

        let parsed: OpenAiResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| LlmError::Parse("No response from LLM".into()))?;
        let usage = parsed
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }

    async fn chat_gemini(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        let mut system_instruction = None;
        let mut contents = Vec::new();
        for message in messages {
            let content = GeminiContent {
                role: None,
                parts: vec![GeminiPart {
                    text: message.content.clone(),
                }],
            };
            match message.role.as_str() {
                "system" => system_instruction = Some(content),
                "assistant" => contents.push(GeminiContent {
                    role: Some("model".to_string()),
                    ..content
                }),
                _ => contents.push(GeminiContent {
                    role: Some("user".to_string()),
                    ..content
                }),
            }
        }

        let request = GeminiRequest {
            contents,
            system_instruction,
            generation_config: GeminiGenerationConfig {
                temperature,
                max_output_tokens: max_tokens,
            },
        };
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        tracing::debug!("Making Gemini API request to: {}", url);

        let response = self
            .http
            .post(&url)
            .query(&[("key", &self.api_key)])
            .json(&request)
            .send()
            .await?;
        let body = read_success(response).await?;

        let parsed: GeminiResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;
        let text = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content.parts.into_iter().next())
            .map(|p| p.text)
            .ok_or_else(|| LlmError::Parse("No text in response".into()))?;
        let usage = parsed
            .usage_metadata
            .map(|u| Usage {
                input_tokens: u.prompt_token_count,
                output_tokens: u.candidates_token_count,
            })
            .unwrap_or_default();

        Ok(Completion { text, usage })
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Completion, LlmError> {
        if self.api_key.is_empty() {
            return Err(LlmError::MissingApiKey);
        }
        match self.provider {
            Provider::OpenAi => self.chat_openai(messages, temperature, max_tokens).await,
            Provider::Gemini => self.chat_gemini(messages, temperature, max_tokens).await,
        }
    }

    fn provider(&self) -> Provider {
        self.provider
    }

    fn model(&self) -> &str {
        &self.model
    }
}

/// Return the body of a successful response, or the provider's error message.
async fn read_success(response: reqwest::Response) -> Result<String, LlmError> {
    let status = response.status();
    let body = response.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    tracing::error!("LLM API error ({}): {}", status, body);
    Err(LlmError::Api(format!(
        "HTTP {}: {}",
        status.as_u16(),
        extract_error_message(&body)
    )))
}

/// Both providers wrap errors as `{"error": {"message": ...}}`.
fn extract_error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|json| {
            json.get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
                .map(String::from)
        })
        .unwrap_or_else(|| body.to_string())
}

#[derive(Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
    usage: Option<OpenAiUsage>,
}

#[derive(Deserialize)]
struct OpenAiChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

#[derive(Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    content: GeminiContent,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiUsage {
    #[serde(default)]
    prompt_token_count: u64,
    #[serde(default)]
    candidates_token_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_llm_client_defaults() {
        let client = LlmClient::new(Provider::Gemini, "key".into());
        assert_eq!(client.model(), "gemini-1.5-flash");
        assert_eq!(client.base_url, "https://generativelanguage.googleapis.com/v1beta");

        let client = LlmClient::new(Provider::OpenAi, "key".into())
            .with_model(Some("gpt-4o"))
            .with_base_url(Some("http://localhost:8080/v1/"));
        assert_eq!(client.model(), "gpt-4o");
        assert_eq!(client.base_url, "http://localhost:8080/v1");
    }

    #[test]
    fn test_blank_model_keeps_default() {
        let client = LlmClient::new(Provider::OpenAi, "key".into()).with_model(Some("  "));
        assert_eq!(client.model(), "gpt-4o-mini");
    }

    #[tokio::test]
    async fn test_missing_key_fails_before_request() {
        let client = LlmClient::new(Provider::OpenAi, String::new());
        let err = client.chat(&[ChatMessage::user("hi")], 0.2, 10).await.unwrap_err();
        assert!(matches!(err, LlmError::MissingApiKey));
    }

    #[test]
    fn test_extract_error_message() {
        let body = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        assert_eq!(extract_error_message(body), "API key not valid");
        assert_eq!(extract_error_message("upstream timeout"), "upstream timeout");
    }

    #[test]
    fn test_gemini_request_shape() {
        let request = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart { text: "hi".into() }],
            }],
            system_instruction: Some(GeminiContent {
                role: None,
                parts: vec![GeminiPart { text: "be brief".into() }],
            }),
            generation_config: GeminiGenerationConfig {
                temperature: 0.2,
                max_output_tokens: 100,
            },
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be brief");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 100);
    }

    #[test]
    fn test_parse_responses() {
        let openai: OpenAiResponse = serde_json::from_str(
            r#"{"id": "x", "choices": [{"message": {"role": "assistant", "content": "ok"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}}"#,
        )
        .unwrap();
        assert_eq!(openai.choices[0].message.content, "ok");
        assert_eq!(openai.usage.unwrap().prompt_tokens, 12);

        let gemini: GeminiResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"role": "model", "parts": [{"text": "ok"}]}, "finishReason": "STOP"}],
                "usageMetadata": {"promptTokenCount": 7, "candidatesTokenCount": 2, "totalTokenCount": 9}}"#,
        )
        .unwrap();
        assert_eq!(gemini.candidates[0].content.parts[0].text, "ok");
        assert_eq!(gemini.usage_metadata.unwrap().candidates_token_count, 2);
    }
}
