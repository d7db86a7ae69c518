//! LLM completion backends
//!
//! Both providers speak the chat-completions HTTP API; they differ only in
//! endpoint, credentials, model and how strictly they can be asked to return
//! structured output.

use async_trait::async_trait;
use openai_api_rs::v1::chat_completion::{ChatCompletionMessage, Content, MessageRole};
use reqwest::Client;
use serde_json::{Value, json};
use tracing::info;

use super::prompt_builder::summary_json_schema;
use crate::core::config::{ProviderConfig, StructuredOutput};
use crate::core::models::{FinishReason, Usage};
use crate::errors::RecapError;

#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count() / 4 + 1
}

#[must_use]
pub fn estimate_prompt_tokens(prompt: &[ChatCompletionMessage]) -> usize {
    prompt
        .iter()
        .map(|msg| match &msg.content {
            Content::Text(text) => estimate_tokens(text),
            Content::ImageUrl(_) => 0,
        })
        .sum()
}

/// Semantic generation parameters shared by every backend.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelParams {
    pub max_output_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            max_output_tokens: 4_096,
            temperature: 0.3,
        }
    }
}

/// What a backend returned before it is tagged with its gateway slot.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub finish: FinishReason,
    pub usage: Usage,
}

#[async_trait]
pub trait CompletionBackend: Send + Sync {
    fn name(&self) -> &str;

    /// # Errors
    ///
    /// Returns an error if the request fails or the response carries no text.
    async fn complete(
        &self,
        prompt: &[ChatCompletionMessage],
        params: &ModelParams,
    ) -> Result<RawCompletion, RecapError>;
}

/// Backend for any provider exposing `POST {base_url}/chat/completions`.
pub struct OpenAiCompatBackend {
    name: String,
    config: ProviderConfig,
    http: Client,
}

impl OpenAiCompatBackend {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(name: &str, config: ProviderConfig) -> Result<Self, RecapError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RecapError::HttpError(format!("Failed to build {name} HTTP client: {e}")))?;
        Ok(Self {
            name: name.to_string(),
            config,
            http,
        })
    }

    #[must_use]
    pub fn request_body(&self, prompt: &[ChatCompletionMessage], params: &ModelParams) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "messages": build_chat_messages(prompt),
            "max_tokens": params.max_output_tokens,
            "temperature": params.temperature,
        });
        match self.config.structured_output {
            StructuredOutput::JsonSchema => {
                body["response_format"] = json!({
                    "type": "json_schema",
                    "json_schema": summary_json_schema(),
                });
            }
            StructuredOutput::JsonObject => {
                body["response_format"] = json!({ "type": "json_object" });
            }
            StructuredOutput::None => {}
        }
        body
    }
}

#[async_trait]
impl CompletionBackend for OpenAiCompatBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        prompt: &[ChatCompletionMessage],
        params: &ModelParams,
    ) -> Result<RawCompletion, RecapError> {
        #[cfg(feature = "debug-logs")]
        info!("Using {} prompt:\n{:?}", self.name, prompt);

        #[cfg(not(feature = "debug-logs"))]
        info!(
            "Requesting completion from {} ({}) with {} prompt messages, ~{} input tokens",
            self.name,
            self.config.model,
            prompt.len(),
            estimate_prompt_tokens(prompt)
        );

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(prompt, params))
            .send()
            .await
            .map_err(|e| RecapError::HttpError(format!("{} request failed: {e}", self.name)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|e| {
                format!("Failed to read error response body (status {status}): {e}")
            });
            return Err(RecapError::ProviderError(format!(
                "{} API error (status {status}): {error_text}",
                self.name
            )));
        }

        let response_json: Value = response.json().await.map_err(|e| {
            RecapError::ProviderError(format!("Failed to parse {} response: {e}", self.name))
        })?;

        parse_chat_completion(&response_json)
            .ok_or_else(|| RecapError::ProviderError(format!("No text in {} response", self.name)))
    }
}

fn build_chat_messages(prompt: &[ChatCompletionMessage]) -> Vec<Value> {
    prompt
        .iter()
        .map(|m| {
            let role_str = match m.role {
                MessageRole::system => "system",
                MessageRole::user | MessageRole::function | MessageRole::tool => "user",
                MessageRole::assistant => "assistant",
            };
            let content = match &m.content {
                Content::Text(text) => text.clone(),
                Content::ImageUrl(_) => String::new(),
            };
            json!({
                "role": role_str,
                "content": content
            })
        })
        .collect()
}

/// Pulls text, finish reason and usage out of a chat-completions response.
///
/// A content-filtered answer with no text still parses, so the caller can
/// report the policy block instead of a generic failure.
#[must_use]
pub fn parse_chat_completion(response_json: &Value) -> Option<RawCompletion> {
    let choice = response_json.get("choices")?.as_array()?.first()?;
    let finish = FinishReason::from_api(choice.get("finish_reason").and_then(Value::as_str));
    let text = choice
        .get("message")
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .map(ToString::to_string);

    let text = match (text, &finish) {
        (Some(text), _) => text,
        (None, FinishReason::ContentFilter) => String::new(),
        (None, _) => return None,
    };

    let usage_field = |name: &str| {
        response_json
            .get("usage")
            .and_then(|u| u.get(name))
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(0)
    };

    Some(RawCompletion {
        text,
        finish,
        usage: Usage {
            prompt_tokens: usage_field("prompt_tokens"),
            completion_tokens: usage_field("completion_tokens"),
            total_tokens: usage_field("total_tokens"),
        },
    })
}
