//! Telegram Bot API client module
//!
//! Implements the chat transport used for delivery and classifies Bot API
//! failures into [`SendError`] kinds.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::errors::SendError;

const MAX_RATE_LIMIT_RETRIES: u32 = 3;
const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// How the platform should interpret message text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseMode {
    Markdown,
    Plain,
}

impl ParseMode {
    fn api_value(self) -> Option<&'static str> {
        match self {
            ParseMode::Markdown => Some("Markdown"),
            ParseMode::Plain => None,
        }
    }
}

/// Sending side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Posts a new message and returns its id.
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<String, SendError>;

    /// Replaces the text of an existing message.
    async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<(), SendError>;
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    result: Option<Value>,
    description: Option<String>,
    parameters: Option<ResponseParameters>,
}

#[derive(Debug, Deserialize)]
struct ResponseParameters {
    retry_after: Option<u64>,
}

/// Maps a failed Bot API call onto a delivery error kind.
#[must_use]
pub fn classify_api_error(status: StatusCode, description: &str) -> SendError {
    let lower = description.to_lowercase();
    let detail = description.to_string();

    if lower.contains("can't parse entities") || lower.contains("can't find end of") {
        SendError::MarkupParse(detail)
    } else if lower.contains("message is too long") || lower.contains("text is too long") {
        SendError::MessageTooLong(detail)
    } else if status == StatusCode::FORBIDDEN
        || lower.contains("not enough rights")
        || lower.contains("have no rights")
        || lower.contains("chat_write_forbidden")
        || lower.contains("bot was kicked")
        || lower.contains("bot was blocked")
    {
        SendError::Permission(detail)
    } else if status == StatusCode::UNAVAILABLE_FOR_LEGAL_REASONS
        || lower.contains("content policy")
    {
        SendError::ContentPolicy(detail)
    } else if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        SendError::Network(detail)
    } else {
        SendError::Other(detail)
    }
}

pub struct TelegramClient {
    http: Client,
    api_base: String,
    token: String,
}

impl TelegramClient {
    #[must_use]
    pub fn new(api_base: &str, token: &str) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            http,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Calls a Bot API method, waiting out `retry_after` on 429 a few times
    /// before reporting a network error.
    async fn call(&self, method: &str, payload: &Value) -> Result<Value, SendError> {
        let mut attempts = 0;

        loop {
            attempts += 1;

            let resp = self
                .http
                .post(self.method_url(method))
                .json(payload)
                .send()
                .await?;
            let status = resp.status();
            let body = resp.text().await?;

            let parsed: Option<ApiResponse> = serde_json::from_str(&body).ok();
            let Some(api) = parsed else {
                return Err(classify_api_error(
                    status,
                    &format!("{method} returned unreadable body (status {status})"),
                ));
            };

            if api.ok {
                return Ok(api.result.unwrap_or(Value::Null));
            }

            let description = api
                .description
                .unwrap_or_else(|| format!("{method} failed with status {status}"));

            if status == StatusCode::TOO_MANY_REQUESTS && attempts < MAX_RATE_LIMIT_RETRIES {
                let retry_after = api
                    .parameters
                    .and_then(|p| p.retry_after)
                    .map_or(Duration::from_secs(1), Duration::from_secs)
                    .min(MAX_RETRY_AFTER);
                warn!(
                    "Telegram rate limited (429), waiting {}s before retry (attempt {}/{})",
                    retry_after.as_secs(),
                    attempts,
                    MAX_RATE_LIMIT_RETRIES
                );
                tokio::time::sleep(retry_after).await;
                continue;
            }

            return Err(classify_api_error(status, &description));
        }
    }
}

fn with_parse_mode(mut payload: Value, mode: ParseMode) -> Value {
    if let Some(value) = mode.api_value() {
        payload["parse_mode"] = json!(value);
    }
    payload
}

#[async_trait]
impl ChatTransport for TelegramClient {
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<String, SendError> {
        let payload = with_parse_mode(
            json!({
                "chat_id": conversation_id,
                "text": text,
                "disable_web_page_preview": true
            }),
            mode,
        );
        let result = self.call("sendMessage", &payload).await?;
        result
            .get("message_id")
            .and_then(Value::as_i64)
            .map(|id| id.to_string())
            .ok_or_else(|| SendError::Other("sendMessage response missing message_id".to_string()))
    }

    async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<(), SendError> {
        let payload = with_parse_mode(
            json!({
                "chat_id": conversation_id,
                "message_id": message_id.parse::<i64>().map_or_else(|_| json!(message_id), |id| json!(id)),
                "text": text,
                "disable_web_page_preview": true
            }),
            mode,
        );
        match self.call("editMessageText", &payload).await {
            Ok(_) => Ok(()),
            // Same text as before; the message already shows what we wanted
            Err(SendError::Other(detail)) if detail.contains("message is not modified") => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_bot_api_descriptions() {
        let bad_request = StatusCode::BAD_REQUEST;
        assert!(matches!(
            classify_api_error(bad_request, "Bad Request: can't parse entities: Can't find end of the entity starting at byte offset 12"),
            SendError::MarkupParse(_)
        ));
        assert!(matches!(
            classify_api_error(bad_request, "Bad Request: message is too long"),
            SendError::MessageTooLong(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::FORBIDDEN, "Forbidden: bot was kicked from the group chat"),
            SendError::Permission(_)
        ));
        assert!(matches!(
            classify_api_error(bad_request, "Bad Request: not enough rights to send text messages to the chat"),
            SendError::Permission(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::TOO_MANY_REQUESTS, "Too Many Requests: retry after 5"),
            SendError::Network(_)
        ));
        assert!(matches!(
            classify_api_error(StatusCode::BAD_GATEWAY, "Bad Gateway"),
            SendError::Network(_)
        ));
        assert!(matches!(
            classify_api_error(bad_request, "Bad Request: chat not found"),
            SendError::Other(_)
        ));
    }

    #[test]
    fn plain_mode_omits_parse_mode() {
        let payload = with_parse_mode(json!({ "text": "x" }), ParseMode::Plain);
        assert!(payload.get("parse_mode").is_none());
        let payload = with_parse_mode(json!({ "text": "x" }), ParseMode::Markdown);
        assert_eq!(payload["parse_mode"], "Markdown");
    }
}
