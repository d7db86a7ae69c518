#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use openai_api_rs::v1::chat_completion::ChatCompletionMessage;
use recap::ai::client::{CompletionBackend, ModelParams, RawCompletion};
use recap::core::models::{FinishReason, JobPayload, SourceMessage, Usage};
use recap::errors::{RecapError, SendError};
use recap::telegram::{ChatTransport, ParseMode};

pub fn message(author: &str, text: &str, minute: u32) -> SourceMessage {
    SourceMessage {
        author: author.to_string(),
        text: text.to_string(),
        timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap(),
    }
}

pub fn payload(conversation_id: &str, messages: Vec<SourceMessage>) -> JobPayload {
    JobPayload {
        conversation_id: conversation_id.to_string(),
        requester_id: "user-1".to_string(),
        anchor_message_id: Some("42".to_string()),
        requested_count: 100,
        messages,
        stats: Default::default(),
        top_participants: Vec::new(),
    }
}

pub fn completion(text: &str, finish: FinishReason) -> RawCompletion {
    RawCompletion {
        text: text.to_string(),
        finish,
        usage: Usage {
            prompt_tokens: 100,
            completion_tokens: 50,
            total_tokens: 150,
        },
    }
}

/// Backend that replays scripted answers in order.
pub struct ScriptedBackend {
    name: String,
    script: Mutex<VecDeque<Result<RawCompletion, RecapError>>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new(name: &str, script: Vec<Result<RawCompletion, RecapError>>) -> Self {
        Self {
            name: name.to_string(),
            script: Mutex::new(script.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn answering(name: &str, text: &str) -> Self {
        Self::new(name, vec![Ok(completion(text, FinishReason::Stop))])
    }

    pub fn failing(name: &str) -> Self {
        Self::new(
            name,
            vec![Err(RecapError::ProviderError(format!("{name} is down")))],
        )
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CompletionBackend for ScriptedBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        _prompt: &[ChatCompletionMessage],
        _params: &ModelParams,
    ) -> Result<RawCompletion, RecapError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(RecapError::ProviderError("script exhausted".to_string())))
    }
}

/// Shares a scripted backend with the test so call counts stay observable
/// after the gateway takes ownership.
pub struct SharedBackend(pub Arc<ScriptedBackend>);

#[async_trait]
impl CompletionBackend for SharedBackend {
    fn name(&self) -> &str {
        self.0.name()
    }

    async fn complete(
        &self,
        prompt: &[ChatCompletionMessage],
        params: &ModelParams,
    ) -> Result<RawCompletion, RecapError> {
        self.0.complete(prompt, params).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallKind {
    Send,
    Edit,
}

#[derive(Debug, Clone)]
pub struct TransportCall {
    pub kind: CallKind,
    pub conversation_id: String,
    pub message_id: Option<String>,
    pub text: String,
    pub mode: ParseMode,
}

/// Transport that records every call and answers from a script; an empty
/// script means success.
#[derive(Default)]
pub struct RecordingTransport {
    calls: Mutex<Vec<TransportCall>>,
    script: Mutex<VecDeque<Result<(), SendError>>>,
    next_id: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(script: Vec<Result<(), SendError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    fn record(&self, call: TransportCall) -> Result<(), SendError> {
        self.calls.lock().unwrap().push(call);
        self.script.lock().unwrap().pop_front().unwrap_or(Ok(()))
    }
}

#[async_trait]
impl ChatTransport for RecordingTransport {
    async fn send_message(
        &self,
        conversation_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<String, SendError> {
        self.record(TransportCall {
            kind: CallKind::Send,
            conversation_id: conversation_id.to_string(),
            message_id: None,
            text: text.to_string(),
            mode,
        })?;
        Ok((1000 + self.next_id.fetch_add(1, Ordering::SeqCst)).to_string())
    }

    async fn edit_message(
        &self,
        conversation_id: &str,
        message_id: &str,
        text: &str,
        mode: ParseMode,
    ) -> Result<(), SendError> {
        self.record(TransportCall {
            kind: CallKind::Edit,
            conversation_id: conversation_id.to_string(),
            message_id: Some(message_id.to_string()),
            text: text.to_string(),
            mode,
        })
    }
}
