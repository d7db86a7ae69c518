use std::collections::HashSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::JobFailure;

pub type JobId = Uuid;

/// One archived chat message as handed to the summarizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMessage {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatStats {
    pub total_messages: u64,
    pub participant_count: u32,
    pub first_message_at: Option<DateTime<Utc>>,
    pub last_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopParticipant {
    pub name: String,
    pub message_count: u32,
}

/// Everything the worker needs to summarize one batch and route the result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub conversation_id: String,
    pub requester_id: String,
    // Id of the provisional "processing" message the summary replaces
    #[serde(default)]
    pub anchor_message_id: Option<String>,
    pub requested_count: u32,
    pub messages: Vec<SourceMessage>,
    #[serde(default)]
    pub stats: ChatStats,
    #[serde(default)]
    pub top_participants: Vec<TopParticipant>,
}

impl JobPayload {
    #[must_use]
    pub fn latest_message_at(&self) -> Option<DateTime<Utc>> {
        self.messages.iter().map(|m| m.timestamp).max()
    }

    #[must_use]
    pub fn time_range(&self) -> Option<TimeRange> {
        let start = self.messages.iter().map(|m| m.timestamp).min()?;
        let end = self.messages.iter().map(|m| m.timestamp).max()?;
        Some(TimeRange { start, end })
    }

    #[must_use]
    pub fn unique_authors(&self) -> usize {
        self.messages
            .iter()
            .map(|m| m.author.as_str())
            .collect::<HashSet<_>>()
            .len()
    }

    #[must_use]
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint {
            conversation_id: self.conversation_id.clone(),
            requested_count: self.requested_count,
            latest_message_at: self.latest_message_at(),
        }
    }

    #[must_use]
    pub fn delivery_target(&self) -> DeliveryTarget {
        DeliveryTarget {
            conversation_id: self.conversation_id.clone(),
            anchor_message_id: self.anchor_message_id.clone(),
            requested_count: self.requested_count,
        }
    }
}

/// Cache key identifying an identical summary request.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint {
    pub conversation_id: String,
    pub requested_count: u32,
    pub latest_message_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub payload: JobPayload,
    pub enqueued_at: DateTime<Utc>,
}

impl Job {
    #[must_use]
    pub fn new(payload: JobPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            payload,
            enqueued_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn context(&self) -> JobContext {
        JobContext {
            job_id: self.id,
            requester_id: self.payload.requester_id.clone(),
            target: self.payload.delivery_target(),
            fingerprint: self.payload.fingerprint(),
        }
    }
}

/// Where a finished summary goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub conversation_id: String,
    pub anchor_message_id: Option<String>,
    pub requested_count: u32,
}

/// Routing data attached to every lifecycle event of a job.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub job_id: JobId,
    pub requester_id: String,
    pub target: DeliveryTarget,
    pub fingerprint: Fingerprint,
}

#[derive(Debug, Clone)]
pub enum JobEvent {
    Started {
        context: JobContext,
    },
    Completed {
        context: JobContext,
        document: SummaryDocument,
    },
    Failed {
        context: JobContext,
        error: JobFailure,
    },
}

impl JobEvent {
    #[must_use]
    pub fn context(&self) -> &JobContext {
        match self {
            JobEvent::Started { context }
            | JobEvent::Completed { context, .. }
            | JobEvent::Failed { context, .. } => context,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderSlot {
    Primary,
    Secondary,
}

impl fmt::Display for ProviderSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderSlot::Primary => write!(f, "primary"),
            ProviderSlot::Secondary => write!(f, "secondary"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    Other(String),
}

impl FinishReason {
    #[must_use]
    pub fn from_api(raw: Option<&str>) -> Self {
        match raw {
            Some("stop") | None => FinishReason::Stop,
            Some("length" | "max_tokens" | "max_output_tokens") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some(other) => FinishReason::Other(other.to_string()),
        }
    }

    #[must_use]
    pub fn is_truncated(&self) -> bool {
        matches!(self, FinishReason::Length)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Raw answer of one backend, tagged with the slot that produced it.
#[derive(Debug, Clone)]
pub struct ProviderCallResult {
    pub provider: ProviderSlot,
    pub text: String,
    pub finish: FinishReason,
    pub usage: Usage,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    En,
    Zh,
}

impl Language {
    #[must_use]
    pub fn tag(self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

/// The six-field summary after recovery, plus the body rendered from it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SummaryContent {
    pub body: String,
    pub formatted_summary: String,
    pub topics: Vec<String>,
    pub discussion_points: Vec<String>,
    pub activity_analysis: String,
    pub special_events: String,
    pub other_notes: String,
    pub recovered: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Normalized summary document: rendered body plus the statistics shown in
/// the footer.
#[derive(Debug, Clone)]
pub struct SummaryDocument {
    pub body: String,
    pub language: Language,
    pub messages_analyzed: usize,
    pub unique_users: usize,
    pub time_range: Option<TimeRange>,
    pub top_participants: Vec<TopParticipant>,
    pub usage: Usage,
    pub provider: Option<ProviderSlot>,
    pub recovered: bool,
}
