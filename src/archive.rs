//! Message archive interface and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::core::models::{ChatStats, SourceMessage, TopParticipant};
use crate::errors::RecapError;

/// Read access to archived conversation history.
#[async_trait]
pub trait MessageArchive: Send + Sync {
    /// Most recent `limit` messages, oldest first.
    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, RecapError>;

    async fn get_stats(&self, conversation_id: &str) -> Result<ChatStats, RecapError>;

    /// Authors ordered by message count, most active first.
    async fn get_top_participants(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<TopParticipant>, RecapError>;
}

#[derive(Default)]
pub struct InMemoryArchive {
    conversations: Mutex<HashMap<String, Vec<SourceMessage>>>,
}

impl InMemoryArchive {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<SourceMessage>>> {
        self.conversations
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Stores a message, keeping each conversation sorted by timestamp.
    pub fn append(&self, conversation_id: &str, message: SourceMessage) {
        let mut conversations = self.lock();
        let messages = conversations.entry(conversation_id.to_string()).or_default();
        let at = messages.partition_point(|m| m.timestamp <= message.timestamp);
        messages.insert(at, message);
    }
}

#[async_trait]
impl MessageArchive for InMemoryArchive {
    async fn get_recent_messages(
        &self,
        conversation_id: &str,
        limit: u32,
    ) -> Result<Vec<SourceMessage>, RecapError> {
        let conversations = self.lock();
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let skip = messages.len().saturating_sub(limit as usize);
        Ok(messages[skip..].to_vec())
    }

    async fn get_stats(&self, conversation_id: &str) -> Result<ChatStats, RecapError> {
        let conversations = self.lock();
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(ChatStats::default());
        };
        let mut authors: Vec<&str> = messages.iter().map(|m| m.author.as_str()).collect();
        authors.sort_unstable();
        authors.dedup();
        Ok(ChatStats {
            total_messages: messages.len() as u64,
            participant_count: u32::try_from(authors.len()).unwrap_or(u32::MAX),
            first_message_at: messages.first().map(|m| m.timestamp),
            last_message_at: messages.last().map(|m| m.timestamp),
        })
    }

    async fn get_top_participants(
        &self,
        conversation_id: &str,
        limit: usize,
    ) -> Result<Vec<TopParticipant>, RecapError> {
        let conversations = self.lock();
        let Some(messages) = conversations.get(conversation_id) else {
            return Ok(Vec::new());
        };
        let mut counts: HashMap<&str, u32> = HashMap::new();
        for message in messages {
            *counts.entry(message.author.as_str()).or_default() += 1;
        }
        let mut top: Vec<TopParticipant> = counts
            .into_iter()
            .map(|(name, message_count)| TopParticipant {
                name: name.to_string(),
                message_count,
            })
            .collect();
        top.sort_by(|a, b| {
            b.message_count
                .cmp(&a.message_count)
                .then_with(|| a.name.cmp(&b.name))
        });
        top.truncate(limit);
        Ok(top)
    }
}
