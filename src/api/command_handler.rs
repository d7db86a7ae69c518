use std::sync::Arc;

use tracing::{error, info, warn};

use super::parsing::{parse_count_argument, split_command};
use crate::archive::MessageArchive;
use crate::core::models::{JobId, JobPayload};
use crate::core::store::ResultCache;
use crate::errors::SendError;
use crate::telegram::{ChatTransport, ParseMode};
use crate::worker::{DeliveryManager, JobQueue};

const TOP_PARTICIPANTS_LIMIT: usize = 5;

/// What a summary command resulted in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Enqueued(JobId),
    /// An identical request was answered from the result cache.
    Cached,
    /// The conversation is send-restricted; nothing was done.
    Restricted,
    InvalidArgument(String),
    NoMessages,
}

/// Incoming summary command.
#[derive(Debug, Clone)]
pub struct CommandRequest {
    pub conversation_id: String,
    pub requester_id: String,
    /// Full message text, e.g. `/summary 200`.
    pub text: String,
}

pub struct SummaryCommand {
    archive: Arc<dyn MessageArchive>,
    transport: Arc<dyn ChatTransport>,
    queue: JobQueue,
    delivery: Arc<DeliveryManager>,
    cache: Arc<ResultCache>,
}

impl SummaryCommand {
    #[must_use]
    pub fn new(
        archive: Arc<dyn MessageArchive>,
        transport: Arc<dyn ChatTransport>,
        queue: JobQueue,
        delivery: Arc<DeliveryManager>,
        cache: Arc<ResultCache>,
    ) -> Self {
        Self {
            archive,
            transport,
            queue,
            delivery,
            cache,
        }
    }

    async fn reply(&self, conversation_id: &str, text: &str) -> Result<String, SendError> {
        self.transport
            .send_message(conversation_id, text, ParseMode::Plain)
            .await
    }

    /// Validates the request, short-circuits on a cached result, otherwise
    /// posts the "processing" placeholder and enqueues a job anchored to it.
    pub async fn handle(&self, request: &CommandRequest) -> CommandOutcome {
        let conversation = request.conversation_id.as_str();
        let restrictions = self.delivery.restrictions();
        if restrictions.is_send_restricted(conversation) {
            info!("Ignoring command in send-restricted conversation {}", conversation);
            return CommandOutcome::Restricted;
        }

        let (command, argument) = split_command(&request.text).unwrap_or(("", None));
        let count = match parse_count_argument(argument) {
            Ok(count) => count,
            Err(e) => {
                let usage = format!("Invalid count: {e}. Usage: {command} [1-1000]");
                if let Err(send_err) = self.reply(conversation, &usage).await {
                    warn!("Failed to send usage hint to {}: {}", conversation, send_err);
                }
                return CommandOutcome::InvalidArgument(e.to_string());
            }
        };

        let fetched = async {
            let messages = self.archive.get_recent_messages(conversation, count).await?;
            let stats = self.archive.get_stats(conversation).await?;
            let top = self
                .archive
                .get_top_participants(conversation, TOP_PARTICIPANTS_LIMIT)
                .await?;
            Ok::<_, crate::errors::RecapError>((messages, stats, top))
        }
        .await;
        let (messages, stats, top_participants) = match fetched {
            Ok(data) => data,
            Err(e) => {
                error!("Archive lookup failed for {}: {}", conversation, e);
                (Vec::new(), Default::default(), Vec::new())
            }
        };

        if messages.is_empty() {
            if let Err(e) = self.reply(conversation, "No messages found to summarize.").await {
                warn!("Failed to reply to {}: {}", conversation, e);
            }
            return CommandOutcome::NoMessages;
        }

        let mut payload = JobPayload {
            conversation_id: conversation.to_string(),
            requester_id: request.requester_id.clone(),
            anchor_message_id: None,
            requested_count: count,
            messages,
            stats,
            top_participants,
        };

        if let Some(document) = self.cache.get(&payload.fingerprint()) {
            info!("Serving cached summary for {} ({} messages)", conversation, count);
            self.delivery
                .deliver(&payload.delivery_target(), &document)
                .await;
            return CommandOutcome::Cached;
        }

        let placeholder = format!("Summarizing the last {} messages…", payload.messages.len());
        match self.reply(conversation, &placeholder).await {
            Ok(message_id) => payload.anchor_message_id = Some(message_id),
            Err(SendError::Permission(reason)) => {
                restrictions.mark_send_restricted(
                    conversation,
                    &reason,
                    self.delivery.restriction_ttl(),
                );
                return CommandOutcome::Restricted;
            }
            // The summary is still delivered, as a new message
            Err(e) => warn!("Failed to post placeholder in {}: {}", conversation, e),
        }

        CommandOutcome::Enqueued(self.queue.enqueue(payload))
    }
}
