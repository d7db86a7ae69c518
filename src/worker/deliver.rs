//! Delivery of finished summaries and failure notices
//!
//! A summary is sent through an ordered chain of representations. Only
//! markup-parse and too-long errors move on to the next representation;
//! network errors are retried with backoff, permission errors flag the
//! conversation as send-restricted, content-policy errors replace the
//! summary with a fixed notice and anything else ends in an apology.

use std::sync::Arc;

use tokio_retry::RetryIf;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{error, info, warn};

use super::segment::split_segments;
use crate::core::config::DeliveryConfig;
use crate::core::models::{DeliveryTarget, SummaryDocument};
use crate::core::store::SendRestrictions;
use crate::errors::{CONTENT_POLICY_NOTICE, JobFailure, SendError};
use crate::telegram::{ChatTransport, ParseMode, render_summary};
use crate::utils::markup;

const TRUNCATION_SUFFIX: &str = "…";
const MAX_RETRY_DELAY_SECS: u64 = 10;

/// One way of turning rendered markup into sendable text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Representation {
    Native,
    Escaped,
    Sanitized,
    Plain,
    TruncatedPlain,
}

impl Representation {
    /// Order in which representations are attempted.
    pub const CHAIN: [Representation; 5] = [
        Representation::Native,
        Representation::Escaped,
        Representation::Sanitized,
        Representation::Plain,
        Representation::TruncatedPlain,
    ];

    #[must_use]
    pub fn render(self, text: &str, max_chars: usize) -> String {
        match self {
            Representation::Native => text.to_string(),
            Representation::Escaped => markup::smart_escape(text),
            Representation::Sanitized => markup::repair(text),
            Representation::Plain => markup::strip(text),
            Representation::TruncatedPlain => truncate_chars(&markup::strip(text), max_chars),
        }
    }

    #[must_use]
    pub fn parse_mode(self) -> ParseMode {
        match self {
            Representation::Native | Representation::Escaped | Representation::Sanitized => {
                ParseMode::Markdown
            }
            Representation::Plain | Representation::TruncatedPlain => ParseMode::Plain,
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(TRUNCATION_SUFFIX.chars().count());
    let mut out: String = text.chars().take(keep).collect();
    out.push_str(TRUNCATION_SUFFIX);
    out
}

/// What `deliver` ended up doing. Returned for logging and tests; delivery
/// itself never fails towards the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered {
        representation: Representation,
        segments: usize,
    },
    /// The conversation was already flagged; nothing was sent.
    Skipped,
    /// The platform denied permission; the conversation is now flagged.
    Restricted,
    ContentPolicyNotice,
    NetworkNotice,
    Apology,
    /// A failure notice was shown instead of a summary.
    FailureNotice,
}

#[derive(Debug, Clone, Copy)]
enum Placement<'a> {
    Replace(&'a str),
    New,
}

impl<'a> Placement<'a> {
    fn anchor(target: &'a DeliveryTarget) -> Self {
        target
            .anchor_message_id
            .as_deref()
            .map_or(Placement::New, Placement::Replace)
    }
}

pub struct DeliveryManager {
    transport: Arc<dyn ChatTransport>,
    restrictions: Arc<SendRestrictions>,
    config: DeliveryConfig,
}

impl DeliveryManager {
    #[must_use]
    pub fn new(
        transport: Arc<dyn ChatTransport>,
        restrictions: Arc<SendRestrictions>,
        config: DeliveryConfig,
    ) -> Self {
        Self {
            transport,
            restrictions,
            config,
        }
    }

    #[must_use]
    pub fn restrictions(&self) -> &Arc<SendRestrictions> {
        &self.restrictions
    }

    #[must_use]
    pub fn restriction_ttl(&self) -> std::time::Duration {
        self.config.restriction_ttl
    }

    fn rerun_command(&self, target: &DeliveryTarget) -> String {
        format!("{} {}", self.config.command_name, target.requested_count)
    }

    /// Sends a finished summary to its conversation.
    pub async fn deliver(&self, target: &DeliveryTarget, document: &SummaryDocument) -> DeliveryOutcome {
        let conversation = target.conversation_id.as_str();
        if self.restrictions.is_send_restricted(conversation) {
            info!("Skipping delivery to send-restricted conversation {}", conversation);
            return DeliveryOutcome::Skipped;
        }

        let rendered = render_summary(document, self.config.display_timezone);
        if rendered.char_count() <= self.config.single_message_limit {
            return match self
                .send_with_fallback(conversation, Placement::anchor(target), &rendered.full_text())
                .await
            {
                Ok(representation) => {
                    info!(
                        "Delivered summary to {} as {:?}",
                        conversation, representation
                    );
                    DeliveryOutcome::Delivered {
                        representation,
                        segments: 1,
                    }
                }
                Err(e) => self.handle_send_failure(target, Placement::anchor(target), e).await,
            };
        }

        let segments = split_segments(&rendered.body, self.config.segment_limit);
        info!(
            "Summary for {} is {} chars, sending {} segments plus statistics",
            conversation,
            rendered.char_count(),
            segments.len()
        );

        let mut last_representation = Representation::Native;
        for (index, segment) in segments.iter().enumerate() {
            let placement = if index == 0 {
                Placement::anchor(target)
            } else {
                tokio::time::sleep(self.config.segment_pacing).await;
                Placement::New
            };
            match self.send_with_fallback(conversation, placement, segment).await {
                Ok(representation) => last_representation = representation,
                Err(e) => {
                    // Once the anchor shows the first segment, notices go out as new messages
                    let notice_placement = if index == 0 { placement } else { Placement::New };
                    return self.handle_send_failure(target, notice_placement, e).await;
                }
            }
        }

        tokio::time::sleep(self.config.segment_pacing).await;
        if let Err(e) = self
            .send_with_fallback(conversation, Placement::New, &rendered.footer)
            .await
        {
            warn!("Failed to send statistics for {}: {}", conversation, e);
            if let SendError::Permission(reason) = &e {
                self.mark_restricted(conversation, reason);
            }
        }

        DeliveryOutcome::Delivered {
            representation: last_representation,
            segments: segments.len(),
        }
    }

    /// Replaces the placeholder with the notice for a failed job.
    pub async fn deliver_failure(&self, target: &DeliveryTarget, failure: &JobFailure) -> DeliveryOutcome {
        let conversation = target.conversation_id.as_str();
        if self.restrictions.is_send_restricted(conversation) {
            info!("Skipping failure notice to send-restricted conversation {}", conversation);
            return DeliveryOutcome::Skipped;
        }
        let notice = failure.user_notice(&self.config.command_name, target.requested_count);
        match self
            .send_notice(conversation, Placement::anchor(target), &notice)
            .await
        {
            Ok(()) => DeliveryOutcome::FailureNotice,
            Err(SendError::Permission(reason)) => {
                self.mark_restricted(conversation, &reason);
                DeliveryOutcome::Restricted
            }
            Err(e) => {
                error!("Failed to send failure notice to {}: {}", conversation, e);
                DeliveryOutcome::FailureNotice
            }
        }
    }

    /// Walks the representation chain until one is accepted.
    async fn send_with_fallback(
        &self,
        conversation: &str,
        placement: Placement<'_>,
        text: &str,
    ) -> Result<Representation, SendError> {
        let mut last_error = None;
        for representation in Representation::CHAIN {
            let rendered = representation.render(text, self.config.single_message_limit);
            match self
                .send_once_with_retry(conversation, placement, &rendered, representation.parse_mode())
                .await
            {
                Ok(()) => return Ok(representation),
                Err(e) if e.is_escalatable() => {
                    warn!(
                        "{:?} representation rejected for {}: {}",
                        representation, conversation, e
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_error
            .unwrap_or_else(|| SendError::Other("no representation was accepted".to_string())))
    }

    async fn send_once_with_retry(
        &self,
        conversation: &str,
        placement: Placement<'_>,
        text: &str,
        mode: ParseMode,
    ) -> Result<(), SendError> {
        let base_ms = u64::try_from(self.config.network_retry_base.as_millis()).unwrap_or(u64::MAX);
        // Delays grow base, 2*base, 4*base, ...
        let strategy = ExponentialBackoff::from_millis(2)
            .factor((base_ms / 2).max(1))
            .max_delay(std::time::Duration::from_secs(MAX_RETRY_DELAY_SECS))
            .map(jitter)
            .take(self.config.network_retries);

        RetryIf::spawn(
            strategy,
            || self.send_once(conversation, placement, text, mode),
            |e: &SendError| {
                if e.is_retryable() {
                    warn!("Network error sending to {}, retrying: {}", conversation, e);
                }
                e.is_retryable()
            },
        )
        .await
    }

    async fn send_once(
        &self,
        conversation: &str,
        placement: Placement<'_>,
        text: &str,
        mode: ParseMode,
    ) -> Result<(), SendError> {
        match placement {
            Placement::Replace(message_id) => {
                self.transport
                    .edit_message(conversation, message_id, text, mode)
                    .await
            }
            Placement::New => self
                .transport
                .send_message(conversation, text, mode)
                .await
                .map(|_| ()),
        }
    }

    async fn send_notice(
        &self,
        conversation: &str,
        placement: Placement<'_>,
        notice: &str,
    ) -> Result<(), SendError> {
        self.send_once_with_retry(conversation, placement, notice, ParseMode::Plain)
            .await
    }

    fn mark_restricted(&self, conversation: &str, reason: &str) {
        self.restrictions
            .mark_send_restricted(conversation, reason, self.config.restriction_ttl);
    }

    async fn handle_send_failure(
        &self,
        target: &DeliveryTarget,
        placement: Placement<'_>,
        error: SendError,
    ) -> DeliveryOutcome {
        let conversation = target.conversation_id.as_str();
        error!("Delivery to {} failed: {}", conversation, error);

        let (notice, outcome) = match &error {
            SendError::Permission(reason) => {
                self.mark_restricted(conversation, reason);
                return DeliveryOutcome::Restricted;
            }
            SendError::ContentPolicy(_) => (
                CONTENT_POLICY_NOTICE.to_string(),
                DeliveryOutcome::ContentPolicyNotice,
            ),
            SendError::Network(_) => (
                format!(
                    "I couldn't reach the chat service to deliver your summary. Please try again with {}",
                    self.rerun_command(target)
                ),
                DeliveryOutcome::NetworkNotice,
            ),
            SendError::MarkupParse(_) | SendError::MessageTooLong(_) | SendError::Other(_) => (
                format!(
                    "Sorry, I couldn't deliver the summary. Please run {} again.",
                    self.rerun_command(target)
                ),
                DeliveryOutcome::Apology,
            ),
        };

        match self.send_notice(conversation, placement, &notice).await {
            Ok(()) => {}
            Err(SendError::Permission(reason)) => {
                self.mark_restricted(conversation, &reason);
                return DeliveryOutcome::Restricted;
            }
            Err(e) => error!("Failed to send notice to {}: {}", conversation, e),
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_starts_native_and_ends_truncated_plain() {
        assert_eq!(Representation::CHAIN[0], Representation::Native);
        assert_eq!(Representation::CHAIN[4], Representation::TruncatedPlain);
        assert_eq!(Representation::Escaped.parse_mode(), ParseMode::Markdown);
        assert_eq!(Representation::Plain.parse_mode(), ParseMode::Plain);
    }

    #[test]
    fn representations_transform_markup() {
        let text = "*Title*\nsnake_case [x]";
        assert_eq!(Representation::Native.render(text, 100), text);
        assert_eq!(
            Representation::Escaped.render(text, 100),
            "*Title*\nsnake\\_case \\[x\\]"
        );
        assert_eq!(
            Representation::Sanitized.render(text, 100),
            "*Title*\nsnake\\_case \\[x\\]"
        );
        assert_eq!(Representation::Plain.render(text, 100), "Title\nsnakecase x");
        assert_eq!(Representation::TruncatedPlain.render(text, 6), "Title…");

        let footer = "Most active: ann\\_b (2)";
        assert_eq!(Representation::Plain.render(footer, 100), "Most active: ann_b (2)");
    }
}
