use async_trait::async_trait;
use tracing::{info, warn};

use crate::ai::client::{ModelParams, estimate_prompt_tokens};
use crate::ai::gateway::ProviderGateway;
use crate::ai::prompt_builder::{build_prompt, detect_language};
use crate::ai::recovery::normalize;
use crate::core::models::{FinishReason, Job, SummaryDocument};
use crate::errors::JobFailure;

/// Conservative context window shared by both backends.
pub const MAX_CONTEXT_TOKENS: usize = 128_000;
const TOKEN_BUFFER: usize = 250; // Safety buffer to prevent exceeding context

/// Turns one job into a summary document. Injected into the job queue.
#[async_trait]
pub trait Summarizer: Send + Sync {
    async fn summarize(&self, job: &Job) -> Result<SummaryDocument, JobFailure>;
}

/// Prompt, provider gateway, recovery, then document metadata.
pub struct SummaryWorkflow {
    gateway: ProviderGateway,
    params: ModelParams,
    context_budget: usize,
}

impl SummaryWorkflow {
    #[must_use]
    pub fn new(gateway: ProviderGateway, params: ModelParams) -> Self {
        Self {
            gateway,
            params,
            context_budget: MAX_CONTEXT_TOKENS,
        }
    }

    #[must_use]
    pub fn with_context_budget(mut self, tokens: usize) -> Self {
        self.context_budget = tokens;
        self
    }

    /// Input tokens the prompt may use once the output reservation is taken.
    fn input_allowance(&self) -> usize {
        self.context_budget
            .saturating_sub(self.params.max_output_tokens as usize)
            .saturating_sub(TOKEN_BUFFER)
    }
}

/// Scales the message count down to what fits the allowance, at least 1.
fn suggested_count(message_count: usize, input_tokens: usize, allowance: usize) -> u32 {
    let fitting = message_count.saturating_mul(allowance) / input_tokens.max(1);
    u32::try_from(fitting.max(1)).unwrap_or(u32::MAX)
}

#[async_trait]
impl Summarizer for SummaryWorkflow {
    async fn summarize(&self, job: &Job) -> Result<SummaryDocument, JobFailure> {
        let payload = &job.payload;
        if payload.messages.is_empty() {
            return Err(JobFailure::NoMessages);
        }

        let language = detect_language(payload.messages.iter().map(|m| m.text.as_str()));
        let prompt = build_prompt(language, payload);

        let input_tokens = estimate_prompt_tokens(&prompt);
        info!("job={} estimated input tokens: {}", job.id, input_tokens);
        let allowance = self.input_allowance();
        if input_tokens > allowance {
            let suggested = suggested_count(payload.messages.len(), input_tokens, allowance);
            warn!(
                "job={} input too large ({} > {} tokens), suggesting {} messages",
                job.id, input_tokens, allowance, suggested
            );
            return Err(JobFailure::InputTooLarge {
                requested: payload.requested_count,
                suggested,
            });
        }

        let result = self.gateway.complete(&prompt, &self.params).await?;
        info!(
            "job={} answered by {} provider, finish={:?}, total_tokens={}",
            job.id, result.provider, result.finish, result.usage.total_tokens
        );

        if result.finish == FinishReason::ContentFilter && result.text.trim().is_empty() {
            return Err(JobFailure::ContentPolicy);
        }

        let content = normalize(&result.text, &result.finish, language);
        if content.recovered {
            warn!("job={} summary was reconstructed from a damaged response", job.id);
        }

        Ok(SummaryDocument {
            body: content.body,
            language,
            messages_analyzed: payload.messages.len(),
            unique_users: payload.unique_authors(),
            time_range: payload.time_range(),
            top_participants: payload.top_participants.clone(),
            usage: result.usage,
            provider: Some(result.provider),
            recovered: content.recovered,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_count_scales_with_allowance() {
        assert_eq!(suggested_count(1000, 20_000, 10_000), 500);
        assert_eq!(suggested_count(3, 100_000, 10), 1);
    }
}
