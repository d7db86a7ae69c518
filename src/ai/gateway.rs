use openai_api_rs::v1::chat_completion::ChatCompletionMessage;
use tracing::{error, info, warn};

use super::client::{CompletionBackend, ModelParams, RawCompletion};
use crate::core::models::{ProviderCallResult, ProviderSlot};
use crate::errors::RecapError;

/// Primary/secondary failover over two completion backends.
///
/// The secondary is only called after the primary failed, never in parallel.
pub struct ProviderGateway {
    primary: Box<dyn CompletionBackend>,
    secondary: Box<dyn CompletionBackend>,
}

fn tag(raw: RawCompletion, provider: ProviderSlot) -> ProviderCallResult {
    ProviderCallResult {
        provider,
        text: raw.text,
        finish: raw.finish,
        usage: raw.usage,
    }
}

impl ProviderGateway {
    #[must_use]
    pub fn new(primary: Box<dyn CompletionBackend>, secondary: Box<dyn CompletionBackend>) -> Self {
        Self { primary, secondary }
    }

    /// # Errors
    ///
    /// Returns `RecapError::ProvidersExhausted` carrying both backend errors
    /// when neither backend produced an answer.
    pub async fn complete(
        &self,
        prompt: &[ChatCompletionMessage],
        params: &ModelParams,
    ) -> Result<ProviderCallResult, RecapError> {
        let primary_error = match self.primary.complete(prompt, params).await {
            Ok(raw) => return Ok(tag(raw, ProviderSlot::Primary)),
            Err(e) => {
                warn!(
                    "Primary provider {} failed, falling back to {}: {}",
                    self.primary.name(),
                    self.secondary.name(),
                    e
                );
                e
            }
        };

        match self.secondary.complete(prompt, params).await {
            Ok(raw) => {
                info!("Secondary provider {} answered", self.secondary.name());
                Ok(tag(raw, ProviderSlot::Secondary))
            }
            Err(secondary_error) => {
                error!(
                    "Both providers failed: {}: {} / {}: {}",
                    self.primary.name(),
                    primary_error,
                    self.secondary.name(),
                    secondary_error
                );
                Err(RecapError::ProvidersExhausted {
                    primary: Box::new(primary_error),
                    secondary: Box::new(secondary_error),
                })
            }
        }
    }
}
