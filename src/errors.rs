use thiserror::Error;

#[derive(Debug, Error)]
pub enum RecapError {
    #[error("Failed to parse payload: {0}")]
    ParseError(String),

    #[error("Failed to access AI provider: {0}")]
    ProviderError(String),

    #[error("Failed to send HTTP request: {0}")]
    HttpError(String),

    #[error("Invalid configuration: {0}")]
    ConfigError(String),

    #[error("All AI providers failed (primary: {primary}; secondary: {secondary})")]
    ProvidersExhausted {
        primary: Box<RecapError>,
        secondary: Box<RecapError>,
    },
}

impl From<reqwest::Error> for RecapError {
    fn from(error: reqwest::Error) -> Self {
        RecapError::HttpError(error.to_string())
    }
}

impl From<serde_json::Error> for RecapError {
    fn from(error: serde_json::Error) -> Self {
        RecapError::ParseError(error.to_string())
    }
}

impl From<anyhow::Error> for RecapError {
    fn from(error: anyhow::Error) -> Self {
        RecapError::ProviderError(error.to_string())
    }
}

/// Failure reported by a chat transport when sending or editing a message.
///
/// Only `MarkupParse` and `MessageTooLong` move delivery on to the next
/// representation; every other kind has its own handling branch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Platform rejected markup: {0}")]
    MarkupParse(String),

    #[error("Message exceeds platform length limit: {0}")]
    MessageTooLong(String),

    #[error("Network failure while sending: {0}")]
    Network(String),

    #[error("Bot is not allowed to send here: {0}")]
    Permission(String),

    #[error("Message rejected by content policy: {0}")]
    ContentPolicy(String),

    #[error("Failed to send message: {0}")]
    Other(String),
}

impl SendError {
    #[must_use]
    pub fn is_escalatable(&self) -> bool {
        matches!(self, SendError::MarkupParse(_) | SendError::MessageTooLong(_))
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::Network(_))
    }
}

impl From<reqwest::Error> for SendError {
    fn from(error: reqwest::Error) -> Self {
        SendError::Network(error.to_string())
    }
}

/// Classified reason a summarization job failed. Carried by failure events
/// and turned into a user-facing notice by the delivery side.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JobFailure {
    #[error("No AI provider could produce a summary: {0}")]
    ProvidersUnavailable(String),

    #[error("Requested {requested} messages exceed the model input limit (suggested {suggested})")]
    InputTooLarge { requested: u32, suggested: u32 },

    #[error("Summary blocked by provider content policy")]
    ContentPolicy,

    #[error("No messages to summarize")]
    NoMessages,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobFailure {
    /// Text shown to the user in place of the summary. `command` is the
    /// bare command name; the rerun hint appends a message count to it.
    #[must_use]
    pub fn user_notice(&self, command: &str, requested: u32) -> String {
        match self {
            JobFailure::ProvidersUnavailable(_) | JobFailure::Internal(_) => format!(
                "Sorry, I couldn't generate a summary at this time. Please try again later with {command} {requested}"
            ),
            JobFailure::InputTooLarge { suggested, .. } => format!(
                "This conversation is too long to summarize in one go. Try a smaller count, for example {command} {suggested}"
            ),
            JobFailure::ContentPolicy => CONTENT_POLICY_NOTICE.to_string(),
            JobFailure::NoMessages => "No messages found to summarize.".to_string(),
        }
    }
}

impl From<RecapError> for JobFailure {
    fn from(error: RecapError) -> Self {
        match error {
            RecapError::ProvidersExhausted { .. } => {
                JobFailure::ProvidersUnavailable(error.to_string())
            }
            other => JobFailure::Internal(other.to_string()),
        }
    }
}

/// Non-judgmental notice used whenever a summary is blocked by a content filter.
pub const CONTENT_POLICY_NOTICE: &str =
    "This conversation couldn't be summarized because part of it was flagged by an automated content filter. Nothing is wrong on your side.";
