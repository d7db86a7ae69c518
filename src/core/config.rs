use std::env;
use std::time::Duration;

use chrono_tz::Tz;

const DEFAULT_PRIMARY_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_PRIMARY_MODEL: &str = "gpt-4o-mini";
const DEFAULT_SECONDARY_BASE_URL: &str = "https://openrouter.ai/api/v1";
const DEFAULT_SECONDARY_MODEL: &str = "google/gemini-2.0-flash-001";
const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

/// How a backend is asked to constrain its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredOutput {
    /// Strict JSON schema describing the six summary fields.
    JsonSchema,
    /// Any JSON object.
    JsonObject,
    None,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub structured_output: StructuredOutput,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub result_retention: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            result_retention: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DeliveryConfig {
    /// Rendered summaries longer than this are split into segments.
    pub single_message_limit: usize,
    pub segment_limit: usize,
    pub segment_pacing: Duration,
    pub network_retries: usize,
    pub network_retry_base: Duration,
    pub restriction_ttl: Duration,
    pub display_timezone: Tz,
    /// Command users type to request a summary, echoed in apologies.
    pub command_name: String,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            single_message_limit: 4_000,
            segment_limit: 3_500,
            segment_pacing: Duration::from_millis(500),
            network_retries: 3,
            network_retry_base: Duration::from_millis(500),
            restriction_ttl: Duration::from_secs(6 * 60 * 60),
            display_timezone: Tz::UTC,
            command_name: "/summary".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub telegram_bot_token: String,
    pub telegram_api_base: String,
    pub primary: ProviderConfig,
    pub secondary: ProviderConfig,
    pub max_output_tokens: u32,
    pub queue: QueueConfig,
    pub delivery: DeliveryConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let timeout = Duration::from_secs(parse_optional("PROVIDER_TIMEOUT_SECS")?.unwrap_or(120));

        let primary = ProviderConfig {
            base_url: env::var("PRIMARY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_PRIMARY_BASE_URL.to_string()),
            api_key: env::var("PRIMARY_API_KEY").map_err(|e| format!("PRIMARY_API_KEY: {}", e))?,
            model: env::var("PRIMARY_MODEL").unwrap_or_else(|_| DEFAULT_PRIMARY_MODEL.to_string()),
            structured_output: StructuredOutput::JsonSchema,
            timeout,
        };
        let secondary = ProviderConfig {
            base_url: env::var("SECONDARY_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_SECONDARY_BASE_URL.to_string()),
            api_key: env::var("SECONDARY_API_KEY")
                .map_err(|e| format!("SECONDARY_API_KEY: {}", e))?,
            model: env::var("SECONDARY_MODEL")
                .unwrap_or_else(|_| DEFAULT_SECONDARY_MODEL.to_string()),
            structured_output: StructuredOutput::JsonObject,
            timeout,
        };

        let mut queue = QueueConfig::default();
        if let Some(secs) = parse_optional("JOB_RETENTION_SECS")? {
            queue.result_retention = Duration::from_secs(secs);
        }

        let mut delivery = DeliveryConfig::default();
        if let Some(limit) = parse_optional("SEGMENT_LIMIT")? {
            delivery.segment_limit = limit;
        }
        if let Some(limit) = parse_optional("SINGLE_MESSAGE_LIMIT")? {
            delivery.single_message_limit = limit;
        }
        if let Some(secs) = parse_optional("RESTRICTION_TTL_SECS")? {
            delivery.restriction_ttl = Duration::from_secs(secs);
        }
        if let Ok(tz) = env::var("DISPLAY_TIMEZONE") {
            delivery.display_timezone = tz
                .parse::<Tz>()
                .map_err(|e| format!("DISPLAY_TIMEZONE: {}", e))?;
        }

        Ok(Self {
            telegram_bot_token: env::var("TELEGRAM_BOT_TOKEN")
                .map_err(|e| format!("TELEGRAM_BOT_TOKEN: {}", e))?,
            telegram_api_base: env::var("TELEGRAM_API_BASE")
                .unwrap_or_else(|_| DEFAULT_TELEGRAM_API_BASE.to_string()),
            primary,
            secondary,
            max_output_tokens: parse_optional("MAX_OUTPUT_TOKENS")?.unwrap_or(4_096),
            queue,
            delivery,
        })
    }
}

fn parse_optional<T>(name: &str) -> Result<Option<T>, String>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("{}: {}", name, e)),
        Err(_) => Ok(None),
    }
}
