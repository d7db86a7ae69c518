/// Recap - asynchronous chat summarization pipeline for Telegram groups.
///
/// A summary command enqueues a job; a single worker drains the queue,
/// asks a primary LLM provider (falling back to a secondary one) for a
/// structured summary, repairs whatever comes back and hands the result to
/// the delivery manager, which degrades through several message
/// representations until the platform accepts one.
///
/// # Architecture
///
/// The system uses:
/// - tokio for the async runtime, the job queue and the event channel
/// - reqwest for both the LLM providers and the Telegram Bot API
/// - openai-api-rs message types for prompts
/// - tokio-retry for network retries during delivery
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use recap::ai::{ModelParams, OpenAiCompatBackend, ProviderGateway};
/// use recap::core::config::AppConfig;
/// use recap::core::store::{ResultCache, SendRestrictions};
/// use recap::telegram::TelegramClient;
/// use recap::worker::{DeliveryManager, JobQueue, SummaryWorkflow, run_event_loop};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     recap::setup_logging();
///     let config = AppConfig::from_env()?;
///
///     let gateway = ProviderGateway::new(
///         Box::new(OpenAiCompatBackend::new("primary", config.primary.clone())?),
///         Box::new(OpenAiCompatBackend::new("secondary", config.secondary.clone())?),
///     );
///     let params = ModelParams { max_output_tokens: config.max_output_tokens, ..Default::default() };
///     let workflow = Arc::new(SummaryWorkflow::new(gateway, params));
///     let (queue, events) = JobQueue::new(workflow, config.queue.clone());
///
///     let transport = Arc::new(TelegramClient::new(&config.telegram_api_base, &config.telegram_bot_token));
///     let delivery = Arc::new(DeliveryManager::new(
///         transport,
///         Arc::new(SendRestrictions::new()),
///         config.delivery.clone(),
///     ));
///     let cache = Arc::new(ResultCache::new(config.queue.result_retention));
///     tokio::spawn(run_event_loop(events, delivery, cache));
///
///     // queue.enqueue(payload) for every incoming request
///     queue.wait_idle().await;
///     Ok(())
/// }
/// ```
// Module declarations
pub mod ai;
pub mod api;
pub mod archive;
pub mod core;
pub mod errors;
pub mod telegram;
pub mod utils;
pub mod worker;

pub use errors::{JobFailure, RecapError, SendError};

/// Configure structured JSON logging.
///
/// The filter is read from `RUST_LOG` and defaults to `info`. Calling this
/// more than once is harmless; later calls leave the first subscriber in
/// place.
///
/// # Example
///
/// ```
/// recap::setup_logging();
/// ```
pub fn setup_logging() {
    use tracing_subscriber::prelude::*;
    let fmt_layer = tracing_subscriber::fmt::layer().json().with_target(true);
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init();
}
