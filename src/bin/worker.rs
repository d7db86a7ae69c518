use std::sync::Arc;

use anyhow::Context;
use recap::ai::{ModelParams, OpenAiCompatBackend, ProviderGateway};
use recap::core::config::AppConfig;
use recap::core::models::JobPayload;
use recap::core::store::{ResultCache, SendRestrictions};
use recap::telegram::TelegramClient;
use recap::worker::{DeliveryManager, JobQueue, SummaryWorkflow, run_event_loop};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

/// Reads newline-delimited JSON job payloads from stdin, summarizes and
/// delivers each one, and exits once every job has been delivered.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    recap::setup_logging();

    let config = AppConfig::from_env().map_err(|e| {
        error!("Config error: {}", e);
        anyhow::anyhow!(e)
    })?;

    let gateway = ProviderGateway::new(
        Box::new(
            OpenAiCompatBackend::new("primary", config.primary.clone())
                .context("Failed to initialize primary provider")?,
        ),
        Box::new(
            OpenAiCompatBackend::new("secondary", config.secondary.clone())
                .context("Failed to initialize secondary provider")?,
        ),
    );
    let params = ModelParams {
        max_output_tokens: config.max_output_tokens,
        ..ModelParams::default()
    };
    let workflow = Arc::new(SummaryWorkflow::new(gateway, params));
    let (queue, events) = JobQueue::new(workflow, config.queue.clone());

    let transport = Arc::new(TelegramClient::new(
        &config.telegram_api_base,
        &config.telegram_bot_token,
    ));
    let delivery = Arc::new(DeliveryManager::new(
        transport,
        Arc::new(SendRestrictions::new()),
        config.delivery.clone(),
    ));
    let cache = Arc::new(ResultCache::new(config.queue.result_retention));
    let consumer = tokio::spawn(run_event_loop(events, delivery, cache));

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut accepted = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<JobPayload>(&line) {
            Ok(payload) => {
                let job_id = queue.enqueue(payload);
                accepted += 1;
                info!("Accepted job {}", job_id);
            }
            Err(e) => error!("Skipping malformed job payload: {}", e),
        }
    }

    info!("Input closed after {} jobs, waiting for the queue to drain", accepted);
    queue.wait_idle().await;
    // Dropping the last queue handle closes the event channel
    drop(queue);
    consumer.await.context("Event consumer task failed")?;
    Ok(())
}
