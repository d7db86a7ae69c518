use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::info;

use super::deliver::{DeliveryManager, DeliveryOutcome};
use crate::core::models::JobEvent;
use crate::core::store::ResultCache;

/// Handles one lifecycle event: caches and delivers completed summaries,
/// shows the failure notice for failed jobs.
pub async fn handle_event(
    event: JobEvent,
    delivery: &DeliveryManager,
    cache: &ResultCache,
) -> Option<DeliveryOutcome> {
    match event {
        JobEvent::Started { context } => {
            info!(
                "job={} started for conversation {} (requester {})",
                context.job_id, context.target.conversation_id, context.requester_id
            );
            None
        }
        JobEvent::Completed { context, document } => {
            // An apology stands in for a failed completion; the next request retries
            if !document.recovered {
                cache.set(context.fingerprint.clone(), document.clone());
            }
            let outcome = delivery.deliver(&context.target, &document).await;
            info!("job={} delivery outcome: {:?}", context.job_id, outcome);
            Some(outcome)
        }
        JobEvent::Failed { context, error } => {
            let outcome = delivery.deliver_failure(&context.target, &error).await;
            info!(
                "job={} failure ({}) notice outcome: {:?}",
                context.job_id, error, outcome
            );
            Some(outcome)
        }
    }
}

/// Single consumer of job lifecycle events. Runs until every sender is
/// dropped.
pub async fn run_event_loop(
    mut receiver: mpsc::UnboundedReceiver<JobEvent>,
    delivery: Arc<DeliveryManager>,
    cache: Arc<ResultCache>,
) {
    while let Some(event) = receiver.recv().await {
        handle_event(event, &delivery, &cache).await;
    }
    info!("Job event channel closed, event loop exiting");
}
