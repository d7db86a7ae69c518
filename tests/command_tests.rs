mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{CallKind, RecordingTransport, message};
use recap::api::parsing::{CountArgumentError, split_command};
use recap::api::{CommandOutcome, CommandRequest, SummaryCommand, parse_count_argument};
use recap::archive::InMemoryArchive;
use recap::core::config::{DeliveryConfig, QueueConfig};
use recap::core::models::{Job, JobEvent, Language, SummaryDocument, Usage};
use recap::core::store::{ResultCache, SendRestrictions};
use recap::errors::{JobFailure, SendError};
use recap::worker::handler::handle_event;
use recap::worker::{DeliveryManager, DeliveryOutcome, JobQueue, Summarizer};
use tokio::sync::mpsc;

#[test]
fn test_count_argument_defaults_and_bounds() {
    assert_eq!(parse_count_argument(None), Ok(100));
    assert_eq!(parse_count_argument(Some("   ")), Ok(100));
    assert_eq!(parse_count_argument(Some("1")), Ok(1));
    assert_eq!(parse_count_argument(Some("1000")), Ok(1000));
    assert_eq!(parse_count_argument(Some("250 please")), Ok(250));

    assert_eq!(
        parse_count_argument(Some("0")),
        Err(CountArgumentError::OutOfRange(0))
    );
    assert_eq!(
        parse_count_argument(Some("1001")),
        Err(CountArgumentError::OutOfRange(1001))
    );
    assert_eq!(
        parse_count_argument(Some("-5")),
        Err(CountArgumentError::OutOfRange(-5))
    );
    assert_eq!(
        parse_count_argument(Some("lots")),
        Err(CountArgumentError::NotANumber("lots".to_string()))
    );
}

#[test]
fn test_split_command_drops_bot_mention() {
    assert_eq!(split_command("/summary"), Some(("/summary", None)));
    assert_eq!(
        split_command("/summary@RecapBot 50"),
        Some(("/summary", Some("50")))
    );
    assert_eq!(split_command("hello there"), None);
}

struct EchoSummarizer {
    recovered: bool,
}

#[async_trait]
impl Summarizer for EchoSummarizer {
    async fn summarize(&self, job: &Job) -> Result<SummaryDocument, JobFailure> {
        let body = if self.recovered {
            "Sorry, the summary could not be generated this time.".to_string()
        } else {
            format!("*Recap*\n{} messages", job.payload.messages.len())
        };
        Ok(SummaryDocument {
            body,
            language: Language::En,
            messages_analyzed: job.payload.messages.len(),
            unique_users: job.payload.unique_authors(),
            time_range: job.payload.time_range(),
            top_participants: job.payload.top_participants.clone(),
            usage: Usage::default(),
            provider: None,
            recovered: self.recovered,
        })
    }
}

struct Harness {
    command: SummaryCommand,
    transport: Arc<RecordingTransport>,
    delivery: Arc<DeliveryManager>,
    cache: Arc<ResultCache>,
    queue: JobQueue,
    events: mpsc::UnboundedReceiver<JobEvent>,
}

fn harness(transport: RecordingTransport) -> Harness {
    harness_with(transport, EchoSummarizer { recovered: false })
}

fn harness_with(transport: RecordingTransport, summarizer: EchoSummarizer) -> Harness {
    let archive = Arc::new(InMemoryArchive::new());
    archive.append("chat-1", message("alice", "shall we ship friday?", 0));
    archive.append("chat-1", message("bob", "fine by me", 3));
    archive.append("chat-1", message("alice", "friday it is", 7));

    let transport = Arc::new(transport);
    let delivery = Arc::new(DeliveryManager::new(
        transport.clone(),
        Arc::new(SendRestrictions::new()),
        DeliveryConfig::default(),
    ));
    let cache = Arc::new(ResultCache::new(Duration::from_secs(600)));
    let (queue, events) = JobQueue::new(Arc::new(summarizer), QueueConfig::default());
    let command = SummaryCommand::new(
        archive,
        transport.clone(),
        queue.clone(),
        delivery.clone(),
        cache.clone(),
    );
    Harness {
        command,
        transport,
        delivery,
        cache,
        queue,
        events,
    }
}

fn request(conversation: &str, text: &str) -> CommandRequest {
    CommandRequest {
        conversation_id: conversation.to_string(),
        requester_id: "user-1".to_string(),
        text: text.to_string(),
    }
}

#[tokio::test]
async fn test_command_posts_placeholder_and_enqueues_anchored_job() {
    let mut h = harness(RecordingTransport::new());

    let outcome = h.command.handle(&request("chat-1", "/summary 2")).await;
    let CommandOutcome::Enqueued(job_id) = outcome else {
        panic!("Unexpected outcome: {outcome:?}");
    };

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].kind, CallKind::Send);
    assert_eq!(calls[0].text, "Summarizing the last 2 messages…");

    let Some(JobEvent::Started { context }) = h.events.recv().await else {
        panic!("expected a started event");
    };
    assert_eq!(context.job_id, job_id);
    assert_eq!(context.target.anchor_message_id.as_deref(), Some("1000"));
    assert_eq!(context.target.requested_count, 2);

    let Some(JobEvent::Completed { document, .. }) = h.events.recv().await else {
        panic!("expected a completed event");
    };
    // Only the two most recent messages were handed over
    assert_eq!(document.messages_analyzed, 2);
    assert_eq!(document.unique_users, 2);
}

#[tokio::test]
async fn test_identical_request_is_served_from_cache() {
    let mut h = harness(RecordingTransport::new());

    let first = h.command.handle(&request("chat-1", "/summary")).await;
    assert!(matches!(first, CommandOutcome::Enqueued(_)));
    for _ in 0..2 {
        let event = h.events.recv().await.unwrap();
        handle_event(event, &h.delivery, &h.cache).await;
    }
    // Placeholder plus the edit that replaced it
    assert_eq!(h.transport.call_count(), 2);

    let second = h.command.handle(&request("chat-1", "/summary@RecapBot")).await;
    assert_eq!(second, CommandOutcome::Cached);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].kind, CallKind::Send);
    assert!(calls[2].text.starts_with("*Recap*\n3 messages"));
    h.queue.wait_idle().await;
    assert!(h.events.try_recv().is_err(), "no second job was enqueued");
}

#[tokio::test]
async fn test_recovered_summary_is_not_served_from_cache() {
    let mut h = harness_with(RecordingTransport::new(), EchoSummarizer { recovered: true });

    h.command.handle(&request("chat-1", "/summary")).await;
    for _ in 0..2 {
        let event = h.events.recv().await.unwrap();
        handle_event(event, &h.delivery, &h.cache).await;
    }
    let calls = h.transport.calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[1].text.starts_with("Sorry, the summary could not be generated"));

    let again = h.command.handle(&request("chat-1", "/summary")).await;
    assert!(matches!(again, CommandOutcome::Enqueued(_)), "got {again:?}");
    let Some(JobEvent::Started { .. }) = h.events.recv().await else {
        panic!("expected a fresh job to start");
    };
}

#[tokio::test]
async fn test_different_count_misses_cache() {
    let mut h = harness(RecordingTransport::new());

    h.command.handle(&request("chat-1", "/summary 3")).await;
    for _ in 0..2 {
        let event = h.events.recv().await.unwrap();
        handle_event(event, &h.delivery, &h.cache).await;
    }

    let outcome = h.command.handle(&request("chat-1", "/summary 2")).await;
    assert!(matches!(outcome, CommandOutcome::Enqueued(_)));
}

#[tokio::test]
async fn test_invalid_count_replies_with_usage() {
    let h = harness(RecordingTransport::new());

    let outcome = h.command.handle(&request("chat-1", "/summary 5000")).await;
    assert_eq!(
        outcome,
        CommandOutcome::InvalidArgument("count must be between 1 and 1000, got 5000".to_string())
    );

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert!(calls[0].text.contains("Usage: /summary [1-1000]"));
    assert!(h.queue.is_idle());
}

#[tokio::test]
async fn test_empty_conversation_is_not_enqueued() {
    let h = harness(RecordingTransport::new());

    let outcome = h.command.handle(&request("chat-empty", "/summary")).await;
    assert_eq!(outcome, CommandOutcome::NoMessages);

    let calls = h.transport.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].text, "No messages found to summarize.");
    assert!(h.queue.is_idle());
}

#[tokio::test]
async fn test_restricted_conversation_makes_no_calls() {
    let h = harness(RecordingTransport::new());
    h.delivery
        .restrictions()
        .mark_send_restricted("chat-1", "bot was kicked", Duration::from_secs(60));

    let outcome = h.command.handle(&request("chat-1", "/summary")).await;
    assert_eq!(outcome, CommandOutcome::Restricted);
    assert_eq!(h.transport.call_count(), 0);
}

#[tokio::test]
async fn test_placeholder_permission_error_restricts_without_enqueue() {
    let h = harness(RecordingTransport::scripted(vec![Err(SendError::Permission(
        "have no rights to send a message".to_string(),
    ))]));

    let outcome = h.command.handle(&request("chat-1", "/summary")).await;
    assert_eq!(outcome, CommandOutcome::Restricted);
    assert!(h.delivery.restrictions().is_send_restricted("chat-1"));
    assert!(h.queue.is_idle());

    // The next command is dropped without touching the platform
    let outcome = h.command.handle(&request("chat-1", "/summary")).await;
    assert_eq!(outcome, CommandOutcome::Restricted);
    assert_eq!(h.transport.call_count(), 1);
}

#[tokio::test]
async fn test_placeholder_failure_still_enqueues_unanchored_job() {
    let mut h = harness(RecordingTransport::scripted(vec![Err(SendError::Other(
        "bad gateway".to_string(),
    ))]));

    let outcome = h.command.handle(&request("chat-1", "/summary")).await;
    assert!(matches!(outcome, CommandOutcome::Enqueued(_)));

    let Some(JobEvent::Started { context }) = h.events.recv().await else {
        panic!("expected a started event");
    };
    assert_eq!(context.target.anchor_message_id, None);

    let completed = h.events.recv().await.unwrap();
    let outcome = handle_event(completed, &h.delivery, &h.cache).await;
    assert!(matches!(outcome, Some(DeliveryOutcome::Delivered { .. })));
    assert_eq!(h.transport.calls()[1].kind, CallKind::Send);
}
