//! Single-consumer FIFO job queue
//!
//! `enqueue` only appends and, when no drain task is running, spawns one.
//! The drain task pops jobs oldest first and runs them one at a time, so at
//! most one job is ever `processing`. Lifecycle events go out over an
//! unbounded channel whose only receiver is handed back by [`JobQueue::new`].

use std::any::Any;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};

use futures::FutureExt;
use tokio::sync::{Notify, mpsc};
use tracing::{error, info, warn};

use super::summarize::Summarizer;
use crate::core::config::QueueConfig;
use crate::core::models::{Job, JobEvent, JobId, JobPayload, JobStatus, SummaryDocument};
use crate::core::store::TtlStore;
use crate::errors::JobFailure;

/// A job's state and, once finished, its outcome.
#[derive(Debug, Clone)]
pub struct JobRecord {
    pub status: JobStatus,
    pub outcome: Option<Result<SummaryDocument, JobFailure>>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Job>,
    draining: bool,
}

struct Inner {
    summarizer: Arc<dyn Summarizer>,
    config: QueueConfig,
    state: Mutex<QueueState>,
    records: TtlStore<JobId, JobRecord>,
    events: mpsc::UnboundedSender<JobEvent>,
    idle: Notify,
}

#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl JobQueue {
    #[must_use]
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        config: QueueConfig,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let queue = Self {
            inner: Arc::new(Inner {
                summarizer,
                config,
                state: Mutex::new(QueueState::default()),
                records: TtlStore::new(),
                events,
                idle: Notify::new(),
            }),
        };
        (queue, receiver)
    }

    /// Appends a job and returns its id. Never blocks and never fails.
    ///
    /// Must be called from within a tokio runtime.
    pub fn enqueue(&self, payload: JobPayload) -> JobId {
        let job = Job::new(payload);
        let job_id = job.id;
        info!(
            "job={} enqueued for conversation {}",
            job_id, job.payload.conversation_id
        );
        self.inner.set_record(job_id, JobStatus::Queued, None);

        let start_drain = {
            let mut state = self.inner.lock();
            state.pending.push_back(job);
            !std::mem::replace(&mut state.draining, true)
        };
        if start_drain {
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
        job_id
    }

    #[must_use]
    pub fn status(&self, job_id: &JobId) -> Option<JobStatus> {
        self.inner.records.get(job_id).map(|r| r.status)
    }

    #[must_use]
    pub fn record(&self, job_id: &JobId) -> Option<JobRecord> {
        self.inner.records.get(job_id)
    }

    /// Job records currently held, expired ones included until the next purge.
    #[must_use]
    pub fn retained_records(&self) -> usize {
        self.inner.records.len()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        let state = self.inner.lock();
        !state.draining && state.pending.is_empty()
    }

    /// Resolves once the queue is empty and no job is being processed.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn set_record(
        &self,
        job_id: JobId,
        status: JobStatus,
        outcome: Option<Result<SummaryDocument, JobFailure>>,
    ) {
        self.records.insert(
            job_id,
            JobRecord { status, outcome },
            self.config.result_retention,
        );
    }

    fn emit(&self, event: JobEvent) {
        if self.events.send(event).is_err() {
            warn!("Job event dropped: no receiver is listening");
        }
    }

    async fn process(&self, job: Job) {
        let context = job.context();
        self.set_record(job.id, JobStatus::Processing, None);
        info!("job={} processing", job.id);
        self.emit(JobEvent::Started {
            context: context.clone(),
        });

        let outcome = AssertUnwindSafe(self.summarizer.summarize(&job))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobFailure::Internal(panic_message(panic.as_ref()))));

        match outcome {
            Ok(document) => {
                info!("job={} completed", job.id);
                self.set_record(job.id, JobStatus::Completed, Some(Ok(document.clone())));
                self.emit(JobEvent::Completed { context, document });
            }
            Err(failure) => {
                error!("job={} failed: {}", job.id, failure);
                self.set_record(job.id, JobStatus::Failed, Some(Err(failure.clone())));
                self.emit(JobEvent::Failed {
                    context,
                    error: failure,
                });
            }
        }
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("summarizer panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("summarizer panicked: {s}")
    } else {
        "summarizer panicked".to_string()
    }
}

async fn drain(inner: Arc<Inner>) {
    loop {
        let next = {
            let mut state = inner.lock();
            let next = state.pending.pop_front();
            if next.is_none() {
                state.draining = false;
            }
            next
        };
        let Some(job) = next else {
            inner.idle.notify_waiters();
            return;
        };
        inner.process(job).await;
        // A queue that never goes idle still sheds old records
        let purged = inner.records.purge_expired();
        if purged > 0 {
            info!("Purged {} expired job records", purged);
        }
    }
}
