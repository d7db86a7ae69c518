//! Job processing: queue, summarization workflow and delivery

pub mod deliver;
pub mod handler;
pub mod queue;
pub mod segment;
pub mod summarize;

pub use deliver::{DeliveryManager, DeliveryOutcome, Representation};
pub use handler::run_event_loop;
pub use queue::{JobQueue, JobRecord};
pub use summarize::{Summarizer, SummaryWorkflow};
