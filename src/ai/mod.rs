//! All AI/LLM functionality

pub mod client;
pub mod gateway;
pub mod prompt_builder;
pub mod recovery;

// Re-export main types for convenience
pub use client::{CompletionBackend, ModelParams, OpenAiCompatBackend, estimate_tokens};
pub use gateway::ProviderGateway;
pub use recovery::normalize;
