//! Telegram transport and message rendering

pub mod client;
pub mod message_formatter;

pub use client::{ChatTransport, ParseMode, TelegramClient};
pub use message_formatter::{RenderedSummary, render_summary};
