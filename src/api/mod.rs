//! Command surface: argument parsing and the summary command

pub mod command_handler;
pub mod parsing;

pub use command_handler::{CommandOutcome, CommandRequest, SummaryCommand};
pub use parsing::parse_count_argument;
