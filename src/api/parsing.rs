use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub const DEFAULT_MESSAGE_COUNT: u32 = 100;
pub const MIN_MESSAGE_COUNT: u32 = 1;
pub const MAX_MESSAGE_COUNT: u32 = 1_000;

// `/summary`, `/summary@SomeBot`, optionally followed by arguments
static COMMAND_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(/[A-Za-z0-9_]+)(?:@[A-Za-z0-9_]+)?(?:\s+(.*?))?\s*$")
        .expect("static regex compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CountArgumentError {
    #[error("'{0}' is not a number")]
    NotANumber(String),

    #[error("count must be between 1 and 1000, got {0}")]
    OutOfRange(i64),
}

/// Splits a command message into the command name (without bot mention)
/// and its argument text, if any.
#[must_use]
pub fn split_command(text: &str) -> Option<(&str, Option<&str>)> {
    let caps = COMMAND_RE.captures(text)?;
    let command = caps.get(1)?.as_str();
    let argument = caps
        .get(2)
        .map(|m| m.as_str())
        .filter(|arg| !arg.is_empty());
    Some((command, argument))
}

/// Parses the optional message-count argument (1–1000, default 100).
///
/// # Errors
///
/// Returns an error if the argument is not an integer or is out of range.
pub fn parse_count_argument(argument: Option<&str>) -> Result<u32, CountArgumentError> {
    let Some(raw) = argument.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(DEFAULT_MESSAGE_COUNT);
    };
    // Only the first word counts; trailing text is ignored
    let first = raw.split_whitespace().next().unwrap_or(raw);
    let value: i64 = first
        .parse()
        .map_err(|_| CountArgumentError::NotANumber(first.to_string()))?;
    if !(i64::from(MIN_MESSAGE_COUNT)..=i64::from(MAX_MESSAGE_COUNT)).contains(&value) {
        return Err(CountArgumentError::OutOfRange(value));
    }
    u32::try_from(value).map_err(|_| CountArgumentError::OutOfRange(value))
}
