//! Recovery of the structured summary returned by a provider.
//!
//! Providers are asked for a six-field JSON object, but what comes back is
//! regularly fenced, padded with prose, littered with trailing commas or cut
//! off when the output budget runs out. `normalize` walks through
//! increasingly forgiving tiers and always produces a usable
//! [`SummaryContent`]; in the worst case the body is a fixed apology.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;
use tracing::{info, warn};

use crate::core::models::{FinishReason, Language, SummaryContent};
use crate::utils::markup;

pub const FIELD_FORMATTED_SUMMARY: &str = "formatted_summary";
pub const FIELD_TOPICS: &str = "topics";
pub const FIELD_DISCUSSION_POINTS: &str = "discussion_points";
pub const FIELD_ACTIVITY_ANALYSIS: &str = "activity_analysis";
pub const FIELD_SPECIAL_EVENTS: &str = "special_events";
pub const FIELD_OTHER_NOTES: &str = "other_notes";

/// A body found by loose extraction must be at least this long unless it
/// carries markup.
const MIN_PLAUSIBLE_BODY_CHARS: usize = 40;

static FENCE_START_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*```[A-Za-z0-9_-]*[ \t]*\n?").expect("static regex compile"));

static FENCE_END_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?[ \t]*```\s*$").expect("static regex compile"));

static JSON_STRING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("static regex compile"));

static SUMMARY_CLOSED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""formatted_summary"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("static regex compile")
});

static SUMMARY_OPEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""formatted_summary"\s*:\s*"((?:[^"\\]|\\.)*)"#).expect("static regex compile")
});

static SUMMARY_LOOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)formatted[_ ]?summary['"]?\s*[:=]\s*['"]?([\s\S]+)"#)
        .expect("static regex compile")
});

/// Turns raw completion text into summary content. Never fails.
#[must_use]
pub fn normalize(raw: &str, finish: &FinishReason, language: Language) -> SummaryContent {
    if let Some(fields) = parse_fields(raw) {
        return fields.into_content(language, false);
    }

    let cleaned = cleanup(raw);
    if let Some(fields) = parse_fields(&cleaned) {
        info!("Summary parsed after cleanup");
        return fields.into_content(language, false);
    }

    if (finish.is_truncated() || looks_truncated(&cleaned))
        && let Some(fields) = repair_truncated(&cleaned)
    {
        warn!(
            "Summary output was truncated (finish={:?}); recovered partial fields",
            finish
        );
        return fields.into_content(language, true);
    }

    if let Some(body) = extract_summary_body(raw) {
        warn!("Summary recovered by loose extraction ({} chars)", body.chars().count());
        return SummaryContent {
            body: body.clone(),
            formatted_summary: body,
            recovered: true,
            ..SummaryContent::default()
        };
    }

    warn!("Summary output unrecoverable, returning apology");
    let apology = labels(language).apology.to_string();
    SummaryContent {
        body: apology.clone(),
        formatted_summary: apology,
        recovered: true,
        ..SummaryContent::default()
    }
}

struct SectionLabels {
    overview: &'static str,
    topics: &'static str,
    discussion_points: &'static str,
    activity_analysis: &'static str,
    special_events: &'static str,
    other_notes: &'static str,
    truncated: &'static str,
    apology: &'static str,
}

fn labels(language: Language) -> &'static SectionLabels {
    static EN: SectionLabels = SectionLabels {
        overview: "📋 Overview",
        topics: "📌 Main topics",
        discussion_points: "💬 Discussion points",
        activity_analysis: "📊 Activity",
        special_events: "🎉 Notable events",
        other_notes: "📝 Other notes",
        truncated: "content truncated, please retry",
        apology: "Sorry, I couldn't put together a summary this time. Please try again in a moment.",
    };
    static ZH: SectionLabels = SectionLabels {
        overview: "📋 概览",
        topics: "📌 主要话题",
        discussion_points: "💬 讨论要点",
        activity_analysis: "📊 活跃度分析",
        special_events: "🎉 特别事件",
        other_notes: "📝 其他",
        truncated: "内容被截断，请重试",
        apology: "抱歉，这次未能生成总结，请稍后重试。",
    };
    match language {
        Language::En => &EN,
        Language::Zh => &ZH,
    }
}

/// Field values pulled out of a (possibly repaired) document.
#[derive(Debug, Default)]
struct Fields {
    formatted_summary: Option<String>,
    topics: Option<Vec<String>>,
    discussion_points: Option<Vec<String>>,
    activity_analysis: Option<String>,
    special_events: Option<String>,
    other_notes: Option<String>,
}

impl Fields {
    fn from_object(object: &Map<String, Value>) -> Self {
        let get = |name: &str| object.get(name).filter(|v| !v.is_null());
        Self {
            formatted_summary: get(FIELD_FORMATTED_SUMMARY).map(value_to_text),
            topics: get(FIELD_TOPICS).map(value_to_list),
            discussion_points: get(FIELD_DISCUSSION_POINTS).map(value_to_list),
            activity_analysis: get(FIELD_ACTIVITY_ANALYSIS).map(value_to_text),
            special_events: get(FIELD_SPECIAL_EVENTS).map(value_to_text),
            other_notes: get(FIELD_OTHER_NOTES).map(value_to_text),
        }
    }

    fn has_side_fields(&self) -> bool {
        self.topics.as_ref().is_some_and(|v| !v.is_empty())
            || self.discussion_points.as_ref().is_some_and(|v| !v.is_empty())
            || [&self.activity_analysis, &self.special_events, &self.other_notes]
                .iter()
                .any(|f| f.as_ref().is_some_and(|s| !s.trim().is_empty()))
    }

    fn has_summary(&self) -> bool {
        self.formatted_summary
            .as_ref()
            .is_some_and(|s| !s.trim().is_empty())
    }

    fn is_usable(&self) -> bool {
        self.has_summary() || self.has_side_fields()
    }

    /// Fills every missing field with the truncation placeholder.
    fn with_placeholders(mut self, language: Language) -> Self {
        let placeholder = labels(language).truncated.to_string();
        let list_placeholder = vec![placeholder.clone()];
        self.topics.get_or_insert_with(|| list_placeholder.clone());
        self.discussion_points.get_or_insert(list_placeholder);
        self.activity_analysis.get_or_insert_with(|| placeholder.clone());
        self.special_events.get_or_insert_with(|| placeholder.clone());
        self.other_notes.get_or_insert(placeholder);
        self
    }

    fn into_content(self, language: Language, recovered: bool) -> SummaryContent {
        // Only fields the provider actually produced decide the layout
        let reconstruct = self.has_side_fields();
        let mut fields = if recovered {
            self.with_placeholders(language)
        } else {
            self
        };
        if recovered && !fields.has_summary() {
            fields.formatted_summary = Some(labels(language).truncated.to_string());
        }

        let content = SummaryContent {
            body: String::new(),
            formatted_summary: fields.formatted_summary.unwrap_or_default(),
            topics: fields.topics.unwrap_or_default(),
            discussion_points: fields.discussion_points.unwrap_or_default(),
            activity_analysis: fields.activity_analysis.unwrap_or_default(),
            special_events: fields.special_events.unwrap_or_default(),
            other_notes: fields.other_notes.unwrap_or_default(),
            recovered,
        };
        let body = if reconstruct {
            render_body(&content, language)
        } else {
            content.formatted_summary.clone()
        };
        SummaryContent { body, ..content }
    }
}

/// Builds the body from the six fields with fixed section headers so every
/// summary has the same visual structure.
#[must_use]
pub fn render_body(content: &SummaryContent, language: Language) -> String {
    let labels = labels(language);
    let mut sections: Vec<String> = Vec::new();

    let overview = content.formatted_summary.trim();
    if !overview.is_empty() {
        sections.push(format!("*{}*\n{}", labels.overview, markup::repair(overview)));
    }

    for (title, items) in [
        (labels.topics, &content.topics),
        (labels.discussion_points, &content.discussion_points),
    ] {
        let lines: Vec<String> = items
            .iter()
            .map(|item| item.trim())
            .filter(|item| !item.is_empty())
            .map(|item| format!("• {}", markup::repair(item)))
            .collect();
        if !lines.is_empty() {
            sections.push(format!("*{title}*\n{}", lines.join("\n")));
        }
    }

    for (title, text) in [
        (labels.activity_analysis, &content.activity_analysis),
        (labels.special_events, &content.special_events),
        (labels.other_notes, &content.other_notes),
    ] {
        let text = text.trim();
        if !text.is_empty() {
            sections.push(format!("*{title}*\n{}", markup::repair(text)));
        }
    }

    sections.join("\n\n")
}

fn parse_fields(text: &str) -> Option<Fields> {
    let value: Value = serde_json::from_str(text.trim()).ok()?;
    let fields = Fields::from_object(value.as_object()?);
    fields.is_usable().then_some(fields)
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Object(map) => map
            .values()
            .map(value_to_text)
            .filter(|s| !s.trim().is_empty())
            .collect::<Vec<_>>()
            .join("\n"),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn value_to_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .map(value_to_text)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        other => value_to_text(other)
            .lines()
            .map(|line| {
                line.trim()
                    .trim_start_matches(['-', '•', '*'])
                    .trim()
                    .to_string()
            })
            .filter(|s| !s.is_empty())
            .collect(),
    }
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    object: bool,
    expect_key: bool,
}

/// String-aware structural state at the end of a JSON-like text.
#[derive(Debug, Default)]
struct ScanState {
    in_string: bool,
    escaped: bool,
    frames: Vec<Frame>,
    /// Byte offset just past the brace that closed the outermost object.
    closed_at: Option<usize>,
}

fn scan(text: &str) -> ScanState {
    let mut state = ScanState::default();
    for (idx, ch) in text.char_indices() {
        if state.in_string {
            if state.escaped {
                state.escaped = false;
            } else if ch == '\\' {
                state.escaped = true;
            } else if ch == '"' {
                state.in_string = false;
            }
            continue;
        }
        match ch {
            '"' => state.in_string = true,
            '{' => state.frames.push(Frame {
                object: true,
                expect_key: true,
            }),
            '[' => state.frames.push(Frame {
                object: false,
                expect_key: false,
            }),
            '}' | ']' => {
                state.frames.pop();
                if state.frames.is_empty() {
                    state.closed_at = Some(idx + ch.len_utf8());
                    return state;
                }
            }
            ':' => {
                if let Some(top) = state.frames.last_mut() {
                    top.expect_key = false;
                }
            }
            ',' => {
                if let Some(top) = state.frames.last_mut() {
                    top.expect_key = top.object;
                }
            }
            _ => {}
        }
    }
    state
}

/// True when the text opens a string or container it never closes.
#[must_use]
pub fn looks_truncated(text: &str) -> bool {
    let Some(start) = text.find('{') else {
        return false;
    };
    let state = scan(&text[start..]);
    state.closed_at.is_none() && (state.in_string || !state.frames.is_empty())
}

fn strip_code_fences(text: &str) -> String {
    let without_start = FENCE_START_RE.replace(text, "");
    FENCE_END_RE.replace(&without_start, "").into_owned()
}

/// Slice from the first `{` to its matching `}`, or to the end of the text
/// when the object is never closed.
fn outermost_object(text: &str) -> &str {
    let Some(start) = text.find('{') else {
        return text;
    };
    let tail = &text[start..];
    match scan(tail).closed_at {
        Some(end) => &tail[..end],
        None => tail,
    }
}

/// Replaces raw control whitespace with spaces and drops trailing commas
/// outside of strings.
fn normalize_json_text(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    for (i, &ch) in chars.iter().enumerate() {
        let ch = if matches!(ch, '\n' | '\r' | '\t') { ' ' } else { ch };
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        } else if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}' | ']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

fn cleanup(raw: &str) -> String {
    let unfenced = strip_code_fences(raw.trim());
    normalize_json_text(outermost_object(&unfenced))
}

/// Closes whatever the cut-off text left open and re-reads the fields,
/// falling back to field-by-field pattern matching.
fn repair_truncated(text: &str) -> Option<Fields> {
    let start = text.find('{')?;
    let mut repaired = text[start..].trim_end().to_string();
    let state = scan(&repaired);

    if state.in_string {
        if state.escaped {
            repaired.pop();
        }
        repaired.push('"');
    }

    let mut frames = state.frames;
    let trimmed = repaired.trim_end();
    if trimmed.ends_with(',') {
        let keep = trimmed.len() - 1;
        repaired.truncate(keep);
    } else if trimmed.ends_with(':') {
        repaired.push_str(" null");
    } else if trimmed.ends_with('"')
        && frames
            .last()
            .is_some_and(|frame| frame.object && frame.expect_key)
    {
        // The cut happened right after an object key
        repaired.push_str(": null");
    }
    while let Some(frame) = frames.pop() {
        repaired.push(if frame.object { '}' } else { ']' });
    }

    let fields = match parse_fields(&repaired) {
        Some(fields) => fields,
        None => extract_fields(&repaired),
    };
    fields.is_usable().then_some(fields)
}

fn unescape_json_fragment(fragment: &str) -> String {
    let fragment = fragment.strip_suffix('\\').unwrap_or(fragment);
    serde_json::from_str::<String>(&format!("\"{fragment}\"")).unwrap_or_else(|_| {
        fragment
            .replace("\\n", "\n")
            .replace("\\t", " ")
            .replace("\\\"", "\"")
            .replace("\\\\", "\\")
    })
}

fn field_string(text: &str, name: &str) -> Option<String> {
    let pattern = format!(r#""{}"\s*:\s*"((?:[^"\\]|\\.)*)""#, regex::escape(name));
    let re = Regex::new(&pattern).ok()?;
    let caps = re.captures(text)?;
    let value = unescape_json_fragment(caps.get(1)?.as_str());
    (!value.trim().is_empty()).then_some(value)
}

fn field_list(text: &str, name: &str) -> Option<Vec<String>> {
    let pattern = format!(
        r#""{}"\s*:\s*\[((?:[^\]"]|"(?:[^"\\]|\\.)*")*)"#,
        regex::escape(name)
    );
    let re = Regex::new(&pattern).ok()?;
    let Some(caps) = re.captures(text) else {
        return field_string(text, name).map(|s| value_to_list(&Value::String(s)));
    };
    let inner = caps.get(1)?.as_str();
    let items: Vec<String> = JSON_STRING_RE
        .captures_iter(inner)
        .filter_map(|c| c.get(1))
        .map(|m| unescape_json_fragment(m.as_str()).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!items.is_empty()).then_some(items)
}

fn extract_fields(text: &str) -> Fields {
    Fields {
        formatted_summary: field_string(text, FIELD_FORMATTED_SUMMARY),
        topics: field_list(text, FIELD_TOPICS),
        discussion_points: field_list(text, FIELD_DISCUSSION_POINTS),
        activity_analysis: field_string(text, FIELD_ACTIVITY_ANALYSIS),
        special_events: field_string(text, FIELD_SPECIAL_EVENTS),
        other_notes: field_string(text, FIELD_OTHER_NOTES),
    }
}

fn is_plausible_body(candidate: &str) -> bool {
    markup::contains_markup(candidate) || candidate.chars().count() >= MIN_PLAUSIBLE_BODY_CHARS
}

/// Last resort: look for anything resembling the summary body in raw text.
fn extract_summary_body(raw: &str) -> Option<String> {
    let mut candidates: Vec<String> = Vec::new();
    if let Some(m) = SUMMARY_CLOSED_RE.captures(raw).and_then(|c| c.get(1)) {
        candidates.push(unescape_json_fragment(m.as_str()));
    }
    if let Some(m) = SUMMARY_OPEN_RE.captures(raw).and_then(|c| c.get(1)) {
        candidates.push(unescape_json_fragment(m.as_str()));
    }
    if let Some(m) = SUMMARY_LOOSE_RE.captures(raw).and_then(|c| c.get(1)) {
        let loose = m
            .as_str()
            .trim_end()
            .trim_end_matches(['}', ']', ',', '"', '\''])
            .trim_end();
        candidates.push(unescape_json_fragment(loose));
    }
    // Prose answers with no JSON at all
    if !raw.contains('{') {
        candidates.push(strip_code_fences(raw.trim()).trim().to_string());
    }

    candidates
        .into_iter()
        .map(|c| c.trim().to_string())
        .find(|c| !c.is_empty() && is_plausible_body(c))
}
