//! Sanitizer for the chat platform's lightweight markup dialect.
//!
//! Supported markup: bold `*x*`, italic `_x_`, code `` `x` `` and links
//! `[x](y)`. The reserved characters `* _ ` [ ]` are escaped with a single
//! backslash. The platform parser rejects unbalanced or nested markers, so
//! everything in here exists to keep text on the right side of that parser.

use regex::Regex;
use std::sync::LazyLock;

/// Characters that carry meaning in the markup dialect.
pub const RESERVED: [char; 5] = ['*', '_', '`', '[', ']'];

/// Markers that must appear in pairs.
const PAIRED: [char; 3] = ['*', '_', '`'];

/// Longest bold span `smart_escape` still treats as a title.
const MAX_TITLE_CHARS: usize = 120;

static LINK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([^\[\]\n\\]*)\]\(([^()\s]+)\)").expect("static regex compile")
});

static NESTED_BOLD_ITALIC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\\])\*_([^*_\n]+)_\*").expect("static regex compile")
});

static NESTED_ITALIC_BOLD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\\])_\*([^*_\n]+)\*_").expect("static regex compile")
});

#[must_use]
pub fn is_reserved(c: char) -> bool {
    RESERVED.contains(&c)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Token {
    ch: char,
    escaped: bool,
}

impl Token {
    fn marker(self, c: char) -> bool {
        !self.escaped && self.ch == c
    }
}

/// Splits text into characters, folding `\x` for reserved `x` into one
/// escaped token.
fn tokenize(text: &str) -> Vec<Token> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::with_capacity(chars.len());
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        if ch == '\\' && chars.get(i + 1).is_some_and(|&next| is_reserved(next)) {
            tokens.push(Token {
                ch: chars[i + 1],
                escaped: true,
            });
            i += 2;
        } else {
            tokens.push(Token { ch, escaped: false });
            i += 1;
        }
    }
    tokens
}

fn render(tokens: &[Token]) -> String {
    let mut out = String::with_capacity(tokens.len() + 8);
    for token in tokens {
        if token.escaped {
            out.push('\\');
        }
        out.push(token.ch);
    }
    out
}

/// Backslash-escapes every reserved character. Characters that are already
/// escaped are left alone, so applying `escape` twice changes nothing.
#[must_use]
pub fn escape(text: &str) -> String {
    let tokens: Vec<Token> = tokenize(text)
        .into_iter()
        .map(|t| Token {
            ch: t.ch,
            escaped: t.escaped || is_reserved(t.ch),
        })
        .collect();
    render(&tokens)
}

// Escaped characters are literal text and survive as their bare character.
fn remove_markers(text: &str) -> String {
    tokenize(text)
        .into_iter()
        .filter(|t| t.escaped || !is_reserved(t.ch))
        .map(|t| t.ch)
        .collect()
}

/// Removes all markup, turning `[label](url)` into `label (url)` and `\_`
/// back into `_`.
#[must_use]
pub fn strip(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in LINK_RE.captures_iter(text) {
        let (Some(whole), Some(label), Some(url)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        if text[..whole.start()].ends_with('\\') {
            continue;
        }
        out.push_str(&remove_markers(&text[last..whole.start()]));
        let label = remove_markers(label.as_str());
        // URLs keep their underscores; they are not markup
        if label.trim().is_empty() || label == url.as_str() {
            out.push_str(url.as_str());
        } else {
            out.push_str(&label);
            out.push_str(" (");
            out.push_str(url.as_str());
            out.push(')');
        }
        last = whole.end();
    }
    out.push_str(&remove_markers(&text[last..]));
    out
}

/// True when the text contains at least one unescaped markup marker.
#[must_use]
pub fn contains_markup(text: &str) -> bool {
    tokenize(text)
        .iter()
        .any(|t| !t.escaped && is_reserved(t.ch))
}

fn is_line_start(tokens: &[Token], index: usize) -> bool {
    tokens[..index]
        .iter()
        .rev()
        .take_while(|t| t.ch != '\n')
        .all(|t| t.ch == ' ' || t.ch == '\t')
}

fn is_bullet(tokens: &[Token], index: usize) -> bool {
    tokens[index].marker('*')
        && tokens.get(index + 1).is_some_and(|t| t.ch == ' ')
        && is_line_start(tokens, index)
}

/// Heuristically repairs markup the platform parser would reject.
///
/// - `**x**` / `__x__` collapse to single markers and `*_x_*` nesting is
///   flattened to the outer marker.
/// - A `*` used as a bullet at line start becomes `•`.
/// - An odd count of unescaped `*`, `_` or `` ` `` escapes the last one.
/// - `[` and `]` that are not part of a link are escaped.
///
/// Text without unescaped markers passes through unchanged.
#[must_use]
pub fn repair(text: &str) -> String {
    let flattened = NESTED_BOLD_ITALIC_RE.replace_all(text, "$1*$2*");
    let flattened = NESTED_ITALIC_BOLD_RE.replace_all(&flattened, "${1}_${2}_");

    let mut tokens: Vec<Token> = Vec::with_capacity(flattened.len());
    for token in tokenize(&flattened) {
        let doubled = ['*', '_']
            .iter()
            .any(|&c| token.marker(c) && tokens.last().is_some_and(|prev: &Token| prev.marker(c)));
        if !doubled {
            tokens.push(token);
        }
    }

    for i in 0..tokens.len() {
        if is_bullet(&tokens, i) {
            tokens[i].ch = '•';
        }
    }

    for marker in PAIRED {
        let positions: Vec<usize> = tokens
            .iter()
            .enumerate()
            .filter(|(_, t)| t.marker(marker))
            .map(|(i, _)| i)
            .collect();
        if positions.len() % 2 == 1 {
            if let Some(&last) = positions.last() {
                tokens[last].escaped = true;
            }
        }
    }

    escape_stray_brackets(&mut tokens);
    render(&tokens)
}

fn find_link_end(tokens: &[Token], open: usize) -> Option<(usize, usize)> {
    let mut i = open + 1;
    while i < tokens.len() {
        let t = tokens[i];
        if t.ch == '\n' || t.marker('[') {
            return None;
        }
        if t.marker(']') {
            break;
        }
        i += 1;
    }
    let close_bracket = i;
    if tokens.get(close_bracket + 1).map(|t| t.ch) != Some('(') {
        return None;
    }
    let mut j = close_bracket + 2;
    while j < tokens.len() {
        let ch = tokens[j].ch;
        if ch == ')' {
            return (j > close_bracket + 2).then_some((close_bracket, j));
        }
        if ch.is_whitespace() || ch == '(' {
            return None;
        }
        j += 1;
    }
    None
}

fn escape_stray_brackets(tokens: &mut [Token]) {
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].marker('[') {
            if let Some((_, paren_close)) = find_link_end(tokens, i) {
                i = paren_close + 1;
                continue;
            }
            tokens[i].escaped = true;
        } else if tokens[i].marker(']') {
            tokens[i].escaped = true;
        }
        i += 1;
    }
}

/// Escapes everything except same-line bold spans, which are kept as titles.
/// Inside a kept span only characters that would break parsing are escaped.
#[must_use]
pub fn smart_escape(text: &str) -> String {
    let mut tokens = tokenize(text);
    let mut i = 0;
    while i < tokens.len() {
        if tokens[i].marker('*') && !is_bullet(&tokens, i) {
            if let Some(close) = find_title_close(&tokens, i) {
                for token in &mut tokens[i + 1..close] {
                    if is_reserved(token.ch) {
                        token.escaped = true;
                    }
                }
                i = close + 1;
                continue;
            }
        }
        if is_reserved(tokens[i].ch) {
            tokens[i].escaped = true;
        }
        i += 1;
    }
    render(&tokens)
}

fn find_title_close(tokens: &[Token], open: usize) -> Option<usize> {
    let first = tokens.get(open + 1)?;
    if first.ch.is_whitespace() || first.marker('*') {
        return None;
    }
    tokens
        .iter()
        .enumerate()
        .skip(open + 1)
        .take(MAX_TITLE_CHARS + 1)
        .take_while(|(_, t)| t.ch != '\n')
        .find(|(_, t)| t.marker('*'))
        .map(|(idx, _)| idx)
        .filter(|&idx| !tokens[idx - 1].ch.is_whitespace())
}
