//! Splitting of oversized summaries into platform-sized segments.

/// Share of the segment limit searched backwards for a boundary.
const BOUNDARY_WINDOW_PERCENT: usize = 30;

const SENTENCE_ENDS: [char; 6] = ['.', '!', '?', '。', '！', '？'];

fn slice_end_for_max_chars(s: &str, max_chars: usize) -> usize {
    if max_chars == 0 {
        return 0;
    }

    for (count, (idx, _)) in s.char_indices().enumerate() {
        if count == max_chars {
            return idx;
        }
    }
    s.len()
}

fn sentence_boundary(prefix: &str, min: usize) -> Option<usize> {
    let mut next: Option<(usize, char)> = None;
    let mut found = None;
    for (idx, ch) in prefix.char_indices().rev() {
        if SENTENCE_ENDS.contains(&ch) {
            match next {
                // Western punctuation only ends a sentence before whitespace
                Some((ws_idx, ws)) if ws.is_whitespace() => {
                    found = Some(ws_idx + ws.len_utf8());
                }
                _ if !ch.is_ascii() => found = Some(idx + ch.len_utf8()),
                _ => {}
            }
            if found.is_some() {
                break;
            }
        }
        next = Some((idx, ch));
    }
    found.filter(|&p| p >= min)
}

fn word_boundary(prefix: &str, min: usize) -> Option<usize> {
    prefix
        .char_indices()
        .rev()
        .find(|(_, ch)| ch.is_whitespace())
        .map(|(idx, ch)| idx + ch.len_utf8())
        .filter(|&p| p >= min)
}

/// Byte offset to cut `prefix` at: paragraph > line > sentence > word, only
/// considering positions at or after `min`.
fn best_boundary(prefix: &str, min: usize) -> Option<usize> {
    let min = min.max(1);
    prefix
        .rfind("\n\n")
        .map(|p| p + 2)
        .filter(|&p| p >= min)
        .or_else(|| prefix.rfind('\n').map(|p| p + 1).filter(|&p| p >= min))
        .or_else(|| sentence_boundary(prefix, min))
        .or_else(|| word_boundary(prefix, min))
}

/// Splits `body` into segments of at most `limit` characters.
///
/// Boundaries are searched in the last 30% of each window so every segment
/// but the last keeps at least 70% of the limit; without a boundary the
/// window is hard-split. Concatenating the segments yields `body`.
#[must_use]
pub fn split_segments(body: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    let min_chars = limit - limit * BOUNDARY_WINDOW_PERCENT / 100;
    let mut segments = Vec::new();
    let mut rest = body;

    while !rest.is_empty() {
        if rest.chars().count() <= limit {
            segments.push(rest.to_string());
            break;
        }
        let window_end = slice_end_for_max_chars(rest, limit);
        let window_start = slice_end_for_max_chars(rest, min_chars);
        let split = best_boundary(&rest[..window_end], window_start).unwrap_or(window_end);
        segments.push(rest[..split].to_string());
        rest = &rest[split..];
    }
    segments
}
