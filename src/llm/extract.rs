//! Deterministic JSON extraction from free-form LLM responses (§4.1).
//!
//! Ordered policy:
//! 1. A fenced ```json``` block, if its contents parse.
//! 2. The first fenced block (of any tag) whose contents parse.
//! 3. The longest substring starting with `{` and ending with `}` that
//!    parses.
//! 4. The longest substring starting with `[` and ending with `]` that
//!    parses.
//! 5. Otherwise, fail.

use crate::prelude::*;

/// Extract a JSON [`Value`] from `text` per the ordered policy above.
/// Returns `None` if no step succeeds.
pub fn extract_json(text: &str) -> Option<Value> {
    if let Some(value) = extract_from_tagged_fence(text, "json") {
        return Some(value);
    }
    if let Some(value) = extract_from_any_fence(text) {
        return Some(value);
    }
    if let Some(value) = extract_longest_bracketed(text, '{', '}') {
        return Some(value);
    }
    if let Some(value) = extract_longest_bracketed(text, '[', ']') {
        return Some(value);
    }
    None
}

/// Find all fenced code blocks (` ```tag\n...\n``` `), returning
/// `(tag, contents)` pairs in order of appearance.
fn fenced_blocks(text: &str) -> Vec<(&str, &str)> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after_open = &rest[start + 3..];
        // The tag is everything up to the next newline (may be empty).
        let (tag, after_tag) = match after_open.find('\n') {
            Some(nl) => (&after_open[..nl], &after_open[nl + 1..]),
            None => break,
        };
        let Some(end) = after_tag.find("```") else {
            break;
        };
        let contents = &after_tag[..end];
        blocks.push((tag.trim(), contents));
        rest = &after_tag[end + 3..];
    }
    blocks
}

fn extract_from_tagged_fence(text: &str, tag: &str) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .find(|(block_tag, _)| block_tag.eq_ignore_ascii_case(tag))
        .and_then(|(_, contents)| serde_json::from_str(contents.trim()).ok())
}

fn extract_from_any_fence(text: &str) -> Option<Value> {
    fenced_blocks(text)
        .into_iter()
        .find_map(|(_, contents)| serde_json::from_str(contents.trim()).ok())
}

/// Scan for the longest substring beginning with `open` and ending with
/// `close` that parses as valid JSON.
fn extract_longest_bracketed(text: &str, open: char, close: char) -> Option<Value> {
    let bytes: Vec<char> = text.chars().collect();
    let starts: Vec<usize> = bytes
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == open)
        .map(|(i, _)| i)
        .collect();
    let ends: Vec<usize> = bytes
        .iter()
        .enumerate()
        .filter(|(_, c)| **c == close)
        .map(|(i, _)| i)
        .collect();

    let mut best: Option<(usize, Value)> = None;
    for &start in &starts {
        for &end in ends.iter().rev() {
            if end <= start {
                continue;
            }
            let len = end - start + 1;
            if let Some((best_len, _)) = &best {
                if len <= *best_len {
                    continue;
                }
            }
            let candidate: String = bytes[start..=end].iter().collect();
            if let Ok(value) = serde_json::from_str(&candidate) {
                best = Some((len, value));
                break;
            }
        }
    }
    best.map(|(_, value)| value)
}
