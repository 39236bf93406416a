//! Recovery of a reasoning trace and a JSON payload from raw model text.
//!
//! Extraction is best-effort and pure. It never fails; when nothing parses,
//! [`ExtractedOutput::payload`] is `None` and callers treat that as an ordinary
//! parse-failure input.
//!
//! Payload strategies, first success wins:
//! 1. Each fenced code block (`` ```json `` or bare `` ``` ``), in order
//! 2. The whole text
//! 3. The widest `{ ... }` span, then each balanced `{ ... }` region, largest first

use serde_json::Value;
use std::cmp::Reverse;

/// Which strategy produced the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionSource {
    FencedBlock,
    FullText,
    BraceSpan,
}

/// Result of [`extract`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractedOutput {
    pub thinking: Option<String>,
    pub payload: Option<Value>,
    pub source: Option<ExtractionSource>,
}

impl ExtractedOutput {
    pub fn is_parsed(&self) -> bool {
        self.payload.is_some()
    }
}

const THINK_TAGS: [(&str, &str); 2] = [("<thinking>", "</thinking>"), ("<think>", "</think>")];

/// Split raw model text into a thinking trace and a structured payload.
///
/// # Examples
///
/// ```
/// use crm_triage::extract::extract;
///
/// let out = extract("<thinking>two columns</thinking>\n```json\n{\"a\": 1}\n```");
/// assert_eq!(out.thinking.as_deref(), Some("two columns"));
/// assert_eq!(out.payload.unwrap()["a"], 1);
///
/// let out = extract(r#"{"thinking": "inline", "a": 2}"#);
/// assert_eq!(out.thinking.as_deref(), Some("inline"));
/// assert!(out.payload.unwrap().get("thinking").is_none());
/// ```
pub fn extract(text: &str) -> ExtractedOutput {
    let (tag_thinking, cleaned) = take_thinking_block(text);

    let Some((mut payload, source)) = parse_payload(&cleaned) else {
        return ExtractedOutput {
            thinking: tag_thinking,
            payload: None,
            source: None,
        };
    };

    let thinking = match tag_thinking {
        Some(t) => Some(t),
        None => pop_thinking_key(&mut payload),
    };

    ExtractedOutput {
        thinking,
        payload: Some(payload),
        source: Some(source),
    }
}

/// Remove the first delimited thinking block and return its trimmed content.
///
/// A block without a closing tag runs to the end of the text.
fn take_thinking_block(text: &str) -> (Option<String>, String) {
    for (open, close) in THINK_TAGS {
        let Some(start) = text.find(open) else {
            continue;
        };
        let body_start = start + open.len();
        let (body, rest) = match text[body_start..].find(close) {
            Some(offset) => (
                &text[body_start..body_start + offset],
                &text[body_start + offset + close.len()..],
            ),
            None => (&text[body_start..], ""),
        };
        let cleaned = format!("{}{}", &text[..start], rest);
        let body = body.trim();
        let thinking = (!body.is_empty()).then(|| body.to_string());
        return (thinking, cleaned.trim().to_string());
    }
    (None, text.trim().to_string())
}

fn pop_thinking_key(payload: &mut Value) -> Option<String> {
    let removed = payload.as_object_mut()?.remove("thinking")?;
    match removed {
        Value::Null => None,
        Value::String(s) => Some(s),
        other => Some(other.to_string()),
    }
}

fn parse_payload(text: &str) -> Option<(Value, ExtractionSource)> {
    for block in fenced_blocks(text) {
        if let Ok(v) = serde_json::from_str::<Value>(block) {
            return Some((v, ExtractionSource::FencedBlock));
        }
    }

    if !text.is_empty() {
        if let Ok(v) = serde_json::from_str::<Value>(text) {
            return Some((v, ExtractionSource::FullText));
        }
    }

    let mut regions = balanced_objects(text);
    regions.sort_by_key(|r| Reverse(r.len()));
    widest_brace_span(text)
        .into_iter()
        .chain(regions)
        .find_map(|span| serde_json::from_str::<Value>(span).ok())
        .map(|v| (v, ExtractionSource::BraceSpan))
}

/// Contents of every closed markdown code fence, in order of appearance.
///
/// The language hint after the opening fence is skipped.
pub fn fenced_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut search_from = 0;

    while let Some(offset) = text[search_from..].find("```") {
        let after_fence = search_from + offset + 3;
        // Language hint runs to the end of the line; a same-line fence has none.
        let content_start = match text[after_fence..].find('\n') {
            Some(nl) if !text[after_fence..after_fence + nl].contains("```") => {
                after_fence + nl + 1
            }
            _ => after_fence,
        };
        let Some(close) = text[content_start..].find("```") else {
            break;
        };
        blocks.push(text[content_start..content_start + close].trim());
        search_from = content_start + close + 3;
    }
    blocks
}

/// Span from the first `{` to the last `}`.
fn widest_brace_span(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Every top-level balanced `{ ... }` region in order, ignoring braces in strings.
fn balanced_objects(text: &str) -> Vec<&str> {
    let mut regions = Vec::new();
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in text.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        if in_string {
            match ch {
                '\\' => escape_next = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        regions.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }
    regions
}
