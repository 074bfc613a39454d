//! Detect tool requests in plain-text completions.
//!
//! Local models without native tool-calling are asked to answer with
//! `{"tool_name": ..., "parameters": {...}}` when they want a tool. Detection is
//! deliberately narrow: only the FIRST balanced `{...}` in the text is
//! considered, and it counts only if it parses as JSON with a non-empty string
//! `tool_name` and an object `parameters`.
//!
//! False negatives: a request placed after some other brace-delimited text, or
//! one with extra wrapping keys, is returned to the user as plain text.
//! False positives: prose that embeds a literal `{"tool_name":...}` object
//! is treated as a request.

use regex::Regex;
use serde_json::{Map, Value};
use std::borrow::Cow;
use std::sync::LazyLock;

/// `<think>...</think>` blocks emitted by reasoning models served through Ollama.
static REASONING_BLOCK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?si)<\s*think\s*>.*?<\s*/\s*think\s*>").expect("valid regex"));

/// A tool request parsed from plain text.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedToolCall {
    pub name: String,
    pub arguments: Map<String, Value>,
}

/// Remove hidden reasoning blocks so JSON inside them is never taken as a request.
///
/// Text without a block is returned unchanged; otherwise the remainder is trimmed.
pub fn strip_reasoning_blocks(text: &str) -> String {
    match REASONING_BLOCK.replace_all(text, "") {
        Cow::Borrowed(unchanged) => unchanged.to_string(),
        Cow::Owned(stripped) => stripped.trim().to_string(),
    }
}

/// Return the first balanced `{...}` substring, honouring JSON string quoting.
pub fn find_first_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse a tool request out of a completion, if there is one.
pub fn parse_tool_request(text: &str) -> Option<ParsedToolCall> {
    let candidate = find_first_json_object(text)?;
    let value: Value = serde_json::from_str(candidate).ok()?;
    let map = value.as_object()?;

    let name = map.get("tool_name").and_then(|v| v.as_str())?.trim();
    if name.is_empty() {
        return None;
    }
    let arguments = map.get("parameters").and_then(|v| v.as_object())?.clone();

    Some(ParsedToolCall {
        name: name.to_string(),
        arguments,
    })
}
