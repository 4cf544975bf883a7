//! Per-component recovery from text that is not valid JSON as a whole.
//!
//! Each expected component key is located on its own; its value is cut out
//! with string-aware bracket matching and parsed in isolation. A value that
//! never closes (truncated output) falls back to pulling the `name` and
//! `interpretation` strings out field by field.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use super::cleanup::{cached, remove_trailing_commas};

static NAME_STRING: OnceLock<Option<Regex>> = OnceLock::new();
static NAME_NUMBER: OnceLock<Option<Regex>> = OnceLock::new();
static INTERPRETATION: OnceLock<Option<Regex>> = OnceLock::new();

/// What was found under one component key.
#[derive(Debug, Clone, PartialEq)]
pub enum Recovered {
    /// The value parsed as JSON on its own
    Value(Value),
    /// The value was an object that could not be parsed; these fields were
    /// read from it directly
    Fields {
        name: Option<String>,
        interpretation: Option<String>,
    },
}

/// Byte index just past the bracket closing the one at `start`.
///
/// Brackets inside string literals are ignored. `None` when the text ends
/// first.
pub fn match_bracket(text: &str, start: usize) -> Option<usize> {
    let open = text[start..].chars().next()?;
    let close = match open {
        '{' => '}',
        '[' => ']',
        _ => return None,
    };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
        } else if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                return Some(start + offset + c.len_utf8());
            }
        }
    }
    None
}

/// Byte index just past the closing quote of the string starting at `start`.
fn match_string(text: &str, start: usize) -> Option<usize> {
    let mut escaped = false;
    for (offset, c) in text[start..].char_indices().skip(1) {
        if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            return Some(start + offset + 1);
        }
    }
    None
}

/// Locate `"component": <value>` in `text` and recover the value.
///
/// The key matches regardless of case and of whitespace inside the quotes,
/// as in the JSON tiers.
pub fn find_component(text: &str, component: &str) -> Option<Recovered> {
    let pattern = format!(
        r#""\s*(?i:{})\s*"\s*:\s*"#,
        regex::escape(component.trim())
    );
    let key = Regex::new(&pattern).ok()?.find(text)?;
    let start = key.end();
    let first = text[start..].chars().next()?;

    match first {
        '{' => match match_bracket(text, start) {
            Some(end) => {
                let slice = &text[start..end];
                Some(match serde_json::from_str(&remove_trailing_commas(slice)) {
                    Ok(v) => Recovered::Value(v),
                    Err(_) => read_fields(slice),
                })
            }
            None => Some(read_fields(&text[start..])),
        },
        '[' => {
            let end = match_bracket(text, start).unwrap_or(text.len());
            Some(
                serde_json::from_str(&text[start..end])
                    .map_or(Recovered::Fields { name: None, interpretation: None }, Recovered::Value),
            )
        }
        '"' => {
            let value = match_string(text, start)
                .and_then(|end| serde_json::from_str(&text[start..end]).ok())
                .unwrap_or(Value::Null);
            Some(Recovered::Value(value))
        }
        _ => {
            let token: String = text[start..]
                .chars()
                .take_while(|c| !matches!(c, ',' | '}' | ']' | '\n'))
                .collect();
            Some(Recovered::Value(
                serde_json::from_str(token.trim()).unwrap_or(Value::Null),
            ))
        }
    }
}

/// Pull `name` / `interpretation` out of a broken or truncated object.
fn read_fields(text: &str) -> Recovered {
    let name = cached(&NAME_STRING, r#""name"\s*:\s*"((?:[^"\\]|\\.)*)""#)
        .and_then(|re| re.captures(text))
        .and_then(|c| c.get(1))
        .map(|m| unescape(m.as_str()))
        .or_else(|| {
            cached(&NAME_NUMBER, r#""name"\s*:\s*(-?\d+(?:\.\d+)?)"#)
                .and_then(|re| re.captures(text))
                .and_then(|c| c.get(1))
                .map(|m| m.as_str().to_string())
        });

    // the closing quote is optional so a cut-off interpretation still counts
    let interpretation = cached(
        &INTERPRETATION,
        r#"(?s)"interpretation"\s*:\s*"((?:[^"\\]|\\.)*)"#,
    )
    .and_then(|re| re.captures(text))
    .and_then(|c| c.get(1))
    .map(|m| unescape(m.as_str()));

    Recovered::Fields {
        name,
        interpretation,
    }
}

/// Decode JSON escapes, keeping the raw text when they are malformed.
fn unescape(raw: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{raw}\""))
        .unwrap_or_else(|_| raw.trim_end_matches('\\').replace("\\\"", "\""))
}
