//! Text cleanup applied before the second parse attempt.
//!
//! Reasoning models wrap the answer in `<think>` blocks, chat models love
//! markdown fences and a sentence of preamble, and small models leave
//! trailing commas. None of this changes the characters of the answer
//! itself.

use std::sync::OnceLock;

use regex::Regex;

static THINK_BLOCK: OnceLock<Option<Regex>> = OnceLock::new();
static THINK_OPEN: OnceLock<Option<Regex>> = OnceLock::new();
static FENCED: OnceLock<Option<Regex>> = OnceLock::new();

pub(crate) fn cached(cell: &'static OnceLock<Option<Regex>>, pattern: &str) -> Option<&'static Regex> {
    cell.get_or_init(|| Regex::new(pattern).ok()).as_ref()
}

/// Remove `<think>...</think>` reasoning blocks.
///
/// An unclosed `<think>` keeps whatever came before it, unless that part
/// holds no JSON, in which case the text after the tag is kept.
pub fn strip_think_tags(text: &str) -> String {
    let text = strip_outer_div(text);
    let text = match cached(&THINK_BLOCK, r"(?is)<think>.*?</think>") {
        Some(re) => re.replace_all(&text, "").into_owned(),
        None => text,
    };

    let Some(open) = cached(&THINK_OPEN, r"(?i)<think>").and_then(|re| re.find(&text)) else {
        return text.trim().to_string();
    };

    let before = text[..open.start()].trim();
    if before.contains('{') {
        before.to_string()
    } else {
        text[open.end()..].trim().to_string()
    }
}

/// Unwrap a reply that is entirely enclosed in one `<div>` element. Markup
/// inside the answer is left alone.
fn strip_outer_div(text: &str) -> String {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("<div>")
        .and_then(|rest| rest.strip_suffix("</div>"))
        .unwrap_or(trimmed)
        .to_string()
}

/// Content of the first markdown fence that holds a `{`, or the text with
/// stray fence markers removed.
pub fn strip_code_fences(text: &str) -> String {
    if let Some(re) = cached(&FENCED, r"(?s)```[A-Za-z]*\s*\n?(.*?)```") {
        if let Some(body) = re
            .captures_iter(text)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .find(|body| body.contains('{'))
        {
            return body.trim().to_string();
        }
    }
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// Slice from the first `{` to the last `}`.
pub fn slice_braces(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Drop commas that directly precede `}` or `]`, outside string literals.
pub fn remove_trailing_commas(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}' | ']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }
    out
}

/// Full cleanup chain; `None` when no object-like span remains.
pub fn clean_json(raw: &str) -> Option<String> {
    let text = strip_think_tags(raw);
    let text = strip_code_fences(&text);
    let body = slice_braces(&text)?;
    Some(remove_trailing_commas(body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_complete_think_block() {
        let raw = "<think>Let me reason {about} it</think>\n{\"a\": 1}";
        assert_eq!(strip_think_tags(raw), "{\"a\": 1}");
    }

    #[test]
    fn test_strip_unclosed_think() {
        assert_eq!(strip_think_tags("<THINK> hmm {\"a\": 1}"), "hmm {\"a\": 1}");
        assert_eq!(strip_think_tags("{\"a\": 1} <think> trailing"), "{\"a\": 1}");
    }

    #[test]
    fn test_only_outer_div_is_removed() {
        assert_eq!(strip_think_tags("<div>{\"a\": 1}</div>"), "{\"a\": 1}");
        let inner = "{\"a\": \"<div>x</div>\"}";
        assert_eq!(strip_think_tags(inner), inner);
    }

    #[test]
    fn test_fences() {
        let raw = "Here you go:\n```json\n{\"a\": 1}\n```\nHope this helps!";
        assert_eq!(strip_code_fences(raw), "{\"a\": 1}");
        assert_eq!(strip_code_fences("no fences"), "no fences");
    }

    #[test]
    fn test_trailing_commas_outside_strings_only() {
        let raw = r#"{"a": {"name": "x, }", "b": [1, 2,],},}"#;
        assert_eq!(
            remove_trailing_commas(raw),
            r#"{"a": {"name": "x, }", "b": [1, 2]}}"#
        );
    }

    #[test]
    fn test_clean_json_chain() {
        let raw = "Sure! <think>plan</think>```json\n{\"F1\": {\"name\": \"Ängstlichkeit\",}}\n```";
        let cleaned = clean_json(raw).unwrap();
        let v: serde_json::Value = serde_json::from_str(&cleaned).unwrap();
        assert_eq!(v["F1"]["name"], "Ängstlichkeit");
    }

    #[test]
    fn test_slice_braces_none() {
        assert!(slice_braces("no json here").is_none());
        assert!(slice_braces("} backwards {").is_none());
    }
}
