//! JSON extraction from free-form model output.
//!
//! Models wrap JSON in prose or code fences often enough that a single
//! `serde_json::from_str` is not sufficient. Extraction tries, in order:
//! the raw text, the first fenced code block, then the first balanced
//! top-level `{...}` object embedded in the text.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

static FENCED_BLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_-]*[ \t]*\r?\n?([\s\S]*?)```").ok());

/// Which step of the chain produced the value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JsonSource {
    /// The whole response parsed as JSON.
    Direct,
    /// Contents of a fenced code block.
    FencedBlock,
    /// Balanced `{...}` span embedded in prose.
    ObjectSpan,
}

/// No JSON value could be extracted.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("no JSON object found in model output ({preview})")]
pub struct JsonExtractionError {
    /// Leading part of the offending output.
    pub preview: String,
}

/// Run the extraction chain over `text`.
pub fn extract_json(text: &str) -> Result<(Value, JsonSource), JsonExtractionError> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        return Ok((value, JsonSource::Direct));
    }

    if let Some(re) = FENCED_BLOCK.as_ref() {
        for cap in re.captures_iter(trimmed) {
            if let Some(body) = cap.get(1)
                && let Ok(value) = serde_json::from_str::<Value>(body.as_str().trim())
            {
                return Ok((value, JsonSource::FencedBlock));
            }
        }
    }

    for (start, _) in trimmed.match_indices('{') {
        if let Some(end) = matching_brace(&trimmed[start..])
            && let Ok(value) = serde_json::from_str::<Value>(&trimmed[start..start + end])
        {
            return Ok((value, JsonSource::ObjectSpan));
        }
    }

    Err(JsonExtractionError {
        preview: preview(trimmed),
    })
}

/// Byte length of the object opening at the start of `text`, including its
/// closing brace. Braces inside string literals are ignored.
fn matching_brace(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    const PREVIEW_CHARS: usize = 80;
    if text.chars().count() <= PREVIEW_CHARS {
        text.to_string()
    } else {
        let head: String = text.chars().take(PREVIEW_CHARS).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let (value, source) = extract_json("  {\"cards\": []}\n").unwrap();
        assert_eq!(value, json!({ "cards": [] }));
        assert_eq!(source, JsonSource::Direct);
    }

    #[test]
    fn test_fenced_block() {
        let text = "Here are your cards:\n```json\n{\"cards\": [1, 2]}\n```\nEnjoy!";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "cards": [1, 2] }));
        assert_eq!(source, JsonSource::FencedBlock);
    }

    #[test]
    fn test_bare_fence() {
        let text = "```\n{\"a\": 1}\n```";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "a": 1 }));
        assert_eq!(source, JsonSource::FencedBlock);
    }

    #[test]
    fn test_object_span_in_prose() {
        let text = "Sure! The result is {\"a\": {\"b\": 2}} as requested.";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "a": { "b": 2 } }));
        assert_eq!(source, JsonSource::ObjectSpan);
    }

    #[test]
    fn test_broken_fence_falls_through_to_span() {
        let text = "```json\n{not json}\n```\nactually: {\"ok\": true}";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "ok": true }));
        assert_eq!(source, JsonSource::ObjectSpan);

        let text = "```json\nnot json\n```\nactually: {\"ok\": true}";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "ok": true }));
        assert_eq!(source, JsonSource::ObjectSpan);
    }

    #[test]
    fn test_first_object_ignores_trailing_braces() {
        let text = "Sure: {\"cards\": []}\nLet me know if you want {more} cards.";
        let (value, source) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "cards": [] }));
        assert_eq!(source, JsonSource::ObjectSpan);
    }

    #[test]
    fn test_braces_inside_strings_do_not_close_object() {
        let text = r#"Result: {"q": "what does } mean?", "a": "a \"brace\" {"} trailing }"#;
        let (value, _) = extract_json(text).unwrap();
        assert_eq!(value, json!({ "q": "what does } mean?", "a": "a \"brace\" {" }));
    }

    #[test]
    fn test_unbalanced_object_is_not_extracted() {
        assert!(extract_json("partial {\"cards\": [").is_err());
    }

    #[test]
    fn test_no_json() {
        let err = extract_json("I cannot help with that.").unwrap_err();
        assert_eq!(err.preview, "I cannot help with that.");
    }
}
