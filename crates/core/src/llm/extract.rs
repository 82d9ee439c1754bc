//! Lenient JSON decoding for model output.
//!
//! Hosted models wrap JSON in code fences and prose. The decoder tries the
//! raw text, then fenced blocks, then the outermost balanced object or
//! array, before giving up with the serde error for the best slice found.

use regex::Regex;
use serde::de::DeserializeOwned;

use super::LlmError;

/// Decode `T` from raw model text.
pub fn from_model_text<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let trimmed = text.trim();

    if let Ok(value) = serde_json::from_str::<T>(trimmed) {
        return Ok(value);
    }

    if let Some(fenced) = strip_fences(trimmed) {
        if let Ok(value) = serde_json::from_str::<T>(fenced.trim()) {
            return Ok(value);
        }
    }

    let candidate = balanced_json(trimmed).unwrap_or(trimmed);
    serde_json::from_str::<T>(candidate).map_err(|e| LlmError::Decode(e.to_string()))
}

/// Like [`from_model_text`] but returns the raw JSON value, used by agents
/// that normalize fields before the typed decode.
pub fn value_from_model_text(text: &str) -> Result<serde_json::Value, LlmError> {
    from_model_text::<serde_json::Value>(text)
}

/// Contents of the first ```-fenced block, if any.
fn strip_fences(text: &str) -> Option<&str> {
    let re = Regex::new(r"(?s)```(?:json|JSON)?\s*\n?(.*?)```").expect("fence regex compiles");
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// The outermost balanced `{...}` or `[...]` slice, scanning string- and
/// escape-aware so braces inside string literals do not confuse the count.
fn balanced_json(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|&b| b == b'{' || b == b'[')?;
    let open = bytes[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' if in_string => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            _ if b == open => depth += 1,
            _ if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }

    None
}
