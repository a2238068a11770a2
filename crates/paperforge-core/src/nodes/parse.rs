//! Parsing helpers for model output.
//!
//! Providers wrap JSON in markdown fences, prepend prose, or both. Every
//! node goes through these helpers so the cleanup rules live in one place.
//! Callers are expected to absorb `LlmError::Parse` with a domain fallback
//! rather than let it propagate.

use paperforge_types::llm::LlmError;
use serde::de::DeserializeOwned;

/// Strip a surrounding markdown code fence, if present.
///
/// Handles ```json and bare ``` fences. Returns the input unchanged when no
/// fence is found.
pub fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the optional language tag on the opening fence line.
    let body = match rest.find('\n') {
        Some(idx) => &rest[idx + 1..],
        None => rest,
    };
    body.strip_suffix("```").map(str::trim).unwrap_or(trimmed)
}

/// Slice out the outermost JSON value embedded in prose.
///
/// Looks for the first `{` (or `[`) and the matching last `}` (or `]`).
/// Returns the whole input when no bracket pair is found, leaving the final
/// verdict to the deserializer.
pub fn extract_json(text: &str) -> &str {
    let object = text.find('{').and_then(|start| {
        let end = text.rfind('}')?;
        (end > start).then(|| &text[start..=end])
    });
    let array = text.find('[').and_then(|start| {
        let end = text.rfind(']')?;
        (end > start).then(|| &text[start..=end])
    });

    match (object, array) {
        // Prefer whichever opens first.
        (Some(o), Some(a)) => {
            if text.find('{') < text.find('[') {
                o
            } else {
                a
            }
        }
        (Some(o), None) => o,
        (None, Some(a)) => a,
        (None, None) => text,
    }
}

/// Deserialize model output as JSON after fence stripping and extraction.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<T, LlmError> {
    let cleaned = extract_json(strip_code_fences(text));
    serde_json::from_str(cleaned).map_err(|err| LlmError::Parse(err.to_string()))
}
