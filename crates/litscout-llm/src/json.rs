//! Tolerant JSON extraction from model response text.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::provider::LlmError;

static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json)?\s*\n?(.*?)\n?\s*```").expect("invalid fence regex")
});

const ERROR_PREFIX_LEN: usize = 200;

/// Extract a JSON object from model response text.
///
/// Tries in order:
/// 1. direct parse of the whole text
/// 2. the contents of a ``` / ```json fence
/// 3. the substring from the first `{` to the last `}`
///
/// A successful direct parse always wins over the salvage paths. Anything
/// that is not a JSON object (top-level arrays included) falls through to
/// the next step; total failure yields `LlmError::Response` carrying a
/// truncated prefix of the raw text.
pub fn extract_json(text: &str) -> Result<Value, LlmError> {
    let stripped = text.trim();
    if stripped.is_empty() {
        return Err(LlmError::Response("empty model response".to_string()));
    }

    if let Some(obj) = parse_object(stripped) {
        return Ok(obj);
    }

    if let Some(caps) = FENCE_RE.captures(text) {
        if let Some(obj) = parse_object(caps[1].trim()) {
            return Ok(obj);
        }
    }

    if let (Some(first), Some(last)) = (stripped.find('{'), stripped.rfind('}')) {
        if last > first {
            if let Some(obj) = parse_object(&stripped[first..=last]) {
                return Ok(obj);
            }
        }
    }

    let prefix: String = text.chars().take(ERROR_PREFIX_LEN).collect();
    Err(LlmError::Response(format!(
        "could not extract a JSON object from model response: {prefix}"
    )))
}

fn parse_object(candidate: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(v) if v.is_object() => Some(v),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_direct_parse() {
        let v = extract_json(r#"{"a": 1, "b": [2, 3]}"#).unwrap();
        assert_eq!(v, json!({"a": 1, "b": [2, 3]}));
    }

    #[test]
    fn test_round_trip_any_object() {
        let original = json!({
            "nested": {"x": [1, 2, {"y": "z"}]},
            "text": "with \"quotes\" and \n newlines",
            "flag": true,
            "n": 3.25
        });
        let serialized = serde_json::to_string(&original).unwrap();
        assert_eq!(extract_json(&serialized).unwrap(), original);
    }

    #[test]
    fn test_fenced_block_with_marker() {
        let text = "Here is the result:\n```json\n{\"score\": 0.9}\n```\nDone.";
        assert_eq!(extract_json(text).unwrap(), json!({"score": 0.9}));
    }

    #[test]
    fn test_fenced_block_without_marker() {
        let text = "```\n{\"score\": 0.5}\n```";
        assert_eq!(extract_json(text).unwrap(), json!({"score": 0.5}));
    }

    #[test]
    fn test_fence_preserves_round_trip() {
        let original = json!({"results": [{"paper_id": "p1"}]});
        let fenced = format!("```json\n{}\n```", serde_json::to_string(&original).unwrap());
        assert_eq!(extract_json(&fenced).unwrap(), original);
    }

    #[test]
    fn test_brace_substring_salvage() {
        let text = "The strategy is {\"queries\": []} as requested.";
        assert_eq!(extract_json(text).unwrap(), json!({"queries": []}));
    }

    #[test]
    fn test_top_level_array_rejected() {
        let err = extract_json("[1, 2, 3]").unwrap_err();
        assert!(matches!(err, LlmError::Response(_)));
    }

    #[test]
    fn test_empty_input_rejected() {
        assert!(matches!(extract_json("   "), Err(LlmError::Response(_))));
    }

    #[test]
    fn test_garbage_carries_prefix() {
        let err = extract_json("no json here at all").unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("no json here at all"));
    }

    #[test]
    fn test_error_prefix_truncated() {
        let long = "x".repeat(1000);
        let msg = extract_json(&long).unwrap_err().to_string();
        assert!(msg.len() < 400);
    }
}
