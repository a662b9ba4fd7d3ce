//! JSON extraction utilities for parsing LLM batch responses.
//!
//! Models rarely answer with bare JSON. A batch response may arrive wrapped
//! in a markdown fence, preceded by reasoning prose, as a bare array, or as
//! the requested `{"records": [...]}` envelope. This module finds the JSON
//! payload and turns it into a flat list of record values.
//!
//! # Extraction Strategies
//!
//! [`try_extract_json_from_response`] tries, in order:
//! 1. A ```` ```json ```` fenced block
//! 2. A generic fenced block
//! 3. Direct JSON (content starts with `{` or `[`)
//! 4. The largest balanced object or array anywhere in the text
//!
//! A reply cut off by the token limit never closes its record array.
//! [`salvage_truncated_records`] recovers the elements that did complete, and
//! [`extract_record_values`] prefers them over any single inner object the
//! strategies above would pick.
//!
//! # Example
//!
//! ```
//! use synth_forge::utils::json_extraction::extract_record_values;
//!
//! let response = "Thought: done.\n```json\n{\"records\": [{\"a\": 1}, {\"a\": 2}]}\n```";
//! let values = extract_record_values(response).unwrap();
//! assert_eq!(values.len(), 2);
//! ```

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Keys under which a model may nest the record list.
const ENVELOPE_KEYS: &[&str] = &["records", "data", "items", "results"];

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
    #[error("JSON payload has no record list")]
    NoRecordList,
}

/// Result of JSON extraction attempt
#[derive(Debug, Clone, PartialEq)]
pub enum JsonExtractionResult {
    /// Successfully extracted valid JSON
    Success(String),
    /// JSON appears to be truncated (started but didn't complete)
    Truncated {
        partial_json: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    /// No JSON-like content found in response
    NotFound,
}

impl JsonExtractionResult {
    /// Returns true if JSON was successfully extracted
    pub fn is_success(&self) -> bool {
        matches!(self, JsonExtractionResult::Success(_))
    }

    /// Converts the result to a Result, previewing `content` when nothing
    /// JSON-like was found.
    pub fn into_result_with_context(self, content: &str) -> Result<String, JsonExtractionError> {
        match self {
            JsonExtractionResult::Success(json) => Ok(json),
            JsonExtractionResult::Truncated {
                partial_json,
                unclosed_braces,
                unclosed_brackets,
            } => Err(JsonExtractionError::Truncated {
                partial_preview: preview(&partial_json, 100),
                unclosed_braces,
                unclosed_brackets,
            }),
            JsonExtractionResult::NotFound => Err(JsonExtractionError::NotFound {
                content_preview: preview(content.trim(), 50),
            }),
        }
    }
}

/// Char-boundary-safe prefix of `s`.
fn preview(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Analysis result for JSON structure
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStructureAnalysis {
    /// Number of unclosed braces ('{' without matching '}')
    pub unclosed_braces: usize,
    /// Number of unclosed brackets ('[' without matching ']')
    pub unclosed_brackets: usize,
    /// Whether we ended inside a string literal
    pub in_string: bool,
    /// The position where JSON-like content starts (first '{' or '[')
    pub json_start: Option<usize>,
}

impl JsonStructureAnalysis {
    fn is_truncated(&self) -> bool {
        self.json_start.is_some()
            && (self.unclosed_braces > 0 || self.unclosed_brackets > 0 || self.in_string)
    }
}

/// Tracks brace/bracket depth across `s` to detect incomplete JSON.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut brace_depth: isize = 0;
    let mut bracket_depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut json_start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => {
                json_start.get_or_insert(i);
                if c == '{' {
                    brace_depth += 1;
                } else {
                    bracket_depth += 1;
                }
            }
            '}' if !in_string => brace_depth -= 1,
            ']' if !in_string => bracket_depth -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: brace_depth.max(0) as usize,
        unclosed_brackets: bracket_depth.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Finds the index of the delimiter closing the one `s` starts with.
///
/// Handles nesting of the same delimiter, string literals and escape
/// sequences. Returns `None` when `s` does not start with `open` or the
/// structure never closes.
fn find_matching_delimiter(s: &str, open: char, close: char) -> Option<usize> {
    if !s.starts_with(open) {
        return None;
    }

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            c if c == open && !in_string => depth += 1,
            c if c == close && !in_string => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Index of the `}` matching the `{` that `s` starts with.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    find_matching_delimiter(s, '{', '}')
}

/// Index of the `]` matching the `[` that `s` starts with.
pub fn find_matching_bracket(s: &str) -> Option<usize> {
    find_matching_delimiter(s, '[', ']')
}

/// Returns the balanced JSON value at the start of `s`, if it parses.
fn balanced_value_at(s: &str) -> Option<&str> {
    let end = if s.starts_with('{') {
        find_matching_brace(s)?
    } else if s.starts_with('[') {
        find_matching_bracket(s)?
    } else {
        return None;
    };
    let candidate = &s[..=end];
    serde_json::from_str::<Value>(candidate).ok()?;
    Some(candidate)
}

/// Body of the first fenced block matching `pattern`, trimmed.
fn fenced_block<'a>(content: &'a str, pattern: &str) -> Option<&'a str> {
    let re = Regex::new(pattern).ok()?;
    re.captures(content)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

/// Extract JSON from a ```json ... ``` code block.
pub fn extract_from_json_code_block(content: &str) -> Option<String> {
    let body = fenced_block(content, r"```json\s*\n?([\s\S]*?)\n?```")?;
    balanced_value_at(body).map(str::to_string)
}

/// Extract JSON from a generic ``` ... ``` code block.
pub fn extract_from_generic_code_block(content: &str) -> Option<String> {
    let body = fenced_block(content, r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```")?;
    let start = body.find(['{', '['])?;
    balanced_value_at(&body[start..]).map(str::to_string)
}

/// Finds the largest parseable object or array anywhere in `content`,
/// preferring later occurrences on ties.
///
/// Reasoning prose may quote small JSON fragments before the real payload,
/// which is usually the largest structure in the response.
pub fn extract_largest_json_value(content: &str) -> Option<String> {
    content
        .char_indices()
        .filter(|(_, c)| *c == '{' || *c == '[')
        .filter_map(|(start, _)| balanced_value_at(&content[start..]).map(|json| (start, json)))
        .max_by(|(pos_a, a), (pos_b, b)| a.len().cmp(&b.len()).then(pos_a.cmp(pos_b)))
        .map(|(_, json)| json.to_string())
}

/// Attempts to extract JSON from an LLM response with detailed result
/// information.
pub fn try_extract_json_from_response(content: &str) -> JsonExtractionResult {
    let trimmed = content.trim();

    if let Some(json) = extract_from_json_code_block(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    if let Some(json) = extract_from_generic_code_block(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    if let Some(json) = balanced_value_at(trimmed) {
        return JsonExtractionResult::Success(json.to_string());
    }

    if let Some(json) = extract_largest_json_value(trimmed) {
        return JsonExtractionResult::Success(json);
    }

    let analysis = analyze_json_structure(trimmed);
    if analysis.is_truncated() {
        if let Some(start) = analysis.json_start {
            return JsonExtractionResult::Truncated {
                partial_json: trimmed[start..].to_string(),
                unclosed_braces: analysis.unclosed_braces,
                unclosed_brackets: analysis.unclosed_brackets,
            };
        }
    }

    JsonExtractionResult::NotFound
}

/// Recovers the complete leading elements of a record array that was cut
/// off before its closing bracket.
///
/// Looks for the first unclosed `[` whose first element is an object and
/// collects objects until one fails to close. Returns `None` when there is
/// no such array or none of its elements completed.
pub fn salvage_truncated_records(content: &str) -> Option<Vec<Value>> {
    let start = content.match_indices('[').map(|(i, _)| i).find(|&i| {
        let array = &content[i..];
        array[1..].trim_start().starts_with('{') && find_matching_bracket(array).is_none()
    })?;

    let mut rest = &content[start + 1..];
    let mut items = Vec::new();
    loop {
        rest = rest.trim_start().trim_start_matches(',').trim_start();
        if !rest.starts_with('{') {
            break;
        }
        let Some(end) = find_matching_brace(rest) else {
            break;
        };
        items.push(serde_json::from_str::<Value>(&rest[..=end]).ok()?);
        rest = &rest[end + 1..];
    }

    (!items.is_empty()).then_some(items)
}

/// Unwraps a parsed payload into its list of record values.
///
/// Accepts a bare array, an object holding an array under one of the
/// envelope keys, or a single object that is itself a record.
fn unwrap_record_list(payload: Value) -> Result<Vec<Value>, JsonExtractionError> {
    match payload {
        Value::Array(items) => Ok(items),
        Value::Object(mut map) => {
            for key in ENVELOPE_KEYS {
                if let Some(Value::Array(_)) = map.get(*key) {
                    if let Some(Value::Array(items)) = map.remove(*key) {
                        return Ok(items);
                    }
                }
            }
            if map.is_empty() {
                Err(JsonExtractionError::NoRecordList)
            } else {
                Ok(vec![Value::Object(map)])
            }
        }
        _ => Err(JsonExtractionError::NoRecordList),
    }
}

/// Extracts the list of record values from a raw batch response.
///
/// Entries are returned as-is; callers decide which are usable records.
///
/// When the reply was cut off, the complete elements of the unfinished record
/// array win over a smaller list recovered from inside it.
pub fn extract_record_values(content: &str) -> Result<Vec<Value>, JsonExtractionError> {
    let extracted = try_extract_json_from_response(content)
        .into_result_with_context(content)
        .and_then(|json| {
            let payload: Value =
                serde_json::from_str(&json).map_err(|_| JsonExtractionError::NotFound {
                    content_preview: preview(&json, 50),
                })?;
            unwrap_record_list(payload)
        });

    match (salvage_truncated_records(content), extracted) {
        (Some(salvaged), Ok(values)) if salvaged.len() <= values.len() => Ok(values),
        (Some(salvaged), _) => {
            tracing::warn!(
                recovered = salvaged.len(),
                "Response was cut off, keeping the records that completed"
            );
            Ok(salvaged)
        }
        (None, extracted) => extracted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_json() {
        let input = r#"{"key": "value"}"#;
        let result = try_extract_json_from_response(input);
        assert_eq!(result, JsonExtractionResult::Success(input.to_string()));
    }

    #[test]
    fn test_json_code_block() {
        let input = "Here is the response:\n```json\n{\"key\": \"value\"}\n```\nHope this helps!";
        let result = try_extract_json_from_response(input);
        assert_eq!(
            result,
            JsonExtractionResult::Success(r#"{"key": "value"}"#.to_string())
        );
    }

    #[test]
    fn test_generic_code_block_with_array() {
        let input = "Response:\n```\n[{\"a\": 1}]\n```";
        let result = try_extract_json_from_response(input);
        assert_eq!(result, JsonExtractionResult::Success(r#"[{"a": 1}]"#.to_string()));
    }

    #[test]
    fn test_prefers_largest_payload_after_reasoning() {
        let input = r#"Thought: the shape is {"x": 1}.
Action: emit records.
{"records": [{"question": "q1"}, {"question": "q2"}]}"#;
        let result = try_extract_json_from_response(input);
        let json = result.into_result_with_context(input).unwrap();
        assert!(json.starts_with(r#"{"records""#));
    }

    #[test]
    fn test_escaped_quotes_and_braces_in_strings() {
        let input = r#"{"message": "He said \"hi\" and drew a } brace"}"#;
        assert_eq!(find_matching_brace(input), Some(input.len() - 1));
    }

    #[test]
    fn test_find_matching_bracket_requires_opening() {
        assert_eq!(find_matching_bracket("[1, [2, 3]]"), Some(10));
        assert_eq!(find_matching_bracket("x[1]"), None);
        assert_eq!(find_matching_bracket("[1, 2"), None);
    }

    #[test]
    fn test_truncated_detection() {
        let input = r#"{"records": [{"question": "unfinished"#;
        let result = try_extract_json_from_response(input);
        assert!(matches!(result, JsonExtractionResult::Truncated { .. }));

        let err = result.into_result_with_context(input).unwrap_err();
        assert!(matches!(err, JsonExtractionError::Truncated { .. }));
    }

    #[test]
    fn test_cut_off_envelope_keeps_complete_records() {
        let input = r#"Thought: cover lenders and regulators.
Action: emit records.
{"records": [
  {"entity1": "Central bank", "relationship": "regulates", "entity2": "Commercial bank"},
  {"entity1": "Borrower", "relationship": "repays", "entity2": "Mortgage lender"},
  {"entity1": "Auditor", "relationship": "reviews", "entity2": "Annual report"},
  {"entity1": "Broker", "relationship": "exec"#;

        let values = extract_record_values(input).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[2]["entity1"], "Auditor");
    }

    #[test]
    fn test_cut_off_bare_array_in_fence() {
        let input = "```json\n[{\"a\": 1}, {\"a\": {\"nested\": [1, 2]}}, {\"a\":";
        let values = salvage_truncated_records(input).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(extract_record_values(input).unwrap().len(), 2);
    }

    #[test]
    fn test_salvage_ignores_closed_arrays() {
        assert!(salvage_truncated_records(r#"{"records": [{"a": 1}]}"#).is_none());
        assert!(salvage_truncated_records(r#"{"records": [{"a": 1"#).is_none());
        assert!(salvage_truncated_records("no json here").is_none());
    }

    #[test]
    fn test_complete_payload_wins_over_stray_bracket() {
        let input = r#"Thought: list [{"draft": true}
{"records": [{"a": 1}, {"a": 2}, {"a": 3}]}"#;
        let values = extract_record_values(input).unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0]["a"], 1);
    }

    #[test]
    fn test_not_found_previews_content() {
        let input = "I cannot help with that.";
        let err = try_extract_json_from_response(input)
            .into_result_with_context(input)
            .unwrap_err();
        assert_eq!(
            err,
            JsonExtractionError::NotFound {
                content_preview: "I cannot help with that.".to_string()
            }
        );
    }

    #[test]
    fn test_extract_record_values_envelope() {
        let values = extract_record_values(r#"{"records": [{"a": 1}, 2, {"b": 3}]}"#).unwrap();
        assert_eq!(values.len(), 3);
    }

    #[test]
    fn test_extract_record_values_bare_array_and_single_object() {
        assert_eq!(extract_record_values(r#"[{"a": 1}]"#).unwrap().len(), 1);

        let single = extract_record_values(r#"{"instruction": "i", "output": "o"}"#).unwrap();
        assert_eq!(single.len(), 1);
        assert!(single[0].get("instruction").is_some());
    }

    #[test]
    fn test_extract_record_values_empty_object() {
        assert_eq!(
            extract_record_values("{}").unwrap_err(),
            JsonExtractionError::NoRecordList
        );
    }

    #[test]
    fn test_multibyte_preview_is_safe() {
        let input = "é".repeat(80);
        let err = try_extract_json_from_response(&input)
            .into_result_with_context(&input)
            .unwrap_err();
        match err {
            JsonExtractionError::NotFound { content_preview } => {
                assert_eq!(content_preview.chars().count(), 50)
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
