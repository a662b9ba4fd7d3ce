//! Schema validation for candidate records.
//!
//! This module checks a raw candidate against the field set and value
//! constraints of its format, and builds the typed [`Record`] when the
//! candidate passes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::catalog::DataFormat;
use crate::records::{Candidate, Record};

/// Length bounds for a question, in characters.
pub const QUESTION_CHARS: (usize, usize) = (10, 1000);
/// Length bounds for an answer, in characters.
pub const ANSWER_CHARS: (usize, usize) = (10, 4000);
/// Maximum length of an entity name, in characters.
pub const ENTITY_MAX_CHARS: usize = 200;
/// Minimum length of a retrieval chunk, in characters.
pub const CONTENT_MIN_CHARS: usize = 50;

/// Values shorter than this draw a warning.
const SHORT_VALUE_CHARS: usize = 3;

/// Result of validating a candidate against its format's schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaValidationResult {
    /// Whether the candidate passes all required validations.
    pub valid: bool,
    /// Errors that make the candidate unusable.
    pub errors: Vec<SchemaError>,
    /// Non-critical observations.
    pub warnings: Vec<String>,
}

impl SchemaValidationResult {
    /// Create a new valid result with no errors or warnings.
    pub fn valid() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    /// Add an error to the result.
    pub fn add_error(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.errors.push(SchemaError {
            field: field.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
        });
        self.valid = false;
    }

    /// Add a warning to the result.
    pub fn add_warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    /// Returns a compact `field: message; ...` rendering of the errors.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// A schema validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaError {
    /// Field that failed validation.
    pub field: String,
    /// Description of the validation error.
    pub message: String,
    /// Severity of the error.
    pub severity: ErrorSeverity,
}

/// Severity level for schema errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorSeverity {
    /// Error that rejects the candidate.
    Error,
    /// Warning that doesn't block validation.
    Warning,
}

/// Validator for candidate records.
pub struct SchemaValidator;

impl SchemaValidator {
    /// Validate a candidate and build its typed record.
    ///
    /// Scalar values (numbers, booleans) are coerced to strings and all text
    /// is trimmed. A null, array or object where text is expected is an
    /// error, as is a missing field or a violated constraint.
    ///
    /// # Returns
    ///
    /// The accepted [`Record`] and the validation result (which may carry
    /// warnings), or the failing validation result.
    pub fn validate(
        format: DataFormat,
        candidate: &Candidate,
    ) -> Result<(Record, SchemaValidationResult), SchemaValidationResult> {
        let mut result = SchemaValidationResult::valid();
        let fields = &candidate.fields;

        let record = match format {
            DataFormat::Qna => {
                let question = text_field(fields, "question", &mut result);
                let answer = text_field(fields, "answer", &mut result);
                let context = text_field(fields, "context", &mut result);
                check_length(&mut result, "question", &question, QUESTION_CHARS);
                check_length(&mut result, "answer", &answer, ANSWER_CHARS);
                Record::Qna {
                    question,
                    answer,
                    context,
                }
            }
            DataFormat::EntityRelationships => {
                let entity1 = text_field(fields, "entity1", &mut result);
                let relationship = text_field(fields, "relationship", &mut result);
                let entity2 = text_field(fields, "entity2", &mut result);

                for (name, value) in [("entity1", &entity1), ("entity2", &entity2)] {
                    check_length(&mut result, name, value, (1, ENTITY_MAX_CHARS));
                    if !value.is_empty() && value.chars().count() < SHORT_VALUE_CHARS {
                        result.add_warning(format!("{} '{}' is very short", name, value));
                    }
                }
                if relationship.is_empty() && fields.contains_key("relationship") {
                    result.add_error("relationship", "must not be empty");
                }
                if !entity1.is_empty() && entity1.to_lowercase() == entity2.to_lowercase() {
                    result.add_error("entity2", "must differ from entity1");
                }

                Record::EntityRelationship {
                    entity1,
                    relationship,
                    entity2,
                }
            }
            DataFormat::RagChunks => {
                let content = text_field(fields, "content", &mut result);
                let metadata = metadata_field(fields, &mut result);
                let summary = text_field(fields, "summary", &mut result);

                if fields.contains_key("content") && content.chars().count() < CONTENT_MIN_CHARS {
                    result.add_error(
                        "content",
                        format!("must be at least {} characters", CONTENT_MIN_CHARS),
                    );
                }
                if summary.is_empty() && fields.contains_key("summary") {
                    result.add_error("summary", "must not be empty");
                }

                Record::RagChunk {
                    content,
                    metadata,
                    summary,
                }
            }
            DataFormat::FineTuning => {
                let instruction = text_field(fields, "instruction", &mut result);
                let input = text_field(fields, "input", &mut result);
                let output = text_field(fields, "output", &mut result);

                for (name, value) in [("instruction", &instruction), ("output", &output)] {
                    if value.is_empty() && fields.contains_key(name) {
                        result.add_error(name, "must not be empty");
                    }
                }

                Record::FineTuning {
                    instruction,
                    input,
                    output,
                }
            }
        };

        if result.valid {
            Ok((record, result))
        } else {
            Err(result)
        }
    }
}

/// Reads `name` as trimmed text, recording an error when it is missing or
/// not a scalar. Returns an empty string on error.
fn text_field(fields: &Map<String, Value>, name: &str, result: &mut SchemaValidationResult) -> String {
    match fields.get(name) {
        None => {
            result.add_error(name, "required field is missing");
            String::new()
        }
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Null) => {
            result.add_error(name, "must be text, found null");
            String::new()
        }
        Some(Value::Array(_)) | Some(Value::Object(_)) => {
            result.add_error(name, "must be text, found a nested structure");
            String::new()
        }
    }
}

/// Checks a non-empty, char-counted length range. Missing fields have
/// already been reported, so an empty value is only an error when the
/// lower bound demands content.
fn check_length(
    result: &mut SchemaValidationResult,
    name: &str,
    value: &str,
    (min, max): (usize, usize),
) {
    if result.errors.iter().any(|e| e.field == name) {
        return;
    }
    let len = value.chars().count();
    if len == 0 {
        result.add_error(name, "must not be empty");
    } else if len < min {
        result.add_error(name, format!("must be at least {} characters", min));
    } else if len > max {
        result.add_error(name, format!("must be at most {} characters", max));
    }
}

/// Reads the metadata mapping, accepting either a JSON object or a string
/// holding one.
fn metadata_field(
    fields: &Map<String, Value>,
    result: &mut SchemaValidationResult,
) -> BTreeMap<String, Value> {
    let map = match fields.get("metadata") {
        None => {
            result.add_error("metadata", "required field is missing");
            return BTreeMap::new();
        }
        Some(Value::Object(map)) => map.clone(),
        Some(Value::String(s)) => match serde_json::from_str::<Value>(s.trim()) {
            Ok(Value::Object(map)) => map,
            _ => {
                result.add_error("metadata", "string value is not a JSON object");
                return BTreeMap::new();
            }
        },
        Some(_) => {
            result.add_error("metadata", "must be a key/value mapping");
            return BTreeMap::new();
        }
    };

    if map.is_empty() {
        result.add_error("metadata", "must contain at least one entry");
    }
    map.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(value: Value) -> Candidate {
        match value {
            Value::Object(map) => Candidate::new(1, map),
            other => panic!("test candidate must be an object, got {other}"),
        }
    }

    #[test]
    fn test_valid_qna_with_empty_context() {
        let c = candidate(json!({
            "question": "What does HbA1c measure in a patient?",
            "answer": "Average blood glucose over roughly three months.",
            "context": ""
        }));
        let (record, result) = SchemaValidator::validate(DataFormat::Qna, &c).unwrap();
        assert!(result.valid);
        assert!(matches!(record, Record::Qna { ref context, .. } if context.is_empty()));
    }

    #[test]
    fn test_qna_missing_field_and_short_question() {
        let c = candidate(json!({"question": "Why?", "answer": "Because it matters a lot."}));
        let result = SchemaValidator::validate(DataFormat::Qna, &c).unwrap_err();
        assert!(!result.valid);
        assert!(result.errors.iter().any(|e| e.field == "context"));
        assert!(result.errors.iter().any(|e| e.field == "question"));
    }

    #[test]
    fn test_qna_answer_too_long() {
        let c = candidate(json!({
            "question": "Explain the full claims process?",
            "answer": "a".repeat(ANSWER_CHARS.1 + 1),
            "context": "x"
        }));
        let result = SchemaValidator::validate(DataFormat::Qna, &c).unwrap_err();
        assert!(result.error_summary().contains("answer: must be at most 4000"));
    }

    #[test]
    fn test_entity_equality_is_case_insensitive() {
        let c = candidate(json!({
            "entity1": " Interest Rate ",
            "relationship": "affects",
            "entity2": "interest rate"
        }));
        let result = SchemaValidator::validate(DataFormat::EntityRelationships, &c).unwrap_err();
        assert!(result.errors.iter().any(|e| e.field == "entity2"));
    }

    #[test]
    fn test_entity_empty_relationship_and_long_entity() {
        let c = candidate(json!({
            "entity1": "e".repeat(ENTITY_MAX_CHARS + 1),
            "relationship": "  ",
            "entity2": "Bond"
        }));
        let result = SchemaValidator::validate(DataFormat::EntityRelationships, &c).unwrap_err();
        assert!(result.errors.iter().any(|e| e.field == "entity1"));
        assert!(result.errors.iter().any(|e| e.field == "relationship"));
    }

    #[test]
    fn test_short_entity_is_only_a_warning() {
        let c = candidate(json!({"entity1": "AI", "relationship": "enables", "entity2": "Automation"}));
        let (_, result) = SchemaValidator::validate(DataFormat::EntityRelationships, &c).unwrap();
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_rag_metadata_accepts_object_or_json_string() {
        let content = "Retrieval chunks should be self-contained paragraphs of domain prose.";
        let as_object = candidate(json!({
            "content": content,
            "metadata": {"topic": "rag"},
            "summary": "Chunking guidance"
        }));
        assert!(SchemaValidator::validate(DataFormat::RagChunks, &as_object).is_ok());

        let as_string = candidate(json!({
            "content": content,
            "metadata": "{\"topic\": \"rag\"}",
            "summary": "Chunking guidance"
        }));
        let (record, _) = SchemaValidator::validate(DataFormat::RagChunks, &as_string).unwrap();
        match record {
            Record::RagChunk { metadata, .. } => assert_eq!(metadata["topic"], json!("rag")),
            other => panic!("unexpected record {other:?}"),
        }
    }

    #[test]
    fn test_rag_rejects_bad_metadata_and_short_content() {
        let c = candidate(json!({
            "content": "too short",
            "metadata": "topic=rag",
            "summary": "s"
        }));
        let result = SchemaValidator::validate(DataFormat::RagChunks, &c).unwrap_err();
        assert!(result.errors.iter().any(|e| e.field == "content"));
        assert!(result.errors.iter().any(|e| e.field == "metadata"));
    }

    #[test]
    fn test_fine_tuning_coerces_scalars() {
        let c = candidate(json!({"instruction": "Add the numbers", "input": 12, "output": true}));
        let (record, _) = SchemaValidator::validate(DataFormat::FineTuning, &c).unwrap();
        assert_eq!(record.columns(), vec!["Add the numbers", "12", "true"]);
    }

    #[test]
    fn test_fine_tuning_rejects_null_and_nested() {
        let c = candidate(json!({"instruction": null, "input": "", "output": ["a"]}));
        let result = SchemaValidator::validate(DataFormat::FineTuning, &c).unwrap_err();
        assert!(result.errors.iter().any(|e| e.field == "instruction"));
        assert!(result.errors.iter().any(|e| e.field == "output"));
    }

    #[test]
    fn test_error_severity_serializes_lowercase() {
        let json = serde_json::to_string(&ErrorSeverity::Error).unwrap();
        assert_eq!(json, "\"error\"");
    }
}
