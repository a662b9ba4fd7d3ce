//! Candidate and accepted record types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::catalog::DataFormat;

/// Maximum characters of a record summary fed back to the model.
const SUMMARY_MAX_CHARS: usize = 120;

/// A raw record proposed by the model, before validation.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Batch the candidate arrived in (1-based).
    pub batch_index: u32,
    /// Raw field values as parsed from the response.
    pub fields: Map<String, Value>,
}

impl Candidate {
    pub fn new(batch_index: u32, fields: Map<String, Value>) -> Self {
        Self {
            batch_index,
            fields,
        }
    }

    /// Whether every field declared by `format` is present.
    pub fn has_fields_of(&self, format: DataFormat) -> bool {
        format
            .fields()
            .iter()
            .all(|field| self.fields.contains_key(*field))
    }
}

/// A validated, accepted dataset record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum Record {
    Qna {
        question: String,
        answer: String,
        context: String,
    },
    EntityRelationship {
        entity1: String,
        relationship: String,
        entity2: String,
    },
    RagChunk {
        content: String,
        metadata: BTreeMap<String, Value>,
        summary: String,
    },
    FineTuning {
        instruction: String,
        input: String,
        output: String,
    },
}

impl Record {
    /// Returns the format this record belongs to.
    pub fn format(&self) -> DataFormat {
        match self {
            Record::Qna { .. } => DataFormat::Qna,
            Record::EntityRelationship { .. } => DataFormat::EntityRelationships,
            Record::RagChunk { .. } => DataFormat::RagChunks,
            Record::FineTuning { .. } => DataFormat::FineTuning,
        }
    }

    /// Returns `(field, value)` pairs in column order.
    ///
    /// Metadata is rendered as compact JSON with sorted keys.
    pub fn field_values(&self) -> Vec<(&'static str, String)> {
        match self {
            Record::Qna {
                question,
                answer,
                context,
            } => vec![
                ("question", question.clone()),
                ("answer", answer.clone()),
                ("context", context.clone()),
            ],
            Record::EntityRelationship {
                entity1,
                relationship,
                entity2,
            } => vec![
                ("entity1", entity1.clone()),
                ("relationship", relationship.clone()),
                ("entity2", entity2.clone()),
            ],
            Record::RagChunk {
                content,
                metadata,
                summary,
            } => vec![
                ("content", content.clone()),
                ("metadata", metadata_json(metadata)),
                ("summary", summary.clone()),
            ],
            Record::FineTuning {
                instruction,
                input,
                output,
            } => vec![
                ("instruction", instruction.clone()),
                ("input", input.clone()),
                ("output", output.clone()),
            ],
        }
    }

    /// Returns the column values in the format's column order.
    pub fn columns(&self) -> Vec<String> {
        self.field_values().into_iter().map(|(_, v)| v).collect()
    }

    /// Returns a one-line gist used to steer the model away from repeats.
    pub fn summary(&self) -> String {
        let gist = match self {
            Record::Qna { question, .. } => question.clone(),
            Record::EntityRelationship {
                entity1,
                relationship,
                entity2,
            } => format!("{} {} {}", entity1, relationship, entity2),
            Record::RagChunk { summary, .. } => summary.clone(),
            Record::FineTuning { instruction, .. } => instruction.clone(),
        };
        let gist = gist.split_whitespace().collect::<Vec<_>>().join(" ");
        if gist.chars().count() > SUMMARY_MAX_CHARS {
            let truncated: String = gist.chars().take(SUMMARY_MAX_CHARS).collect();
            format!("{}...", truncated)
        } else {
            gist
        }
    }
}

/// Compact JSON rendering of a metadata map.
pub(crate) fn metadata_json(metadata: &BTreeMap<String, Value>) -> String {
    serde_json::to_string(metadata).unwrap_or_else(|_| "{}".to_string())
}
