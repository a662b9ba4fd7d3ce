//! Output record formats.

use serde::{Deserialize, Serialize};

/// A supported dataset format.
///
/// Adding a variant requires a matching arm in the schema validator, the
/// dedup normalizer and the CSV writer; every `match` on this type is
/// exhaustive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    /// Question/answer pairs with supporting context.
    Qna,
    /// Subject/predicate/object triples.
    EntityRelationships,
    /// Retrieval chunks with metadata and a summary.
    RagChunks,
    /// Instruction/input/output triples for instruction tuning.
    FineTuning,
}

impl DataFormat {
    /// Returns all supported formats.
    pub fn all() -> Vec<DataFormat> {
        vec![
            DataFormat::Qna,
            DataFormat::EntityRelationships,
            DataFormat::RagChunks,
            DataFormat::FineTuning,
        ]
    }

    /// Returns the identifier used on the command line and in file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            DataFormat::Qna => "qna",
            DataFormat::EntityRelationships => "entity_relationships",
            DataFormat::RagChunks => "rag_chunks",
            DataFormat::FineTuning => "fine_tuning",
        }
    }

    /// Returns a short human description.
    pub fn description(&self) -> &'static str {
        match self {
            DataFormat::Qna => "Question and Answer pairs with context",
            DataFormat::EntityRelationships => "Entity relationship mappings",
            DataFormat::RagChunks => "RAG-optimized content chunks with metadata",
            DataFormat::FineTuning => "Instruction-input-output format for model training",
        }
    }

    /// Returns the task description given to the model for this format.
    pub fn generation_goal(&self) -> &'static str {
        match self {
            DataFormat::Qna => {
                "Generate question-answer pairs with context for educational or training purposes"
            }
            DataFormat::EntityRelationships => {
                "Generate entity-relationship triples that capture how domain concepts connect"
            }
            DataFormat::RagChunks => {
                "Generate self-contained knowledge chunks with descriptive metadata and a short \
                 summary, suitable for retrieval-augmented generation"
            }
            DataFormat::FineTuning => {
                "Generate instruction-input-output examples for instruction-tuning a language model"
            }
        }
    }

    /// Returns the record fields in column order.
    pub fn fields(&self) -> &'static [&'static str] {
        match self {
            DataFormat::Qna => &["question", "answer", "context"],
            DataFormat::EntityRelationships => &["entity1", "relationship", "entity2"],
            DataFormat::RagChunks => &["content", "metadata", "summary"],
            DataFormat::FineTuning => &["instruction", "input", "output"],
        }
    }

    /// Returns the fields holding prose, where stop-words carry no identity.
    pub fn long_text_fields(&self) -> &'static [&'static str] {
        match self {
            DataFormat::Qna => &["answer", "context"],
            DataFormat::EntityRelationships => &[],
            DataFormat::RagChunks => &["content", "summary"],
            DataFormat::FineTuning => &["instruction", "input", "output"],
        }
    }

    /// Free-text fields, where a bare stand-in word means the model never
    /// filled the field in.
    pub fn prose_fields(&self) -> &'static [&'static str] {
        match self {
            DataFormat::Qna => &["question", "answer", "context"],
            DataFormat::EntityRelationships => &[],
            DataFormat::RagChunks => &["content", "summary"],
            DataFormat::FineTuning => &["instruction", "output"],
        }
    }

    /// Returns one example record, shown to the model as the required shape.
    pub fn example_record(&self) -> serde_json::Value {
        match self {
            DataFormat::Qna => serde_json::json!({
                "question": "string",
                "answer": "string",
                "context": "string"
            }),
            DataFormat::EntityRelationships => serde_json::json!({
                "entity1": "string",
                "relationship": "string",
                "entity2": "string"
            }),
            DataFormat::RagChunks => serde_json::json!({
                "content": "string (at least 50 characters)",
                "metadata": {"topic": "string", "source_type": "string"},
                "summary": "string"
            }),
            DataFormat::FineTuning => serde_json::json!({
                "instruction": "string",
                "input": "string (may be empty)",
                "output": "string"
            }),
        }
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for DataFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "qna" | "qa" => Ok(DataFormat::Qna),
            "entity_relationships" | "entities" => Ok(DataFormat::EntityRelationships),
            "rag_chunks" | "rag" => Ok(DataFormat::RagChunks),
            "fine_tuning" | "finetuning" => Ok(DataFormat::FineTuning),
            other => Err(format!(
                "Unknown format: '{}'. Supported formats: {}",
                other,
                DataFormat::all()
                    .iter()
                    .map(DataFormat::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_dashes() {
        assert_eq!(
            "entity-relationships".parse::<DataFormat>().unwrap(),
            DataFormat::EntityRelationships
        );
        assert_eq!("RAG_CHUNKS".parse::<DataFormat>().unwrap(), DataFormat::RagChunks);
        assert!("csv".parse::<DataFormat>().is_err());
    }

    #[test]
    fn test_long_text_fields_are_declared_fields() {
        for format in DataFormat::all() {
            for field in format.long_text_fields() {
                assert!(format.fields().contains(field), "{format}: {field}");
            }
        }
    }

    #[test]
    fn test_example_record_has_every_field() {
        for format in DataFormat::all() {
            let example = format.example_record();
            for field in format.fields() {
                assert!(example.get(*field).is_some(), "{format}: {field}");
            }
        }
    }
}
