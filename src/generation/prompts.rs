//! Prompt text for batch generation.
//!
//! The model is walked through an explicit Thought / Action / Observation /
//! Reflection protocol before it emits the JSON payload, which tends to
//! produce more varied and better grounded records than a bare instruction.

use crate::catalog::{DataFormat, Domain};

/// System prompt for every batch request.
pub const BATCH_SYSTEM_PROMPT: &str = r#"You are a domain expert and dataset author producing synthetic training data.

You work in explicit reasoning steps before answering:
- Thought: what the dataset needs and which sub-topics are still uncovered
- Action: plan the concrete records you will write
- Observation: check the plan against the constraints and the avoid-list
- Reflection: fix anything repetitive, vague or off-domain

Then output ONLY the final JSON object. Never use placeholder text such as
"example", "sample", "lorem ipsum", "TBD" or "[insert ...]". Every value must be
realistic, specific and factually plausible for the domain."#;

/// Everything a batch prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct BatchPromptInputs<'a> {
    pub domain: Domain,
    pub format: DataFormat,
    /// Enriched domain context.
    pub context: &'a str,
    /// Number of records to produce.
    pub count: usize,
    /// Summaries of records already accepted in this run.
    pub avoid: &'a [String],
}

/// Builds the user prompt for one batch.
pub fn build_batch_prompt(inputs: &BatchPromptInputs<'_>) -> String {
    let BatchPromptInputs {
        domain,
        format,
        context,
        count,
        avoid,
    } = *inputs;

    let fields = format.fields().join(", ");
    let example = serde_json::json!({ "records": [format.example_record()] });
    let example = serde_json::to_string_pretty(&example).unwrap_or_default();

    let avoid_section = if avoid.is_empty() {
        "None yet.".to_string()
    } else {
        avoid
            .iter()
            .map(|s| format!("- {}", s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"GOAL
{goal}. Domain: {domain} ({description}).

DOMAIN CONTEXT
{context}

DOMAIN VOCABULARY
{keywords}

CONSTRAINTS
- Produce exactly {count} records.
- Each record has exactly these fields: {fields}.
{format_rules}
- Cover different sub-topics; no two records may say the same thing.
- Do not repeat or paraphrase any of these existing records:
{avoid_section}

REASONING
Thought: identify {count} distinct, uncovered aspects of {domain}.
Action: draft one record per aspect.
Observation: verify every field is filled and every constraint holds.
Reflection: replace anything generic, repetitive or placeholder-like.

OUTPUT
Respond with a single JSON object of this shape and nothing after it:
{example}"#,
        goal = format.generation_goal(),
        domain = domain,
        description = domain.description(),
        context = context.trim(),
        keywords = domain.keywords().join(", "),
        count = count,
        fields = fields,
        format_rules = format_rules(format),
        avoid_section = avoid_section,
        example = example,
    )
}

fn format_rules(format: DataFormat) -> &'static str {
    match format {
        DataFormat::Qna => {
            "- question: a specific question of 10 to 1000 characters.\n\
             - answer: an accurate, self-contained answer of 10 to 4000 characters.\n\
             - context: the situation or background the question arises in (may be empty)."
        }
        DataFormat::EntityRelationships => {
            "- entity1 and entity2: two DIFFERENT named concepts, each under 200 characters.\n\
             - relationship: a short verb phrase linking entity1 to entity2."
        }
        DataFormat::RagChunks => {
            "- content: a self-contained passage of at least 50 characters.\n\
             - metadata: a JSON object with descriptive keys such as topic and source_type.\n\
             - summary: one sentence summarizing the passage."
        }
        DataFormat::FineTuning => {
            "- instruction: a clear task for the model.\n\
             - input: optional material the instruction operates on (may be empty).\n\
             - output: the ideal response to the instruction and input."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_carries_schema_count_and_protocol() {
        let prompt = build_batch_prompt(&BatchPromptInputs {
            domain: Domain::Healthcare,
            format: DataFormat::Qna,
            context: "Base Context: cardiology wards",
            count: 12,
            avoid: &[],
        });

        assert!(prompt.contains("exactly 12 records"));
        assert!(prompt.contains("question, answer, context"));
        assert!(prompt.contains("cardiology wards"));
        assert!(prompt.contains("\"records\""));
        for step in ["Thought:", "Action:", "Observation:", "Reflection:"] {
            assert!(prompt.contains(step), "missing {step}");
        }
        assert!(prompt.contains("None yet."));
    }

    #[test]
    fn test_prompt_lists_avoid_entries() {
        let avoid = vec![
            "What is triage?".to_string(),
            "How is sepsis detected?".to_string(),
        ];
        let prompt = build_batch_prompt(&BatchPromptInputs {
            domain: Domain::Healthcare,
            format: DataFormat::Qna,
            context: "",
            count: 10,
            avoid: &avoid,
        });
        assert!(prompt.contains("- What is triage?"));
        assert!(prompt.contains("- How is sepsis detected?"));
    }

    #[test]
    fn test_every_format_has_rules() {
        for format in DataFormat::all() {
            let prompt = build_batch_prompt(&BatchPromptInputs {
                domain: Domain::Law,
                format,
                context: "",
                count: 10,
                avoid: &[],
            });
            for field in format.fields() {
                assert!(prompt.contains(&format!("- {}", field)) || prompt.contains(field));
            }
        }
    }
}
