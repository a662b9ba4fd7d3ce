//! Batch requests against the generative model.
//!
//! One call to [`BatchRequester::request`] builds a single prompt, invokes
//! the model with bounded retry, and parses the response into candidates.
//! Failures never escape as errors: they become [`BatchOutcome::Failed`],
//! which the orchestrator treats as a zero-yield batch.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::catalog::{DataFormat, Domain};
use crate::error::LlmError;
use crate::llm::{CompletionRequest, LlmProvider, Message};
use crate::pipeline::PipelineConfig;
use crate::records::Candidate;
use crate::utils::extract_record_values;

use super::prompts::{build_batch_prompt, BatchPromptInputs, BATCH_SYSTEM_PROMPT};

/// One batch to request.
#[derive(Debug, Clone, Copy)]
pub struct BatchRequest<'a> {
    /// 1-based batch number within the run.
    pub batch_index: u32,
    pub domain: Domain,
    pub format: DataFormat,
    /// Enriched domain context.
    pub context: &'a str,
    /// Records wanted from this batch.
    pub count: usize,
    /// Summaries of already-accepted records.
    pub avoid: &'a [String],
}

/// Why a batch produced nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchFailure {
    /// Every attempt failed transiently.
    RetriesExhausted { last_error: String },
    /// A non-transient failure aborted the batch.
    Rejected { error: String },
    /// The model answered, but with no usable JSON payload.
    Unparseable { error: String },
}

impl std::fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BatchFailure::RetriesExhausted { last_error } => {
                write!(f, "retries exhausted: {}", last_error)
            }
            BatchFailure::Rejected { error } => write!(f, "rejected: {}", error),
            BatchFailure::Unparseable { error } => write!(f, "unparseable response: {}", error),
        }
    }
}

/// Result of one batch request.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// The model answered with a record list.
    Candidates {
        /// Entries with the format's field set, in response order.
        candidates: Vec<Candidate>,
        /// Entries considered (after capping to the requested count).
        received: usize,
        /// Attempts used.
        attempts: u32,
    },
    /// The batch yielded nothing.
    Failed { reason: BatchFailure, attempts: u32 },
}

impl BatchOutcome {
    /// Number of attempts the batch used.
    pub fn attempts(&self) -> u32 {
        match self {
            BatchOutcome::Candidates { attempts, .. } | BatchOutcome::Failed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Requests candidate batches from an [`LlmProvider`].
pub struct BatchRequester {
    llm: Arc<dyn LlmProvider>,
    model: String,
    temperature: f64,
    max_tokens: u32,
    max_attempts: u32,
    base_backoff: Duration,
    attempt_timeout: Duration,
}

impl BatchRequester {
    /// Creates a requester using the model, retry and timeout settings of
    /// `config`.
    pub fn new(llm: Arc<dyn LlmProvider>, config: &PipelineConfig) -> Self {
        Self {
            llm,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            max_attempts: config.max_attempts_per_batch.max(1),
            base_backoff: config.base_backoff,
            attempt_timeout: config.generation_timeout,
        }
    }

    /// Backoff before retry number `attempt` (1-based count of failures so
    /// far): `base * 2^(attempt-1)`.
    fn backoff_for(&self, attempt: u32) -> Duration {
        let factor = 1u32 << attempt.saturating_sub(1).min(16);
        self.base_backoff.saturating_mul(factor)
    }

    /// Requests one batch.
    pub async fn request(&self, batch: &BatchRequest<'_>) -> BatchOutcome {
        let prompt = build_batch_prompt(&BatchPromptInputs {
            domain: batch.domain,
            format: batch.format,
            context: batch.context,
            count: batch.count,
            avoid: batch.avoid,
        });

        let mut attempt = 0u32;
        let text = loop {
            attempt += 1;
            match self.call_once(&prompt).await {
                Ok(text) => break text,
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff_for(attempt);
                    tracing::warn!(
                        batch = batch.batch_index,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Transient generation failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) if err.is_transient() => {
                    return BatchOutcome::Failed {
                        reason: BatchFailure::RetriesExhausted {
                            last_error: err.to_string(),
                        },
                        attempts: attempt,
                    };
                }
                Err(err) => {
                    return BatchOutcome::Failed {
                        reason: BatchFailure::Rejected {
                            error: err.to_string(),
                        },
                        attempts: attempt,
                    };
                }
            }
        };

        match parse_candidates(&text, batch.format, batch.count, batch.batch_index) {
            Ok((candidates, received)) => BatchOutcome::Candidates {
                candidates,
                received,
                attempts: attempt,
            },
            Err(error) => BatchOutcome::Failed {
                reason: BatchFailure::Unparseable { error },
                attempts: attempt,
            },
        }
    }

    /// Makes one model call under the per-attempt timeout.
    async fn call_once(&self, prompt: &str) -> Result<String, LlmError> {
        let request = CompletionRequest::new(
            self.model.clone(),
            vec![
                Message::system(BATCH_SYSTEM_PROMPT),
                Message::user(prompt.to_string()),
            ],
        )
        .with_temperature(self.temperature)
        .with_max_tokens(self.max_tokens);

        let response = tokio::time::timeout(self.attempt_timeout, self.llm.generate(request))
            .await
            .map_err(|_| LlmError::Timeout {
                seconds: self.attempt_timeout.as_secs(),
            })??;

        Ok(response.first_content().unwrap_or_default().to_string())
    }
}

/// Parses a raw response into candidates, keeping at most `count` entries.
///
/// Returns the candidates and the number of entries considered. Entries that
/// are not objects or lack the format's field set are dropped.
pub fn parse_candidates(
    text: &str,
    format: DataFormat,
    count: usize,
    batch_index: u32,
) -> Result<(Vec<Candidate>, usize), String> {
    let values = extract_record_values(text).map_err(|e| e.to_string())?;

    let considered: Vec<Value> = values.into_iter().take(count).collect();
    let received = considered.len();

    let candidates = considered
        .into_iter()
        .filter_map(|value| match value {
            Value::Object(fields) => Some(Candidate::new(batch_index, fields)),
            other => {
                tracing::debug!(batch = batch_index, entry = %other, "Dropping non-object entry");
                None
            }
        })
        .filter(|candidate| {
            let complete = candidate.has_fields_of(format);
            if !complete {
                tracing::debug!(
                    batch = batch_index,
                    format = %format,
                    "Dropping entry without the format's field set"
                );
            }
            complete
        })
        .collect();

    Ok((candidates, received))
}
