//! Pipeline orchestrator driving one generation run from request to result.
//!
//! A run moves through these stages:
//! - Init: the request is checked against the configured limits
//! - Enriching: domain context is gathered (best-effort, with fallback)
//! - Generating / Validating / Deciding: one loop iteration per batch
//! - Succeeded or Failed
//!
//! Each candidate is schema-validated, quality-scored and deduplicated
//! before it is accepted. A run never returns more than `target_count`
//! records and never requests more than `max_batches` batches.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::diversity::{DedupIndex, DedupSignature};
use crate::enrichment::{ContextEnricher, EnrichedContext};
use crate::generation::{BatchOutcome, BatchRequest, BatchRequester};
use crate::llm::LlmProvider;
use crate::quality::QualityScorer;
use crate::records::{Candidate, Record};
use crate::validation::SchemaValidator;

use super::config::PipelineConfig;
use super::events::{PipelineEvent, RunStage};
use super::request::GenerationRequest;

/// Errors that can escape a generation run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] super::config::ConfigError),

    /// The request was rejected before any generation.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The run ended short of its target.
    #[error("Insufficient yield: accepted {accepted} of {target} records after {attempted_batches} batches ({ceiling})")]
    InsufficientYield {
        accepted: usize,
        target: usize,
        attempted_batches: u32,
        ceiling: YieldCeiling,
    },

    /// The caller cancelled the run.
    #[error("Run cancelled after accepting {accepted} of {target} records")]
    Cancelled { accepted: usize, target: usize },
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Exactly `target_count` records were accepted.
    Succeeded,
    /// The run ended short of its target.
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Succeeded => write!(f, "succeeded"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The ceiling that ended an unproductive run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum YieldCeiling {
    /// Too many batches in a row accepted nothing.
    ConsecutiveEmptyBatches,
    /// The per-run batch budget ran out.
    MaxBatches,
}

impl std::fmt::Display for YieldCeiling {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            YieldCeiling::ConsecutiveEmptyBatches => write!(f, "consecutive empty batches"),
            YieldCeiling::MaxBatches => write!(f, "batch limit reached"),
        }
    }
}

/// Why a run failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum FailureReason {
    InsufficientYield { ceiling: YieldCeiling },
    Cancelled,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::InsufficientYield { ceiling } => {
                write!(f, "insufficient yield ({})", ceiling)
            }
            FailureReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Counters collected over a run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunStats {
    /// Entries the model returned (after capping to the batch size).
    pub candidates_received: usize,
    /// Entries that carried the format's field set.
    pub candidates_parsed: usize,
    /// Candidates rejected by schema validation.
    pub structural_rejections: usize,
    /// Records below the quality threshold.
    pub quality_rejections: usize,
    /// Records whose signature was already accepted.
    pub duplicate_rejections: usize,
    /// Valid records left over once the target was met.
    pub surplus_ignored: usize,
    /// Batches whose model call failed outright.
    pub failed_batches: u32,
    /// Extra attempts spent on retries.
    pub retries: u32,
    /// Whether the fallback context was used.
    pub enrichment_degraded: bool,
    /// Wall-clock duration of the run in milliseconds.
    pub elapsed_ms: u64,
}

impl RunStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share of received candidates that were accepted.
    pub fn success_rate(&self, accepted: usize) -> f64 {
        if self.candidates_received == 0 {
            return 0.0;
        }
        accepted as f64 / self.candidates_received as f64
    }

    pub fn elapsed(&self) -> Duration {
        Duration::from_millis(self.elapsed_ms)
    }

    fn record_batch(&mut self, outcome: &BatchOutcome) {
        self.retries += outcome.attempts().saturating_sub(1);
        match outcome {
            BatchOutcome::Candidates {
                candidates,
                received,
                ..
            } => {
                self.candidates_received += received;
                self.candidates_parsed += candidates.len();
            }
            BatchOutcome::Failed { .. } => self.failed_batches += 1,
        }
    }

    fn record_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    }
}

/// Result of a generation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub run_id: Uuid,
    pub request: GenerationRequest,
    pub status: RunStatus,
    /// Set when `status` is `Failed`.
    pub failure: Option<FailureReason>,
    /// Accepted records in acceptance order.
    pub accepted_records: Vec<Record>,
    pub accepted_count: usize,
    pub attempted_batches: u32,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl GenerationResult {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Accepted share of the target, in percent.
    pub fn progress_percentage(&self) -> f64 {
        if self.request.target_count == 0 {
            return 0.0;
        }
        (self.accepted_count as f64 / self.request.target_count as f64) * 100.0
    }

    /// Converts a failed run into its error, discarding partial records.
    pub fn into_result(self) -> Result<Self, PipelineError> {
        match self.failure {
            None => Ok(self),
            Some(FailureReason::InsufficientYield { ceiling }) => {
                Err(PipelineError::InsufficientYield {
                    accepted: self.accepted_count,
                    target: self.request.target_count,
                    attempted_batches: self.attempted_batches,
                    ceiling,
                })
            }
            Some(FailureReason::Cancelled) => Err(PipelineError::Cancelled {
                accepted: self.accepted_count,
                target: self.request.target_count,
            }),
        }
    }
}

/// Shared flag a caller flips to stop a run between batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Mutable state of one run. Owned by a single `run` call.
#[derive(Debug)]
struct RunState {
    run_id: Uuid,
    stage: RunStage,
    accepted: Vec<Record>,
    recent_summaries: VecDeque<String>,
    dedup: DedupIndex,
    attempted_batches: u32,
    consecutive_empty_batches: u32,
    stats: RunStats,
}

impl RunState {
    fn new() -> Self {
        Self {
            run_id: Uuid::new_v4(),
            stage: RunStage::Init,
            accepted: Vec::new(),
            recent_summaries: VecDeque::new(),
            dedup: DedupIndex::new(),
            attempted_batches: 0,
            consecutive_empty_batches: 0,
            stats: RunStats::new(),
        }
    }

    fn accept(&mut self, record: Record, signature: DedupSignature, avoid_list_size: usize) {
        self.dedup.insert(signature);
        if avoid_list_size > 0 {
            if self.recent_summaries.len() == avoid_list_size {
                self.recent_summaries.pop_front();
            }
            self.recent_summaries.push_back(record.summary());
        }
        self.accepted.push(record);
    }

    fn avoid_list(&self) -> Vec<String> {
        self.recent_summaries.iter().cloned().collect()
    }
}

/// Coordinates enrichment, batch generation and record filtering.
///
/// The orchestrator holds no per-run state, so one instance can serve
/// concurrent runs.
pub struct PipelineOrchestrator {
    config: PipelineConfig,
    requester: BatchRequester,
    enricher: Arc<dyn ContextEnricher>,
    scorer: QualityScorer,
}

impl PipelineOrchestrator {
    /// Creates an orchestrator.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::Config` when `config` fails validation.
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        enricher: Arc<dyn ContextEnricher>,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        config.validate()?;
        let requester = BatchRequester::new(llm, &config);
        let scorer = QualityScorer::new(config.quality_threshold)
            .with_extra_terms(config.extra_domain_terms.iter().cloned());
        Ok(Self {
            config,
            requester,
            enricher,
            scorer,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Runs a request to completion.
    pub async fn run(&self, request: GenerationRequest) -> Result<GenerationResult, PipelineError> {
        self.run_with(request, &CancellationFlag::new(), None).await
    }

    /// Runs a request, checking `cancel` before each batch and reporting
    /// progress on `events` when given.
    ///
    /// Only an invalid request is returned as an error. Runs that end short
    /// of their target come back as a `Failed` result carrying the partial
    /// records; use [`GenerationResult::into_result`] to treat them as
    /// errors.
    pub async fn run_with(
        &self,
        request: GenerationRequest,
        cancel: &CancellationFlag,
        events: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> Result<GenerationResult, PipelineError> {
        let started_at = Utc::now();
        let clock = Instant::now();
        let mut state = RunState::new();

        self.enter(&mut state, RunStage::Init, events);
        request.validate(self.config.max_target_count)?;

        tracing::info!(
            run_id = %state.run_id,
            domain = %request.domain,
            format = %request.format,
            target = request.target_count,
            "Starting generation run"
        );

        self.enter(&mut state, RunStage::Enriching, events);
        let context = self.enrich(&request, state.run_id, events).await;
        state.stats.enrichment_degraded = context.degraded;

        let target = request.target_count;
        let failure = loop {
            if cancel.is_cancelled() {
                tracing::info!(run_id = %state.run_id, accepted = state.accepted.len(), "Run cancelled");
                break Some(FailureReason::Cancelled);
            }

            self.enter(&mut state, RunStage::Generating, events);
            state.attempted_batches += 1;
            let batch_index = state.attempted_batches;
            let count = self.config.batch_size.min(target - state.accepted.len());
            let avoid = state.avoid_list();

            let outcome = self
                .requester
                .request(&BatchRequest {
                    batch_index,
                    domain: request.domain,
                    format: request.format,
                    context: &context.supplementary,
                    count,
                    avoid: &avoid,
                })
                .await;
            state.stats.record_batch(&outcome);

            self.enter(&mut state, RunStage::Validating, events);
            let accepted_in_batch = match outcome {
                BatchOutcome::Candidates { candidates, .. } => {
                    self.absorb(&request, candidates, &mut state)
                }
                BatchOutcome::Failed { reason, attempts } => {
                    tracing::warn!(
                        run_id = %state.run_id,
                        batch = batch_index,
                        attempts,
                        reason = %reason,
                        "Batch failed"
                    );
                    emit(
                        events,
                        PipelineEvent::batch_failed(state.run_id, batch_index, reason.to_string()),
                    );
                    0
                }
            };

            tracing::info!(
                run_id = %state.run_id,
                batch = batch_index,
                requested = count,
                accepted = accepted_in_batch,
                total = state.accepted.len(),
                target,
                "Batch complete"
            );
            emit(
                events,
                PipelineEvent::batch_completed(
                    state.run_id,
                    batch_index,
                    accepted_in_batch,
                    state.accepted.len(),
                    target,
                ),
            );

            self.enter(&mut state, RunStage::Deciding, events);
            if let Some(decision) = self.decide(&mut state, accepted_in_batch, target) {
                break decision;
            }
        };

        state.stats.record_elapsed(clock.elapsed());
        let status = if failure.is_none() {
            RunStatus::Succeeded
        } else {
            RunStatus::Failed
        };
        let final_stage = match status {
            RunStatus::Succeeded => RunStage::Succeeded,
            RunStatus::Failed => RunStage::Failed,
        };
        self.enter(&mut state, final_stage, events);

        let accepted_count = state.accepted.len();
        match failure {
            None => tracing::info!(
                run_id = %state.run_id,
                accepted = accepted_count,
                batches = state.attempted_batches,
                elapsed_ms = state.stats.elapsed_ms,
                "Generation run succeeded"
            ),
            Some(reason) => tracing::warn!(
                run_id = %state.run_id,
                accepted = accepted_count,
                target,
                batches = state.attempted_batches,
                reason = %reason,
                "Generation run failed"
            ),
        }
        emit(
            events,
            PipelineEvent::run_finished(state.run_id, status, accepted_count, target),
        );

        Ok(GenerationResult {
            run_id: state.run_id,
            request,
            status,
            failure,
            accepted_records: state.accepted,
            accepted_count,
            attempted_batches: state.attempted_batches,
            stats: state.stats,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Gathers context under the enrichment timeout, falling back to the
    /// built-in overview on any failure.
    async fn enrich(
        &self,
        request: &GenerationRequest,
        run_id: Uuid,
        events: Option<&mpsc::Sender<PipelineEvent>>,
    ) -> EnrichedContext {
        let hint = request.context.as_deref();
        let attempt = tokio::time::timeout(
            self.config.enrichment_timeout,
            self.enricher.enrich(request.domain, hint),
        )
        .await;

        let reason = match attempt {
            Ok(Ok(text)) if !text.trim().is_empty() => {
                return EnrichedContext::new(request.domain, request.context.clone(), text);
            }
            Ok(Ok(_)) => "enricher returned no context".to_string(),
            Ok(Err(err)) => err.to_string(),
            Err(_) => format!(
                "enrichment timed out after {}s",
                self.config.enrichment_timeout.as_secs()
            ),
        };

        tracing::warn!(run_id = %run_id, domain = %request.domain, reason = %reason, "Enrichment degraded");
        emit(events, PipelineEvent::enrichment_degraded(run_id, reason));
        EnrichedContext::fallback(request.domain, request.context.clone())
    }

    /// Validates, scores and deduplicates a batch in order, accepting
    /// records until the target is met. Returns the number accepted.
    fn absorb(
        &self,
        request: &GenerationRequest,
        candidates: Vec<Candidate>,
        state: &mut RunState,
    ) -> usize {
        let mut accepted = 0;
        for candidate in candidates {
            if state.accepted.len() >= request.target_count {
                state.stats.surplus_ignored += 1;
                continue;
            }

            let record = match SchemaValidator::validate(request.format, &candidate) {
                Ok((record, validation)) => {
                    if !validation.warnings.is_empty() {
                        tracing::debug!(
                            batch = candidate.batch_index,
                            warnings = ?validation.warnings,
                            "Candidate accepted with warnings"
                        );
                    }
                    record
                }
                Err(validation) => {
                    tracing::debug!(
                        batch = candidate.batch_index,
                        errors = %validation.error_summary(),
                        "Candidate failed validation"
                    );
                    state.stats.structural_rejections += 1;
                    continue;
                }
            };

            let quality = self.scorer.score(request.domain, &record);
            if !quality.passed {
                tracing::debug!(
                    batch = candidate.batch_index,
                    score = quality.overall_score,
                    issues = %quality.issue_summary(),
                    "Record below quality threshold"
                );
                state.stats.quality_rejections += 1;
                continue;
            }

            let signature = DedupSignature::of(&record);
            if state.dedup.contains(&signature) {
                tracing::debug!(batch = candidate.batch_index, signature = %signature, "Duplicate record");
                state.stats.duplicate_rejections += 1;
                continue;
            }

            state.accept(record, signature, self.config.avoid_list_size);
            accepted += 1;
        }
        accepted
    }

    /// Chooses the next step after a batch: `None` to continue, otherwise
    /// the terminal outcome (`Some(None)` for success).
    fn decide(
        &self,
        state: &mut RunState,
        accepted_in_batch: usize,
        target: usize,
    ) -> Option<Option<FailureReason>> {
        if state.accepted.len() >= target {
            return Some(None);
        }

        if accepted_in_batch == 0 {
            state.consecutive_empty_batches += 1;
        } else {
            state.consecutive_empty_batches = 0;
        }

        if state.consecutive_empty_batches >= self.config.max_consecutive_empty_batches {
            return Some(Some(FailureReason::InsufficientYield {
                ceiling: YieldCeiling::ConsecutiveEmptyBatches,
            }));
        }
        if state.attempted_batches >= self.config.max_batches {
            return Some(Some(FailureReason::InsufficientYield {
                ceiling: YieldCeiling::MaxBatches,
            }));
        }
        None
    }

    fn enter(
        &self,
        state: &mut RunState,
        stage: RunStage,
        events: Option<&mpsc::Sender<PipelineEvent>>,
    ) {
        tracing::trace!(run_id = %state.run_id, from = %state.stage, to = %stage, "Stage transition");
        state.stage = stage;
        emit(events, PipelineEvent::stage_started(state.run_id, stage));
    }
}

/// Publishes `event` without waiting for the receiver.
///
/// A full buffer or a dropped receiver loses the event and the run carries on.
fn emit(events: Option<&mpsc::Sender<PipelineEvent>>, event: PipelineEvent) {
    let Some(tx) = events else {
        return;
    };
    if let Err(TrySendError::Full(event)) = tx.try_send(event) {
        tracing::trace!(run_id = %event.run_id(), "Event buffer full, dropping progress event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{DataFormat, Domain};
    use crate::enrichment::StaticContextEnricher;
    use crate::error::{EnrichmentError, LlmError};
    use crate::llm::{Choice, CompletionRequest, CompletionResponse, Message, Usage};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex;

    /// Replays scripted responses in order, repeating the last one.
    struct ScriptedLlm {
        responses: Mutex<Vec<String>>,
        call_count: AtomicUsize,
    }

    impl ScriptedLlm {
        fn new(responses: Vec<String>) -> Self {
            Self {
                responses: Mutex::new(responses),
                call_count: AtomicUsize::new(0),
            }
        }

        fn calls(&self) -> usize {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        async fn generate(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let n = self.call_count.fetch_add(1, Ordering::SeqCst);
            let responses = self.responses.lock().unwrap();
            let content = responses
                .get(n)
                .or_else(|| responses.last())
                .cloned()
                .unwrap_or_default();
            Ok(CompletionResponse {
                id: format!("resp-{}", n),
                model: "scripted".to_string(),
                choices: vec![Choice {
                    index: 0,
                    message: Message::assistant(content),
                    finish_reason: "stop".to_string(),
                }],
                usage: Usage::default(),
            })
        }
    }

    struct FailingEnricher;

    #[async_trait]
    impl ContextEnricher for FailingEnricher {
        async fn enrich(
            &self,
            _domain: Domain,
            _hint: Option<&str>,
        ) -> Result<String, EnrichmentError> {
            Err(EnrichmentError::RequestFailed("offline".to_string()))
        }
    }

    fn qna(i: usize) -> Value {
        json!({
            "question": format!("How should a clinician adjust patient treatment plan number {} after a new diagnosis?", i),
            "answer": format!("The clinician reviews the patient history, confirms the diagnosis with relevant tests, and updates medication and therapy in treatment plan {} while monitoring symptoms closely.", i),
            "context": "Outpatient clinical care with a focus on chronic disease management."
        })
    }

    fn batch(records: Vec<Value>) -> String {
        json!({ "records": records }).to_string()
    }

    fn test_config() -> PipelineConfig {
        PipelineConfig::default()
            .with_base_backoff(Duration::from_millis(1))
            .with_max_batches(10)
    }

    fn orchestrator(llm: Arc<ScriptedLlm>, config: PipelineConfig) -> PipelineOrchestrator {
        PipelineOrchestrator::new(llm, Arc::new(StaticContextEnricher), config).unwrap()
    }

    #[tokio::test]
    async fn test_reaches_target_and_ignores_surplus() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch((0..15).map(qna).collect())]));
        let orch = orchestrator(llm.clone(), test_config());
        let request = GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 10);

        let result = orch.run(request).await.unwrap();

        assert_eq!(result.status, RunStatus::Succeeded);
        assert_eq!(result.accepted_count, 10);
        assert_eq!(result.accepted_records.len(), 10);
        assert_eq!(result.attempted_batches, 1);
        assert_eq!(llm.calls(), 1);
        assert!(result.failure.is_none());
        assert!((result.progress_percentage() - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_invalid_target_count_is_rejected() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch(vec![])]));
        let orch = orchestrator(llm.clone(), test_config());

        let err = orch
            .run(GenerationRequest::new(Domain::Law, DataFormat::Qna, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::InvalidRequest(_)));
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_empty_batches_end_run() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch(vec![])]));
        let config = test_config().with_max_consecutive_empty_batches(3);
        let orch = orchestrator(llm.clone(), config);

        let result = orch
            .run(GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 5))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(
            result.failure,
            Some(FailureReason::InsufficientYield {
                ceiling: YieldCeiling::ConsecutiveEmptyBatches
            })
        );
        assert_eq!(result.attempted_batches, 3);
        assert!(result.accepted_records.is_empty());
        assert!(matches!(
            result.into_result(),
            Err(PipelineError::InsufficientYield { accepted: 0, target: 5, .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicates_rejected_across_batches() {
        // Every batch repeats the same three records.
        let llm = Arc::new(ScriptedLlm::new(vec![batch((0..3).map(qna).collect())]));
        let config = test_config().with_max_consecutive_empty_batches(2);
        let orch = orchestrator(llm.clone(), config);

        let result = orch
            .run(GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 5))
            .await
            .unwrap();

        assert_eq!(result.status, RunStatus::Failed);
        assert_eq!(result.accepted_count, 3);
        assert_eq!(result.attempted_batches, 3);
        assert_eq!(result.stats.duplicate_rejections, 6);
    }

    #[tokio::test]
    async fn test_cancelled_before_first_batch() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch((0..15).map(qna).collect())]));
        let orch = orchestrator(llm.clone(), test_config());
        let cancel = CancellationFlag::new();
        cancel.cancel();

        let result = orch
            .run_with(
                GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 10),
                &cancel,
                None,
            )
            .await
            .unwrap();

        assert_eq!(result.failure, Some(FailureReason::Cancelled));
        assert_eq!(result.attempted_batches, 0);
        assert_eq!(llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_enrichment_failure_degrades() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch((0..15).map(qna).collect())]));
        let orch =
            PipelineOrchestrator::new(llm, Arc::new(FailingEnricher), test_config()).unwrap();
        let (tx, mut rx) = mpsc::channel(64);

        let result = orch
            .run_with(
                GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 3),
                &CancellationFlag::new(),
                Some(&tx),
            )
            .await
            .unwrap();
        drop(tx);

        assert!(result.is_success());
        assert!(result.stats.enrichment_degraded);

        let mut saw_degraded = false;
        let mut last = None;
        while let Some(event) = rx.recv().await {
            if matches!(event, PipelineEvent::EnrichmentDegraded { .. }) {
                saw_degraded = true;
            }
            last = Some(event);
        }
        assert!(saw_degraded);
        assert!(matches!(
            last,
            Some(PipelineEvent::RunFinished {
                status: RunStatus::Succeeded,
                accepted: 3,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_unread_event_channel_does_not_stall_run() {
        let llm = Arc::new(ScriptedLlm::new(vec![batch(vec![])]));
        let config = test_config()
            .with_max_batches(30)
            .with_max_consecutive_empty_batches(100);
        let orch = orchestrator(llm.clone(), config);
        let (tx, mut rx) = mpsc::channel(1);

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            orch.run_with(
                GenerationRequest::new(Domain::Healthcare, DataFormat::Qna, 5),
                &CancellationFlag::new(),
                Some(&tx),
            ),
        )
        .await
        .expect("run should not block on a full event buffer")
        .unwrap();

        assert_eq!(
            finished.failure,
            Some(FailureReason::InsufficientYield {
                ceiling: YieldCeiling::MaxBatches
            })
        );
        assert_eq!(finished.attempted_batches, 30);
        assert_eq!(llm.calls(), 30);

        // Only the first event fit; the rest were dropped.
        drop(tx);
        assert!(matches!(
            rx.recv().await,
            Some(PipelineEvent::StageStarted {
                stage: RunStage::Init,
                ..
            })
        ));
        assert!(rx.recv().await.is_none());
    }

    #[test]
    fn test_success_rate() {
        let mut stats = RunStats::new();
        assert_eq!(stats.success_rate(0), 0.0);
        stats.candidates_received = 20;
        assert!((stats.success_rate(5) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cancellation_flag_is_shared() {
        let flag = CancellationFlag::new();
        let clone = flag.clone();
        clone.cancel();
        assert!(flag.is_cancelled());
    }
}
