//! Pipeline orchestration for synthetic dataset generation.
//!
//! A run takes a [`GenerationRequest`] (domain, format, target count and an
//! optional focus) and produces up to `target_count` validated, scored and
//! deduplicated records.
//!
//! # Pipeline Flow
//!
//! 1. **Init**: the request is checked against `max_target_count`
//! 2. **Enriching**: a [`ContextEnricher`](crate::enrichment::ContextEnricher)
//!    gathers domain context; failures fall back to the built-in overview
//! 3. **Generating**: a batch of 10-15 candidates is requested from the model,
//!    with retries and backoff for transient failures
//! 4. **Validating**: each candidate is schema-checked, quality-scored and
//!    compared against the signatures already accepted
//! 5. **Deciding**: the run succeeds at the target, fails once a ceiling is
//!    hit, or requests another batch
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use synth_forge::enrichment::WebContextEnricher;
//! use synth_forge::llm::LiteLlmClient;
//! use synth_forge::pipeline::{GenerationRequest, PipelineConfig, PipelineOrchestrator};
//!
//! let llm = Arc::new(LiteLlmClient::from_env()?);
//! let orchestrator = PipelineOrchestrator::new(
//!     llm,
//!     Arc::new(WebContextEnricher::new()),
//!     PipelineConfig::from_env()?,
//! )?;
//!
//! let request = GenerationRequest::parse("healthcare", "qna", 25, Some("cardiology"))?;
//! let result = orchestrator.run(request).await?;
//!
//! println!("{}: {} records", result.status, result.accepted_count);
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! // Via builder pattern
//! let config = PipelineConfig::new()
//!     .with_batch_size(12)
//!     .with_quality_threshold(0.6);
//!
//! // Via environment variables, then a YAML overlay
//! let config = PipelineConfig::from_env()?.merge_yaml_file("forge.yaml")?;
//! ```

pub mod config;
pub mod events;
pub mod orchestrator;
pub mod request;

pub use config::{ConfigError, PipelineConfig, MAX_BATCH_SIZE, MIN_BATCH_SIZE};
pub use events::{PipelineEvent, RunStage};
pub use orchestrator::{
    CancellationFlag, FailureReason, GenerationResult, PipelineError, PipelineOrchestrator,
    RunStats, RunStatus, YieldCeiling,
};
pub use request::GenerationRequest;
