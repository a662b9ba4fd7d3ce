//! synth-forge: domain-specific synthetic dataset generation.
//!
//! A run enriches a domain with background context, asks an LLM for batches
//! of candidate records, and keeps only candidates that pass schema
//! validation, quality scoring and deduplication, until the requested number
//! of records is reached or the run gives up.

// Core modules
pub mod catalog;
pub mod cli;
pub mod diversity;
pub mod enrichment;
pub mod error;
pub mod export;
pub mod generation;
pub mod llm;
pub mod pipeline;
pub mod quality;
pub mod records;
pub mod utils;
pub mod validation;

// Re-export commonly used types
pub use catalog::{DataFormat, Domain};
pub use error::{EnrichmentError, ExportError, LlmError};
pub use pipeline::{
    GenerationRequest, GenerationResult, PipelineConfig, PipelineError, PipelineOrchestrator,
    RunStatus,
};
pub use records::Record;
