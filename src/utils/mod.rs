//! Shared utility functions for synth-forge.
//!
//! This module provides common utilities used across multiple modules,
//! including JSON extraction from LLM responses.

pub mod json_extraction;

pub use json_extraction::{
    analyze_json_structure, extract_record_values, find_matching_brace, find_matching_bracket,
    try_extract_json_from_response, JsonExtractionError, JsonExtractionResult,
    JsonStructureAnalysis,
};
