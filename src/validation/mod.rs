//! Validation modules for synth-forge.
//!
//! This module provides schema validation for candidate records proposed by
//! the model.

pub mod schema_validator;

pub use schema_validator::{ErrorSeverity, SchemaError, SchemaValidationResult, SchemaValidator};
