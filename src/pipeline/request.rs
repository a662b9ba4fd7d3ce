//! The caller's generation request.

use serde::{Deserialize, Serialize};

use crate::catalog::{DataFormat, Domain};

use super::orchestrator::PipelineError;

/// What to generate. Immutable once a run has accepted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub domain: Domain,
    pub format: DataFormat,
    /// Number of records wanted.
    pub target_count: usize,
    /// Optional focus within the domain.
    pub context: Option<String>,
}

impl GenerationRequest {
    pub fn new(domain: Domain, format: DataFormat, target_count: usize) -> Self {
        Self {
            domain,
            format,
            target_count,
            context: None,
        }
    }

    /// Sets the focus context; blank strings count as none.
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        let context = context.into();
        self.context = if context.trim().is_empty() {
            None
        } else {
            Some(context.trim().to_string())
        };
        self
    }

    /// Builds a request from its string form.
    ///
    /// # Errors
    ///
    /// Returns `PipelineError::InvalidRequest` for an unknown domain or
    /// format.
    pub fn parse(
        domain: &str,
        format: &str,
        target_count: usize,
        context: Option<&str>,
    ) -> Result<Self, PipelineError> {
        let domain: Domain = domain.parse().map_err(PipelineError::InvalidRequest)?;
        let format: DataFormat = format.parse().map_err(PipelineError::InvalidRequest)?;
        let request = Self::new(domain, format, target_count);
        Ok(match context {
            Some(context) => request.with_context(context),
            None => request,
        })
    }

    /// Checks the target count against `1..=max_target_count`.
    pub fn validate(&self, max_target_count: usize) -> Result<(), PipelineError> {
        if self.target_count == 0 {
            return Err(PipelineError::InvalidRequest(
                "target_count must be at least 1".to_string(),
            ));
        }
        if self.target_count > max_target_count {
            return Err(PipelineError::InvalidRequest(format!(
                "target_count {} exceeds the maximum of {}",
                self.target_count, max_target_count
            )));
        }
        Ok(())
    }
}
