//! Error types for synth-forge operations.
//!
//! Defines error types for the subsystems that talk to the outside world:
//! - LLM API interactions
//! - Domain context enrichment
//! - Dataset export
//!
//! Pipeline-level errors live next to the orchestrator in
//! [`crate::pipeline::PipelineError`].

use thiserror::Error;

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("Missing API key: OPENROUTER_API_KEY or LITELLM_API_KEY environment variable not set")]
    MissingApiKey,

    #[error("Missing API base URL: LITELLM_API_BASE environment variable not set")]
    MissingApiBase,

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),

    #[error("Request timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Failed to parse LLM response: {0}")]
    ParseError(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Authentication rejected ({code}): {message}")]
    Unauthorized { code: u16, message: String },

    #[error("Context length exceeded: {limit} tokens")]
    ContextLengthExceeded { limit: u32 },

    #[error("API error ({code}): {message}")]
    ApiError { code: u16, message: String },
}

impl LlmError {
    /// Whether the failure is worth retrying.
    ///
    /// Timeouts, rate limits, transport errors and server-side (5xx) errors
    /// are transient. Authentication failures, request rejections and
    /// malformed responses are not.
    pub fn is_transient(&self) -> bool {
        match self {
            LlmError::Timeout { .. } | LlmError::RateLimited(_) | LlmError::RequestFailed(_) => {
                true
            }
            LlmError::ApiError { code, .. } => *code >= 500 || *code == 429 || *code == 408,
            LlmError::MissingApiKey
            | LlmError::MissingApiBase
            | LlmError::ParseError(_)
            | LlmError::Unauthorized { .. }
            | LlmError::ContextLengthExceeded { .. } => false,
        }
    }

    /// Maps a `reqwest` transport error, keeping timeouts distinguishable.
    pub(crate) fn from_transport(err: reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            LlmError::Timeout {
                seconds: timeout_secs,
            }
        } else {
            LlmError::RequestFailed(err.to_string())
        }
    }

    /// Maps a non-success HTTP status and its message to an error variant.
    pub(crate) fn from_status(code: u16, message: String) -> Self {
        match code {
            429 => LlmError::RateLimited(message),
            401 | 403 => LlmError::Unauthorized { code, message },
            _ => LlmError::ApiError { code, message },
        }
    }
}

/// Errors that can occur while enriching a request with domain context.
#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("Lookup request failed: {0}")]
    RequestFailed(String),

    #[error("Lookup timed out after {seconds} seconds")]
    Timeout { seconds: u64 },

    #[error("Lookup returned no usable content for '{0}'")]
    NoContent(String),
}

/// Errors that can occur during export operations.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("No records to export")]
    NoRecords,

    #[error("Record format '{found}' does not match export format '{expected}'")]
    FormatMismatch { expected: String, found: String },

    #[error("Export file not found: {0}")]
    NotFound(String),

    #[error("Malformed CSV in '{file}': {reason}")]
    MalformedCsv { file: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(LlmError::Timeout { seconds: 30 }.is_transient());
        assert!(LlmError::RateLimited("slow down".to_string()).is_transient());
        assert!(LlmError::RequestFailed("connection reset".to_string()).is_transient());
        assert!(LlmError::ApiError {
            code: 503,
            message: "unavailable".to_string()
        }
        .is_transient());

        assert!(!LlmError::Unauthorized {
            code: 401,
            message: "bad key".to_string()
        }
        .is_transient());
        assert!(!LlmError::ApiError {
            code: 400,
            message: "bad request".to_string()
        }
        .is_transient());
        assert!(!LlmError::ParseError("garbage".to_string()).is_transient());
    }

    #[test]
    fn test_from_status() {
        assert!(matches!(
            LlmError::from_status(429, "x".to_string()),
            LlmError::RateLimited(_)
        ));
        assert!(matches!(
            LlmError::from_status(403, "x".to_string()),
            LlmError::Unauthorized { code: 403, .. }
        ));
        assert!(matches!(
            LlmError::from_status(502, "x".to_string()),
            LlmError::ApiError { code: 502, .. }
        ));
    }
}
