//! OpenRouter provider implementation.
//!
//! OpenRouter provides a unified API for accessing multiple LLM providers
//! through a single OpenAI-compatible endpoint.

use async_trait::async_trait;
use reqwest::Client;

use crate::error::LlmError;
use crate::llm::litellm::{build_http_client, post_chat_completion, ApiRequest, DEFAULT_MODEL};
use crate::llm::{CompletionRequest, CompletionResponse, LlmProvider};

/// Default OpenRouter API endpoint.
const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";

/// OpenRouter provider for LLM requests.
///
/// Makes a single attempt per call; the batch requester owns retries.
pub struct OpenRouterProvider {
    /// HTTP client for making API requests.
    client: Client,
    /// API key for OpenRouter authentication.
    api_key: String,
    /// Base URL for the OpenRouter API.
    base_url: String,
    /// Default model to use when none is specified.
    default_model: String,
}

impl OpenRouterProvider {
    /// Create a new OpenRouter provider with the given API key and the
    /// default model.
    pub fn new(api_key: String) -> Self {
        Self::with_model(api_key, DEFAULT_MODEL.to_string())
    }

    /// Create a new OpenRouter provider with a specific default model.
    ///
    /// # Arguments
    ///
    /// * `api_key` - OpenRouter API key for authentication
    /// * `model` - Default model identifier (e.g., "anthropic/claude-3-opus")
    pub fn with_model(api_key: String, model: String) -> Self {
        Self::with_custom_url(api_key, OPENROUTER_BASE_URL.to_string(), model)
    }

    /// Create a new OpenRouter provider with custom base URL.
    ///
    /// Useful for testing or using OpenRouter-compatible proxies.
    pub fn with_custom_url(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: build_http_client(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: model,
        }
    }

    /// Get the API key (for debugging, returns masked value).
    pub fn api_key_masked(&self) -> String {
        let chars: Vec<char> = self.api_key.chars().collect();
        if chars.len() <= 8 {
            "*".repeat(chars.len())
        } else {
            let head: String = chars[..4].iter().collect();
            let tail: String = chars[chars.len() - 4..].iter().collect();
            format!("{head}...{tail}")
        }
    }

    /// Get the base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }
}

#[async_trait]
impl LlmProvider for OpenRouterProvider {
    async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let api_request = ApiRequest::from_request(request, &self.default_model);
        let url = format!("{}/chat/completions", self.base_url);

        let http_request = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key));

        let response = post_chat_completion(http_request, &api_request).await;
        if let Err(ref err) = response {
            tracing::debug!(
                model = %api_request.model,
                transient = err.is_transient(),
                error = %err,
                "OpenRouter request failed"
            );
        }
        response
    }
}
