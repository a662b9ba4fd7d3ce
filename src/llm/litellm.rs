//! LiteLLM-compatible client implementation for synth-forge.
//!
//! This module provides the chat-completion message types shared by every
//! provider, the [`LlmProvider`] trait the generation pipeline depends on,
//! and a client for LiteLLM-compatible (OpenAI-style) APIs.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

use crate::error::LlmError;

/// Default model when none is configured.
pub const DEFAULT_MODEL: &str = "meta-llama/llama-4-maverick";

/// Request timeout for the underlying HTTP client.
const REQUEST_TIMEOUT_SECS: u64 = 120;

/// A message in a conversation with an LLM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the message sender (e.g., "system", "user", "assistant").
    pub role: String,
    /// Content of the message.
    pub content: String,
}

impl Message {
    /// Create a new system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    /// Create a new user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    /// Create a new assistant message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// Request for a chat completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    /// Model identifier. Empty means "use the provider default".
    pub model: String,
    /// Conversation messages.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0). Higher values = more random.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Maximum number of tokens to generate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// Nucleus sampling parameter (0.0 - 1.0).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f64>,
}

impl CompletionRequest {
    /// Create a new completion request with default parameters.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            temperature: None,
            max_tokens: None,
            top_p: None,
        }
    }

    /// Set the temperature for this request.
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the max tokens for this request.
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Set the top_p for this request.
    pub fn with_top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }
}

/// Response from a chat completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Unique identifier for this response.
    pub id: String,
    /// Model that generated this response.
    pub model: String,
    /// Generated choices/completions.
    pub choices: Vec<Choice>,
    /// Token usage statistics.
    pub usage: Usage,
}

impl CompletionResponse {
    /// Get the content of the first choice, if available.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

/// A single generated choice from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    /// Index of this choice in the response.
    pub index: u32,
    /// Generated message.
    pub message: Message,
    /// Reason the generation stopped (e.g., "stop", "length").
    pub finish_reason: String,
}

/// Token usage statistics for a completion request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    /// Number of tokens in the prompt.
    pub prompt_tokens: u32,
    /// Number of tokens generated.
    pub completion_tokens: u32,
    /// Total tokens used.
    pub total_tokens: u32,
}

/// Trait for LLM providers that can generate text.
///
/// Providers make exactly one attempt per call. Retry policy belongs to the
/// caller, which uses [`LlmError::is_transient`] to decide.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate a response for the given request.
    async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError>;
}

/// Client for LiteLLM-compatible APIs.
pub struct LiteLlmClient {
    /// Base URL for the API.
    api_base: String,
    /// Optional API key for authentication.
    api_key: Option<String>,
    /// Default model to use for requests.
    default_model: String,
    /// HTTP client for making API requests.
    http_client: Client,
}

impl LiteLlmClient {
    /// Create a new LiteLLM client with explicit configuration.
    ///
    /// # Arguments
    ///
    /// * `api_base` - Base URL for the LiteLLM API (e.g., "http://localhost:4000")
    /// * `api_key` - Optional API key for authentication
    /// * `default_model` - Default model to use when none is specified
    pub fn new(api_base: String, api_key: Option<String>, default_model: String) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key,
            default_model,
            http_client: build_http_client(),
        }
    }

    /// Create a new LiteLLM client from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `LITELLM_API_BASE`: Base URL for the API (required)
    /// - `LITELLM_API_KEY`: API key for authentication (optional)
    /// - `LITELLM_DEFAULT_MODEL`: Default model (defaults to [`DEFAULT_MODEL`])
    ///
    /// # Errors
    ///
    /// Returns `LlmError::MissingApiBase` if `LITELLM_API_BASE` is not set.
    pub fn from_env() -> Result<Self, LlmError> {
        let api_base = env::var("LITELLM_API_BASE").map_err(|_| LlmError::MissingApiBase)?;
        let api_key = env::var("LITELLM_API_KEY").ok();
        let default_model =
            env::var("LITELLM_DEFAULT_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());

        Ok(Self::new(api_base, api_key, default_model))
    }

    /// Get the API base URL.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    /// Get the default model.
    pub fn default_model(&self) -> &str {
        &self.default_model
    }

    /// Check if an API key is configured.
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Builds the shared HTTP client, falling back to reqwest defaults when the
/// builder cannot be configured.
pub(crate) fn build_http_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Internal request structure for the OpenAI-compatible API.
#[derive(Debug, Serialize)]
pub(crate) struct ApiRequest {
    pub(crate) model: String,
    pub(crate) messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) top_p: Option<f64>,
}

impl ApiRequest {
    pub(crate) fn from_request(request: CompletionRequest, default_model: &str) -> Self {
        let model = if request.model.is_empty() {
            default_model.to_string()
        } else {
            request.model
        };
        Self {
            model,
            messages: request.messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            top_p: request.top_p,
        }
    }
}

/// Internal response structure from the OpenAI-compatible API.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<ApiChoice>,
    #[serde(default)]
    usage: Option<ApiUsage>,
}

/// Internal choice structure from the API response.
#[derive(Debug, Deserialize)]
struct ApiChoice {
    #[serde(default)]
    index: u32,
    message: ApiMessage,
    finish_reason: Option<String>,
}

/// Internal message structure from the API response.
#[derive(Debug, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

/// Internal usage structure from the API response.
#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

/// Error response from the API.
#[derive(Debug, Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

/// Error detail from the API.
#[derive(Debug, Deserialize)]
#[allow(dead_code)] // Fields kept for complete API error deserialization
struct ApiErrorDetail {
    message: String,
    #[serde(rename = "type")]
    error_type: Option<String>,
    code: Option<serde_json::Value>,
}

impl From<ApiResponse> for CompletionResponse {
    fn from(api_response: ApiResponse) -> Self {
        let choices = api_response
            .choices
            .into_iter()
            .map(|choice| Choice {
                index: choice.index,
                message: Message {
                    role: choice.message.role,
                    content: choice.message.content.unwrap_or_default(),
                },
                finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
            })
            .collect();

        let usage = api_response
            .usage
            .map(|u| Usage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        CompletionResponse {
            id: api_response.id,
            model: api_response.model,
            choices,
            usage,
        }
    }
}

/// Sends one chat-completion request and maps the HTTP outcome to
/// [`LlmError`]. Shared by every OpenAI-compatible provider.
pub(crate) async fn post_chat_completion(
    http_request: reqwest::RequestBuilder,
    api_request: &ApiRequest,
) -> Result<CompletionResponse, LlmError> {
    let http_response = http_request
        .header("Content-Type", "application/json")
        .header("HTTP-Referer", "https://synth-forge.local")
        .header("X-Title", "synth-forge")
        .json(api_request)
        .send()
        .await
        .map_err(|e| LlmError::from_transport(e, REQUEST_TIMEOUT_SECS))?;

    let status = http_response.status();

    if !status.is_success() {
        let status_code = status.as_u16();
        let error_text = http_response
            .text()
            .await
            .unwrap_or_else(|_| "Failed to read error response".to_string());

        let message = serde_json::from_str::<ApiErrorResponse>(&error_text)
            .map(|r| r.error.message)
            .unwrap_or(error_text);

        return Err(LlmError::from_status(status_code, message));
    }

    let api_response: ApiResponse = http_response
        .json()
        .await
        .map_err(|e| LlmError::ParseError(format!("Failed to parse API response: {}", e)))?;

    Ok(api_response.into())
}

#[async_trait]
impl LlmProvider for LiteLlmClient {
    async fn generate(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let api_request = ApiRequest::from_request(request, &self.default_model);
        let url = format!("{}/chat/completions", self.api_base);

        let mut http_request = self.http_client.post(&url);
        if let Some(ref api_key) = self.api_key {
            http_request = http_request.header("Authorization", format!("Bearer {}", api_key));
        }

        post_chat_completion(http_request, &api_request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_constructors() {
        let system = Message::system("You are helpful.");
        assert_eq!(system.role, "system");
        assert_eq!(system.content, "You are helpful.");

        let user = Message::user("Hello");
        assert_eq!(user.role, "user");

        let assistant = Message::assistant("Hi there!");
        assert_eq!(assistant.role, "assistant");
    }

    #[test]
    fn test_completion_request_builder() {
        let request = CompletionRequest::new("gpt-4", vec![Message::user("test")])
            .with_temperature(0.7)
            .with_max_tokens(1000)
            .with_top_p(0.9);

        assert_eq!(request.model, "gpt-4");
        assert_eq!(request.messages.len(), 1);
        assert_eq!(request.temperature, Some(0.7));
        assert_eq!(request.max_tokens, Some(1000));
        assert_eq!(request.top_p, Some(0.9));
    }

    #[test]
    fn test_first_content() {
        let response = CompletionResponse {
            id: "test-id".to_string(),
            model: "gpt-4".to_string(),
            choices: vec![Choice {
                index: 0,
                message: Message::assistant("Hello!"),
                finish_reason: "stop".to_string(),
            }],
            usage: Usage::default(),
        };
        assert_eq!(response.first_content(), Some("Hello!"));

        let empty = CompletionResponse {
            choices: vec![],
            ..response
        };
        assert_eq!(empty.first_content(), None);
    }

    #[test]
    fn test_litellm_client_new() {
        let client = LiteLlmClient::new(
            "http://localhost:4000/".to_string(),
            Some("test-key".to_string()),
            "gpt-4".to_string(),
        );

        assert_eq!(client.api_base(), "http://localhost:4000");
        assert_eq!(client.default_model(), "gpt-4");
        assert!(client.has_api_key());
    }

    #[test]
    fn test_api_request_uses_default_model() {
        let request = CompletionRequest::new("", vec![Message::user("test")]);
        let api_request = ApiRequest::from_request(request, "fallback-model");
        assert_eq!(api_request.model, "fallback-model");
    }

    #[test]
    fn test_api_request_serialization() {
        let request = CompletionRequest::new("gpt-4", vec![Message::user("test")])
            .with_temperature(0.7)
            .with_max_tokens(1000);
        let api_request = ApiRequest::from_request(request, DEFAULT_MODEL);

        let json = serde_json::to_string(&api_request).expect("serialization should succeed");
        assert!(json.contains("\"model\":\"gpt-4\""));
        assert!(json.contains("\"temperature\":0.7"));
        assert!(json.contains("\"max_tokens\":1000"));
        assert!(!json.contains("top_p"));
    }

    #[test]
    fn test_api_response_conversion_tolerates_missing_fields() {
        let raw = r#"{
            "choices": [{"message": {"role": "assistant", "content": null}}]
        }"#;
        let api_response: ApiResponse = serde_json::from_str(raw).expect("should deserialize");
        let response: CompletionResponse = api_response.into();

        assert_eq!(response.first_content(), Some(""));
        assert_eq!(response.choices[0].finish_reason, "stop");
        assert_eq!(response.usage.total_tokens, 0);
    }

    #[tokio::test]
    async fn test_generate_connection_error_is_transient() {
        let client = LiteLlmClient::new(
            "http://localhost:65535".to_string(),
            None,
            "gpt-4".to_string(),
        );

        let request = CompletionRequest::new("gpt-4", vec![Message::user("test")]);
        let err = client
            .generate(request)
            .await
            .expect_err("no server should be listening");

        assert!(err.is_transient(), "connection errors retry: {err:?}");
    }
}
