//! LLM integration for synth-forge.
//!
//! The generation pipeline only depends on the [`LlmProvider`] trait: "given
//! a prompt, return text, or fail transiently / non-transiently". Two
//! OpenAI-compatible clients implement it:
//!
//! ```ignore
//! use synth_forge::llm::{CompletionRequest, LiteLlmClient, LlmProvider, Message};
//!
//! let client = LiteLlmClient::from_env()?;
//! let request = CompletionRequest::new("", vec![Message::user("Hello!")]);
//! let response = client.generate(request).await?;
//! println!("{}", response.first_content().unwrap_or_default());
//! ```
//!
//! ```ignore
//! use synth_forge::llm::OpenRouterProvider;
//!
//! let provider = OpenRouterProvider::with_model(api_key, "openai/gpt-4o".to_string());
//! ```

pub mod litellm;
pub mod providers;

pub use litellm::{
    Choice, CompletionRequest, CompletionResponse, LiteLlmClient, LlmProvider, Message, Usage,
    DEFAULT_MODEL,
};
pub use providers::OpenRouterProvider;
