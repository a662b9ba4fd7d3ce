//! LLM provider implementations.
//!
//! Each provider implements [`LlmProvider`] against a hosted
//! OpenAI-compatible endpoint.

pub mod openrouter;

pub use openrouter::OpenRouterProvider;

// Re-export the main LlmProvider trait from litellm for convenience
pub use super::litellm::LlmProvider;
