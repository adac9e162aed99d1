//! LLM client library for the novel-audio workspace
//!
//! Provides a unified interface to the chat-completion providers used for
//! chapter translation:
//! - xAI (Grok) and Gemini through their OpenAI-compatible endpoints
//! - OpenRouter (multi-model access)
//! - Anthropic API (direct)

pub mod config;
pub mod error;
pub mod provider;
pub mod providers;

pub use config::{Config, ModelPreset, ProviderConfig};
pub use error::{LlmError, Result};
pub use provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};
pub use providers::{MockProvider, ProviderKind, get_provider};
