//! LLM provider implementations

mod anthropic;
pub mod mock;
mod openai_compatible;

pub use anthropic::AnthropicProvider;
pub use mock::MockProvider;
pub use openai_compatible::OpenAICompatibleProvider;

use std::str::FromStr;
use std::time::Duration;

use crate::config::{ModelPreset, ProviderConfig};
use crate::error::{LlmError, Result};
use crate::provider::LlmProvider;

/// Translation requests can take minutes for long chapters.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Supported provider types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    Xai,
    Gemini,
    OpenRouter,
    Anthropic,
}

impl FromStr for ProviderKind {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "xai" | "grok" => Ok(Self::Xai),
            "gemini" | "google" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            "anthropic" => Ok(Self::Anthropic),
            _ => Err(LlmError::ConfigError(format!("Unknown provider: {}", s))),
        }
    }
}

impl ProviderKind {
    /// Environment variable holding this provider's API key
    pub fn env_var(&self) -> &'static str {
        match self {
            Self::Xai => "XAI_API_KEY",
            Self::Gemini => "GEMINI_API_KEY",
            Self::OpenRouter => "OPENROUTER_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    /// Human-readable provider name
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Xai => "xAI",
            Self::Gemini => "Gemini",
            Self::OpenRouter => "OpenRouter",
            Self::Anthropic => "Anthropic API",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Xai => "https://api.x.ai/v1",
            Self::Gemini => "https://generativelanguage.googleapis.com/v1beta/openai",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Anthropic => "https://api.anthropic.com/v1",
        }
    }
}

/// Create a provider instance from a preset and optional config
pub fn get_provider(
    preset: &ModelPreset,
    provider_config: Option<&ProviderConfig>,
) -> Result<Box<dyn LlmProvider>> {
    let kind: ProviderKind = preset.provider.parse()?;
    let api_key = get_api_key(provider_config, kind)?;
    let base_url = provider_config
        .and_then(|c| c.base_url.clone())
        .unwrap_or_else(|| kind.default_base_url().to_string());
    let timeout = Duration::from_secs(
        provider_config
            .and_then(|c| c.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS),
    );

    match kind {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(
            &preset.model,
            &base_url,
            api_key,
            timeout,
        )?)),
        ProviderKind::Xai | ProviderKind::Gemini | ProviderKind::OpenRouter => {
            Ok(Box::new(OpenAICompatibleProvider::new(
                &preset.model,
                &base_url,
                api_key,
                kind.display_name(),
                timeout,
            )?))
        }
    }
}

/// Get API key from config or environment variable
fn get_api_key(config: Option<&ProviderConfig>, kind: ProviderKind) -> Result<String> {
    if let Some(key) = config.and_then(|c| c.api_key.clone()) {
        return Ok(key);
    }

    std::env::var(kind.env_var()).map_err(|_| LlmError::MissingApiKey {
        provider: kind.display_name().to_string(),
        env_var: kind.env_var().to_string(),
    })
}

/// Build an HTTP client with the provider timeout applied
fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| LlmError::ConfigError(format!("Failed to build HTTP client: {}", e)))
}

/// Map a transport failure onto the error taxonomy
fn send_error(e: reqwest::Error) -> LlmError {
    if e.is_timeout() {
        LlmError::Network(format!("Request timed out: {}", e))
    } else {
        LlmError::Network(format!("Request failed: {}", e))
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn status_error(status: u16, retry_after: Option<u64>, message: String) -> LlmError {
    match status {
        429 => LlmError::RateLimited { retry_after },
        503 => LlmError::ServerOverloaded { message },
        _ => LlmError::ApiError {
            message,
            status_code: Some(status),
        },
    }
}

/// Seconds from a `Retry-After` header, when present and numeric
fn retry_after_secs(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}
