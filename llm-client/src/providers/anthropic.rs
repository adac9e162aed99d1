//! Anthropic API provider
//!
//! Direct HTTP implementation for the Anthropic Messages API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{build_client, retry_after_secs, send_error, status_error};
use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse, TokenUsage};

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Chapters translate to long outputs; the API requires an explicit cap.
const DEFAULT_MAX_TOKENS: u32 = 16384;

/// Provider for direct Anthropic API calls
pub struct AnthropicProvider {
    model: String,
    messages_url: String,
    api_key: String,
    client: Client,
}

impl AnthropicProvider {
    /// Create a new Anthropic provider
    pub fn new(model: &str, base_url: &str, api_key: String, timeout: Duration) -> Result<Self> {
        Ok(Self {
            model: model.to_string(),
            messages_url: format!("{}/messages", base_url.trim_end_matches('/')),
            api_key,
            client: build_client(timeout)?,
        })
    }
}

// Anthropic API request/response types

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    usage: ResponseUsage,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseUsage {
    input_tokens: u32,
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Concatenate every text block of the reply
fn collect_text(blocks: &[ContentBlock]) -> Option<String> {
    let text: String = blocks.iter().filter_map(|b| b.text.as_deref()).collect();
    if text.is_empty() { None } else { Some(text) }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        let api_request = MessagesRequest {
            model: self.model.clone(),
            max_tokens: request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            system: request.system_prompt.clone(),
            temperature: request.temperature,
            messages: vec![Message {
                role: "user",
                content: request.prompt,
            }],
        };

        let response = self
            .client
            .post(&self.messages_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
            .json(&api_request)
            .send()
            .await
            .map_err(send_error)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after_secs(response.headers());
            let error_text = response.text().await.unwrap_or_default();
            let message =
                if let Ok(error_response) = serde_json::from_str::<ErrorResponse>(&error_text) {
                    error_response.error.message
                } else {
                    error_text
                };

            return Err(status_error(status.as_u16(), retry_after, message));
        }

        let body = response.text().await.map_err(send_error)?;
        let api_response: MessagesResponse = serde_json::from_str(&body)
            .map_err(|e| LlmError::InvalidResponse(format!("Failed to parse response: {}", e)))?;

        let content = collect_text(&api_response.content)
            .ok_or_else(|| LlmError::InvalidResponse("response contained no text".into()))?;

        Ok(LlmResponse {
            content,
            model: self.model.clone(),
            usage: Some(TokenUsage {
                input_tokens: api_response.usage.input_tokens,
                output_tokens: api_response.usage.output_tokens,
            }),
        })
    }

    fn name(&self) -> &'static str {
        "Anthropic API"
    }
}
