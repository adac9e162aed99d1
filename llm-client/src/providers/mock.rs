//! Mock LLM provider for testing
//!
//! Replays a script of canned replies and failures and records every request,
//! so callers can assert on the prompts they built.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{LlmError, Result};
use crate::provider::{LlmProvider, LlmRequest, LlmResponse};

/// A mock provider driven by a script of outcomes
pub struct MockProvider {
    /// Outcomes returned in order, one per call
    script: Mutex<VecDeque<Result<String>>>,
    /// Reply used once the script is exhausted (None = fail)
    fallback: Option<String>,
    /// Current call count
    call_count: AtomicUsize,
    /// Every request received, in order
    requests: Mutex<Vec<LlmRequest>>,
    /// Provider name for display
    name: &'static str,
}

impl MockProvider {
    fn with_script(script: Vec<Result<String>>, fallback: Option<String>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            call_count: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            name: "mock",
        }
    }

    /// Create a provider that always succeeds with the same reply
    pub fn always_succeeds(response: &str) -> Self {
        Self::with_script(Vec::new(), Some(response.to_string()))
    }

    /// Create a provider that always fails with the given error
    pub fn always_fails(error: LlmError) -> Self {
        Self::with_script(vec![Err(error)], None)
    }

    /// Create a provider that fails `n` times with the given error, then succeeds
    pub fn fails_then_succeeds(n: usize, error: LlmError, response: &str) -> Self {
        let script = (0..n).map(|_| Err(clone_error(&error))).collect();
        Self::with_script(script, Some(response.to_string()))
    }

    /// Create a provider that replays `replies` in order, one per call
    pub fn scripted(replies: Vec<Result<String>>) -> Self {
        Self::with_script(replies, None)
    }

    /// Get the number of times complete() was called
    pub fn call_count(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Prompts of every request received so far
    pub fn prompts(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|r| r.iter().map(|req| req.prompt.clone()).collect())
            .unwrap_or_default()
    }

    /// Set a custom provider name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }

    fn next_outcome(&self) -> Result<String> {
        let mut script = self
            .script
            .lock()
            .map_err(|_| LlmError::ConfigError("mock script poisoned".into()))?;

        match script.pop_front() {
            // A lone failure in an always-failing script is replayed forever.
            Some(Err(err)) if script.is_empty() && self.fallback.is_none() => {
                let replay = clone_error(&err);
                script.push_back(Err(err));
                Err(replay)
            }
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| LlmError::ConfigError("mock script exhausted".into())),
        }
    }
}

#[async_trait]
impl LlmProvider for MockProvider {
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }

        let content = self.next_outcome()?;
        Ok(LlmResponse {
            content,
            model: "mock-model".to_string(),
            usage: None,
        })
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Clone an LlmError (needed because LlmError doesn't implement Clone)
fn clone_error(err: &LlmError) -> LlmError {
    match err {
        LlmError::ServerOverloaded { message } => LlmError::ServerOverloaded {
            message: message.clone(),
        },
        LlmError::MissingApiKey { provider, env_var } => LlmError::MissingApiKey {
            provider: provider.clone(),
            env_var: env_var.clone(),
        },
        LlmError::RateLimited { retry_after } => LlmError::RateLimited {
            retry_after: *retry_after,
        },
        LlmError::ApiError {
            message,
            status_code,
        } => LlmError::ApiError {
            message: message.clone(),
            status_code: *status_code,
        },
        LlmError::Network(s) => LlmError::Network(s.clone()),
        LlmError::InvalidResponse(s) => LlmError::InvalidResponse(s.clone()),
        LlmError::ConfigError(s) => LlmError::ConfigError(s.clone()),
        LlmError::InvalidPreset(s) => LlmError::InvalidPreset(s.clone()),
        // Io and Toml errors can't be cloned
        LlmError::Io(_) => LlmError::ConfigError("IO error (mock)".to_string()),
        LlmError::TomlParse(_) => LlmError::ConfigError("TOML parse error (mock)".to_string()),
        LlmError::TomlSerialize(_) => {
            LlmError::ConfigError("TOML serialize error (mock)".to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_always_succeeds() {
        let provider = MockProvider::always_succeeds("success");

        let result = provider.complete(LlmRequest::new("test")).await;
        assert_eq!(result.unwrap().content, "success");
        assert_eq!(provider.call_count(), 1);
        assert_eq!(provider.prompts(), vec!["test".to_string()]);
    }

    #[tokio::test]
    async fn test_always_fails() {
        let provider = MockProvider::always_fails(LlmError::ServerOverloaded {
            message: "overloaded".to_string(),
        });

        for _ in 0..3 {
            let result = provider.complete(LlmRequest::new("test")).await;
            assert!(matches!(result, Err(LlmError::ServerOverloaded { .. })));
        }
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_fails_then_succeeds() {
        let provider = MockProvider::fails_then_succeeds(
            2,
            LlmError::Network("reset".to_string()),
            "success",
        );

        assert!(provider.complete(LlmRequest::new("a")).await.is_err());
        assert!(provider.complete(LlmRequest::new("b")).await.is_err());

        let result = provider.complete(LlmRequest::new("c")).await;
        assert_eq!(result.unwrap().content, "success");
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn test_scripted_replies_in_order() {
        let provider = MockProvider::scripted(vec![
            Ok("first".to_string()),
            Err(LlmError::RateLimited { retry_after: None }),
            Ok("third".to_string()),
        ]);

        assert_eq!(
            provider.complete(LlmRequest::new("1")).await.unwrap().content,
            "first"
        );
        assert!(provider.complete(LlmRequest::new("2")).await.is_err());
        assert_eq!(
            provider.complete(LlmRequest::new("3")).await.unwrap().content,
            "third"
        );
        assert!(provider.complete(LlmRequest::new("4")).await.is_err());
    }
}
