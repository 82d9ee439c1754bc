//! # Model Client Adapter
//!
//! A uniform async interface over heterogeneous hosted completion APIs.
//! Each backend is a thin reqwest JSON client; none of them pull in a
//! vendor SDK. The [`FallbackClient`] composes backends in priority order
//! so a rate-limited or unconfigured provider degrades instead of failing
//! the run.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::models::{LlmProvider, ModelConfig};

pub mod extract;
pub mod gemini;
pub mod huggingface;
pub mod mock;
pub mod openai_compat;
pub mod retry;

/// Default per-request timeout for provider calls.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors surfaced by provider backends.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("{provider} API error ({status}): {message}")]
    Api {
        provider: &'static str,
        status: u16,
        message: String,
    },

    #[error("{provider} rate limited")]
    RateLimited {
        provider: &'static str,
        retry_after: Option<u64>,
    },

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("{provider} returned an empty completion")]
    Empty { provider: &'static str },

    #[error("could not decode model output: {0}")]
    Decode(String),

    #[error("missing API key: set {0}")]
    MissingApiKey(&'static str),

    #[error("all providers failed, last error: {0}")]
    AllProvidersFailed(String),
}

impl LlmError {
    /// Transient failures worth retrying: rate limits, timeouts, 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::RateLimited { .. } => true,
            LlmError::Api { status, .. } => retry::is_retryable_status(*status),
            LlmError::Network(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

/// One completion request: system instructions plus a user prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    #[serde(default)]
    pub system: Option<String>,
    pub prompt: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            system: None,
            prompt: prompt.into(),
            temperature: 0.7,
            max_output_tokens: 2048,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_output_tokens(mut self, max_output_tokens: u32) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }
}

/// A finished completion with call metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    /// Concrete model that answered (a fallback chain may differ from the
    /// configured one).
    pub model: String,
    pub latency_ms: u64,
}

/// Uniform interface over completion providers.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn provider(&self) -> LlmProvider;

    fn model(&self) -> &str;

    async fn generate(&self, req: &CompletionRequest) -> Result<Completion, LlmError>;
}

/// An ordered chain of clients: tries each in turn, returns the first
/// success, reports the last error when all fail.
pub struct FallbackClient {
    clients: Vec<Box<dyn ModelClient>>,
}

impl FallbackClient {
    pub fn new(clients: Vec<Box<dyn ModelClient>>) -> Self {
        Self { clients }
    }

    /// Build the default chain for a primary config from whatever the
    /// environment has credentials for. The OpenAI-compatible endpoint is
    /// always appended as the keyless last resort, so the chain is never
    /// empty.
    pub fn from_env(primary: &ModelConfig) -> anyhow::Result<Self> {
        let mut clients: Vec<Box<dyn ModelClient>> = Vec::new();

        if primary.provider.configured() {
            clients.push(primary.create_client()?);
        } else {
            tracing::warn!(
                provider = primary.provider.display_name(),
                "primary provider not configured, skipping"
            );
        }

        for provider in LlmProvider::all() {
            if provider == primary.provider {
                continue;
            }
            if provider.configured() {
                clients.push(ModelConfig::for_provider(provider).create_client()?);
            }
        }

        Ok(Self { clients })
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}

#[async_trait]
impl ModelClient for FallbackClient {
    fn provider(&self) -> LlmProvider {
        self.clients
            .first()
            .map(|c| c.provider())
            .unwrap_or_default()
    }

    fn model(&self) -> &str {
        self.clients.first().map(|c| c.model()).unwrap_or("none")
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut last_error = "no providers configured".to_string();

        for client in &self.clients {
            match client.generate(req).await {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    tracing::warn!(
                        provider = client.provider().display_name(),
                        model = client.model(),
                        error = %e,
                        "provider failed, trying next in chain"
                    );
                    last_error = e.to_string();
                }
            }
        }

        Err(LlmError::AllProvidersFailed(last_error))
    }
}

#[cfg(test)]
mod tests {
    use super::mock::MockClient;
    use super::*;

    #[tokio::test]
    async fn test_fallback_uses_first_healthy_client() {
        let chain = FallbackClient::new(vec![
            Box::new(MockClient::new("broken").always_failing()),
            Box::new(MockClient::new("healthy").with_text("from backup")),
        ]);

        let completion = chain
            .generate(&CompletionRequest::new("hello"))
            .await
            .unwrap();
        assert_eq!(completion.content, "from backup");
        assert_eq!(completion.model, "healthy");
    }

    #[tokio::test]
    async fn test_fallback_reports_last_error_when_all_fail() {
        let chain = FallbackClient::new(vec![
            Box::new(MockClient::new("a").always_failing()),
            Box::new(MockClient::new("b").always_failing()),
        ]);

        let err = chain
            .generate(&CompletionRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AllProvidersFailed(_)));
    }

    #[tokio::test]
    async fn test_empty_chain_fails() {
        let chain = FallbackClient::new(vec![]);
        let err = chain
            .generate(&CompletionRequest::new("hello"))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::AllProvidersFailed(_)));
    }

    #[test]
    fn test_request_builder() {
        let req = CompletionRequest::new("p")
            .with_system("s")
            .with_temperature(0.2)
            .with_max_output_tokens(512);
        assert_eq!(req.system.as_deref(), Some("s"));
        assert_eq!(req.max_output_tokens, 512);
    }
}
