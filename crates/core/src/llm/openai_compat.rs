//! OpenAI-compatible chat-completions backend.
//!
//! Covers Together-style free gateways and anything else that speaks the
//! `/chat/completions` dialect. This is the keyless last resort in the
//! fallback chain.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::retry::{with_retry, RetryConfig};
use super::{Completion, CompletionRequest, LlmError, ModelClient, DEFAULT_REQUEST_TIMEOUT};
use crate::models::LlmProvider;
use async_trait::async_trait;

const PROVIDER: &str = "OpenAI-compatible";
const DEFAULT_BASE_URL: &str = "https://api.together.xyz/v1";

pub struct OpenAiCompatClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl OpenAiCompatClient {
    /// Key is optional for free-tier gateways; a placeholder is sent when
    /// the environment has none.
    pub fn from_env(model: &str, base_url: Option<&str>) -> Result<Self, LlmError> {
        let api_key = std::env::var("TOGETHER_API_KEY").unwrap_or_else(|_| "free-key".to_string());
        Ok(Self::new(api_key, model, base_url))
    }

    pub fn new(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: Option<&str>,
    ) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.unwrap_or(DEFAULT_BASE_URL).to_string(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    async fn generate_once(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &req.system {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: req.prompt.clone(),
        });

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: req.temperature,
            max_tokens: req.max_output_tokens,
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            if status.as_u16() == 429 {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse::<u64>().ok());
                return Err(LlmError::RateLimited {
                    provider: PROVIDER,
                    retry_after,
                });
            }

            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: ChatCompletionResponse = response.json().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::Empty { provider: PROVIDER })?;

        Ok(Completion {
            content,
            model: self.model.clone(),
            latency_ms,
        })
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        with_retry(&self.retry, "openai_compat.generate", || {
            self.generate_once(req)
        })
        .await
    }
}

// === Wire types ===

#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}
