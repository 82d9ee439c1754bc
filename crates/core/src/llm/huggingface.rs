//! Hugging Face Inference API backend.
//!
//! Free-tier models come and go, so the client keeps a candidate list and
//! walks it in order until one model answers.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::retry::{with_retry, RetryConfig};
use super::{Completion, CompletionRequest, LlmError, ModelClient, DEFAULT_REQUEST_TIMEOUT};
use crate::models::LlmProvider;
use async_trait::async_trait;

const PROVIDER: &str = "Hugging Face";
const BASE_URL: &str = "https://api-inference.huggingface.co/models";

/// Fallback models tried after the configured one.
const CANDIDATE_MODELS: &[&str] = &[
    "mistralai/Mistral-7B-Instruct-v0.2",
    "google/flan-t5-xxl",
    "microsoft/DialoGPT-medium",
];

pub struct HuggingFaceClient {
    client: Client,
    token: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl HuggingFaceClient {
    pub fn from_env(model: &str) -> Result<Self, LlmError> {
        let token = std::env::var("HUGGINGFACE_TOKEN")
            .map_err(|_| LlmError::MissingApiKey("HUGGINGFACE_TOKEN"))?;
        Ok(Self::new(token, model))
    }

    pub fn new(token: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            token: token.into(),
            model: model.into(),
            base_url: BASE_URL.to_string(),
            retry: RetryConfig::default(),
        }
    }

    #[must_use]
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Configured model first, then the free-tier candidates, deduplicated.
    fn candidates(&self) -> Vec<String> {
        let mut models = vec![self.model.clone()];
        for candidate in CANDIDATE_MODELS {
            if *candidate != self.model {
                models.push((*candidate).to_string());
            }
        }
        models
    }

    async fn generate_once(
        &self,
        model: &str,
        req: &CompletionRequest,
    ) -> Result<Completion, LlmError> {
        // The text-generation API has no system slot; prepend instructions.
        let inputs = match &req.system {
            Some(system) => format!("{system}\n\n{}", req.prompt),
            None => req.prompt.clone(),
        };

        let body = TextGenerationRequest {
            inputs,
            parameters: GenerationParameters {
                max_new_tokens: req.max_output_tokens,
                temperature: req.temperature,
                return_full_text: false,
            },
        };

        let started = Instant::now();
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, model))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?;
        let status = response.status();

        if !status.is_success() {
            if status.as_u16() == 429 {
                return Err(LlmError::RateLimited {
                    provider: PROVIDER,
                    retry_after: None,
                });
            }

            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiError>(&error_text)
                .map(|e| e.error)
                .unwrap_or(error_text);
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: Vec<GeneratedText> = response.json().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content = parsed
            .into_iter()
            .next()
            .map(|g| g.generated_text)
            .filter(|text| !text.is_empty())
            .ok_or(LlmError::Empty { provider: PROVIDER })?;

        Ok(Completion {
            content,
            model: model.to_string(),
            latency_ms,
        })
    }
}

#[async_trait]
impl ModelClient for HuggingFaceClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::HuggingFace
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        let mut last_error = LlmError::Empty { provider: PROVIDER };

        for model in self.candidates() {
            match with_retry(&self.retry, "huggingface.generate", || {
                self.generate_once(&model, req)
            })
            .await
            {
                Ok(completion) => return Ok(completion),
                Err(e) => {
                    tracing::warn!(model = %model, error = %e, "Hugging Face model unavailable");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }
}

// === Wire types ===

#[derive(Debug, Serialize)]
struct TextGenerationRequest {
    inputs: String,
    parameters: GenerationParameters,
}

#[derive(Debug, Serialize)]
struct GenerationParameters {
    max_new_tokens: u32,
    temperature: f32,
    return_full_text: bool,
}

#[derive(Debug, Deserialize)]
struct GeneratedText {
    generated_text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_put_configured_model_first() {
        let client = HuggingFaceClient::new("t", "google/flan-t5-xxl");
        let candidates = client.candidates();
        assert_eq!(candidates[0], "google/flan-t5-xxl");
        // Deduplicated: the configured model is not repeated.
        assert_eq!(
            candidates.iter().filter(|m| *m == "google/flan-t5-xxl").count(),
            1
        );
        assert_eq!(candidates.len(), 3);
    }

    #[test]
    fn test_system_prompt_is_prepended() {
        let req = CompletionRequest::new("user text").with_system("system text");
        let inputs = match &req.system {
            Some(system) => format!("{system}\n\n{}", req.prompt),
            None => req.prompt.clone(),
        };
        assert!(inputs.starts_with("system text"));
        assert!(inputs.ends_with("user text"));
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"[{"generated_text": "once upon a time"}]"#;
        let parsed: Vec<GeneratedText> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed[0].generated_text, "once upon a time");
    }
}
