//! Google Gemini backend (AI Studio `generateContent` endpoint).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::retry::{with_retry, RetryConfig};
use super::{Completion, CompletionRequest, LlmError, ModelClient, DEFAULT_REQUEST_TIMEOUT};
use crate::models::LlmProvider;
use async_trait::async_trait;

const PROVIDER: &str = "Gemini";
const BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiClient {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryConfig,
}

impl GeminiClient {
    pub fn from_env(model: &str) -> Result<Self, LlmError> {
        let api_key =
            std::env::var("GOOGLE_API_KEY").map_err(|_| LlmError::MissingApiKey("GOOGLE_API_KEY"))?;
        Ok(Self::new(api_key, model))
    }

    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: Client::builder()
                .timeout(DEFAULT_REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
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

    #[cfg(test)]
    fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn generate_once(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![ContentPayload {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: req.prompt.clone(),
                }],
            }],
            system_instruction: req.system.as_ref().map(|s| SystemInstruction {
                parts: vec![TextPart { text: s.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: req.temperature,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: req.max_output_tokens,
            },
        };

        let url = format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        let started = Instant::now();
        let response = self.client.post(&url).json(&body).send().await?;
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

            let error_text = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ApiErrorEnvelope>(&error_text)
                .map(|e| e.error.message)
                .unwrap_or(error_text);
            return Err(LlmError::Api {
                provider: PROVIDER,
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response.json().await?;
        let latency_ms = started.elapsed().as_millis() as u64;

        let content = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
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
impl ModelClient for GeminiClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::Gemini
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, req: &CompletionRequest) -> Result<Completion, LlmError> {
        with_retry(&self.retry, "gemini.generate", || self.generate_once(req)).await
    }
}

// === Wire types ===

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<ContentPayload>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<SystemInstruction>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct ContentPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
struct SystemInstruction {
    parts: Vec<TextPart>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TextPart {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    top_p: f32,
    top_k: u32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<TextPart>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_shape() {
        let req = CompletionRequest::new("write a haiku").with_system("be terse");
        let body = GenerateContentRequest {
            contents: vec![ContentPayload {
                role: Some("user".to_string()),
                parts: vec![TextPart {
                    text: req.prompt.clone(),
                }],
            }],
            system_instruction: req.system.as_ref().map(|s| SystemInstruction {
                parts: vec![TextPart { text: s.clone() }],
            }),
            generation_config: GenerationConfig {
                temperature: 0.7,
                top_p: 0.8,
                top_k: 40,
                max_output_tokens: 2048,
            },
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "write a haiku");
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "be terse");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2048);
        assert_eq!(json["generationConfig"]["topK"], 40);
    }

    #[test]
    fn test_response_parsing() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "Hello "}, {"text": "world"}], "role": "model"}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let text: String = parsed.candidates[0]
            .content
            .parts
            .iter()
            .map(|p| p.text.as_str())
            .collect();
        assert_eq!(text, "Hello world");
    }

    #[test]
    fn test_error_envelope_parsing() {
        let raw = r#"{"error": {"code": 400, "message": "API key not valid", "status": "INVALID_ARGUMENT"}}"#;
        let parsed: ApiErrorEnvelope = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.error.message, "API key not valid");
    }

    #[test]
    fn test_base_url_override_for_tests() {
        let client = GeminiClient::new("k", "gemini-1.5-flash").with_base_url("http://localhost:1");
        assert_eq!(client.base_url, "http://localhost:1");
        assert_eq!(client.model(), "gemini-1.5-flash");
    }
}
