//! # Symphony Models
//!
//! Centralized LLM configuration types for the Symphony system.
//! These types provide a clean dependency for both agents and the
//! orchestrator: pick a provider and model once, build clients anywhere.

use serde::{Deserialize, Serialize};

use crate::llm::gemini::GeminiClient;
use crate::llm::huggingface::HuggingFaceClient;
use crate::llm::openai_compat::OpenAiCompatClient;
use crate::llm::ModelClient;

/// Supported completion providers.
///
/// Keys are read from the environment, one variable per provider:
/// - Gemini (Google AI Studio) - `GOOGLE_API_KEY`
/// - Hugging Face Inference API - `HUGGINGFACE_TOKEN`
/// - OpenAI-compatible gateways (Together-style) - `TOGETHER_API_KEY`, optional
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[default]
    Gemini,
    #[serde(rename = "huggingface")]
    HuggingFace,
    OpenAiCompatible,
}

impl LlmProvider {
    /// Get all providers in fallback order.
    pub fn all() -> Vec<LlmProvider> {
        vec![
            LlmProvider::Gemini,
            LlmProvider::HuggingFace,
            LlmProvider::OpenAiCompatible,
        ]
    }

    /// Display name for logs and reports.
    pub fn display_name(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "Gemini",
            LlmProvider::HuggingFace => "Hugging Face",
            LlmProvider::OpenAiCompatible => "OpenAI-compatible",
        }
    }

    /// Default model when the config names none.
    pub fn default_model(&self) -> &'static str {
        match self {
            LlmProvider::Gemini => "gemini-1.5-flash",
            LlmProvider::HuggingFace => "mistralai/Mistral-7B-Instruct-v0.2",
            LlmProvider::OpenAiCompatible => "mistralai/Mixtral-8x7B-Instruct-v0.1",
        }
    }

    /// Whether this provider supports a custom base URL.
    pub fn supports_base_url(&self) -> bool {
        matches!(self, LlmProvider::OpenAiCompatible)
    }

    /// Whether the environment carries credentials for this provider.
    /// The OpenAI-compatible endpoint works keyless on free tiers.
    pub fn configured(&self) -> bool {
        match self {
            LlmProvider::Gemini => std::env::var("GOOGLE_API_KEY").is_ok(),
            LlmProvider::HuggingFace => std::env::var("HUGGINGFACE_TOKEN").is_ok(),
            LlmProvider::OpenAiCompatible => true,
        }
    }
}

/// Configuration for LLM model selection.
///
/// Used throughout Symphony to configure which provider and model an agent
/// talks to. Supports per-role overrides via the orchestrator config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider to use.
    #[serde(default)]
    pub provider: LlmProvider,
    /// Model name (e.g. "gemini-1.5-flash").
    pub model: String,
    /// Base URL override for OpenAI-compatible endpoints.
    #[serde(default)]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        let provider = LlmProvider::default();
        Self {
            model: provider.default_model().to_string(),
            provider,
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Create a config for a specific provider with its default model.
    pub fn for_provider(provider: LlmProvider) -> Self {
        Self {
            model: provider.default_model().to_string(),
            provider,
            base_url: None,
        }
    }

    /// Create config for a specific provider and model.
    pub fn with_provider(provider: LlmProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL (for OpenAI-compatible endpoints).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Create a client for the configured provider.
    ///
    /// Each provider reads its API key from the environment; a missing key
    /// surfaces as an error here rather than on the first request.
    pub fn create_client(&self) -> anyhow::Result<Box<dyn ModelClient>> {
        match self.provider {
            LlmProvider::Gemini => Ok(Box::new(GeminiClient::from_env(&self.model)?)),
            LlmProvider::HuggingFace => Ok(Box::new(HuggingFaceClient::from_env(&self.model)?)),
            LlmProvider::OpenAiCompatible => Ok(Box::new(OpenAiCompatClient::from_env(
                &self.model,
                self.base_url.as_deref(),
            )?)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ModelConfig::default();
        assert_eq!(config.provider, LlmProvider::Gemini);
        assert!(config.model.contains("gemini"));
    }

    #[test]
    fn test_provider_display_names() {
        assert_eq!(LlmProvider::Gemini.display_name(), "Gemini");
        assert_eq!(LlmProvider::HuggingFace.display_name(), "Hugging Face");
    }

    #[test]
    fn test_base_url_support() {
        assert!(LlmProvider::OpenAiCompatible.supports_base_url());
        assert!(!LlmProvider::Gemini.supports_base_url());
    }

    #[test]
    fn test_model_config_serialization() {
        let config = ModelConfig::with_provider(LlmProvider::HuggingFace, "google/flan-t5-xxl");
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("huggingface"));
        assert!(json.contains("flan-t5-xxl"));
    }

    #[test]
    fn test_fallback_order() {
        let order = LlmProvider::all();
        assert_eq!(order[0], LlmProvider::Gemini);
        assert_eq!(order[2], LlmProvider::OpenAiCompatible);
    }
}
