//! Scripted in-process client for tests.

use std::sync::Mutex;

use super::{Completion, CompletionRequest, LlmError, ModelClient};
use crate::models::LlmProvider;
use async_trait::async_trait;

/// Returns queued responses in order; an empty queue yields an error so
/// tests notice unexpected extra calls. `always_failing` simulates a dead
/// provider.
pub struct MockClient {
    name: String,
    responses: Mutex<Vec<String>>,
    failing: bool,
}

impl MockClient {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            responses: Mutex::new(Vec::new()),
            failing: false,
        }
    }

    #[must_use]
    pub fn with_text(self, response: impl Into<String>) -> Self {
        self.responses
            .lock()
            .expect("mock lock poisoned")
            .push(response.into());
        self
    }

    /// Queue a JSON payload, serialized for the agent decoders.
    #[must_use]
    pub fn with_json(self, value: serde_json::Value) -> Self {
        let text = serde_json::to_string(&value).expect("mock payload serializes");
        self.with_text(text)
    }

    #[must_use]
    pub fn always_failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.responses.lock().expect("mock lock poisoned").len()
    }
}

#[async_trait]
impl ModelClient for MockClient {
    fn provider(&self) -> LlmProvider {
        LlmProvider::OpenAiCompatible
    }

    fn model(&self) -> &str {
        &self.name
    }

    async fn generate(&self, _req: &CompletionRequest) -> Result<Completion, LlmError> {
        if self.failing {
            return Err(LlmError::Api {
                provider: "mock",
                status: 500,
                message: format!("{} is scripted to fail", self.name),
            });
        }

        let mut responses = self.responses.lock().expect("mock lock poisoned");
        if responses.is_empty() {
            return Err(LlmError::Empty { provider: "mock" });
        }

        Ok(Completion {
            content: responses.remove(0),
            model: self.name.clone(),
            latency_ms: 0,
        })
    }
}
