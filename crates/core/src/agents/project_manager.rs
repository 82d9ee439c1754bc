//! # Project Manager (Phase 1)
//!
//! Analyzes the brief and breaks it into specialist tasks. The output is
//! repaired where possible: unknown agent types are normalized to `coder`,
//! and an undecodable or empty breakdown is replaced by the fallback spec
//! rather than aborting the run.

use anyhow::Context;

use super::AgentOutcome;
use crate::llm::{extract, CompletionRequest, ModelClient};
use crate::project::{AgentRole, ProjectSpec};
use crate::prompts;

pub struct ProjectManager;

impl ProjectManager {
    pub async fn run(
        client: &dyn ModelClient,
        brief: &str,
    ) -> anyhow::Result<AgentOutcome<ProjectSpec>> {
        tracing::info!(brief_preview = %preview(brief), "analyzing project");

        let request = CompletionRequest::new(prompts::analysis(brief))
            .with_system(prompts::PROJECT_MANAGER)
            .with_temperature(0.4);

        let completion = client
            .generate(&request)
            .await
            .context("project analysis call failed")?;

        let spec = match decode_spec(&completion.content) {
            Some(spec) if !spec.tasks.is_empty() => spec,
            Some(_) => {
                tracing::warn!("analysis produced no tasks, using fallback breakdown");
                ProjectSpec::fallback(brief)
            }
            None => {
                tracing::warn!("analysis output could not be decoded, using fallback breakdown");
                ProjectSpec::fallback(brief)
            }
        };

        tracing::info!(
            tasks = spec.tasks.len(),
            project = %spec.project_name,
            "project analyzed"
        );

        Ok(AgentOutcome {
            output: spec,
            model: completion.model,
            latency_ms: completion.latency_ms,
        })
    }
}

/// Lenient decode: extract JSON, normalize task agent types, then the
/// typed parse.
fn decode_spec(content: &str) -> Option<ProjectSpec> {
    let mut value = extract::value_from_model_text(content).ok()?;

    if let Some(tasks) = value.get_mut("tasks").and_then(|t| t.as_array_mut()) {
        for task in tasks.iter_mut().filter(|t| t.is_object()) {
            let normalized = task
                .get("agent_type")
                .and_then(|a| a.as_str())
                .map(AgentRole::parse)
                .unwrap_or(AgentRole::Coder);
            task["agent_type"] = serde_json::json!(normalized.slug());
        }
    }

    serde_json::from_value(value).ok()
}

fn preview(text: &str) -> String {
    text.chars().take(100).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockClient;

    fn spec_json() -> serde_json::Value {
        serde_json::json!({
            "project_name": "Chess Clock",
            "description": "A two-player chess clock",
            "tasks": [
                {"id": 1, "title": "Timer", "description": "core", "agent_type": "coder"},
                {"id": 2, "title": "Docs", "description": "readme", "agent_type": "writer",
                 "dependencies": [1]}
            ],
            "tech_stack": ["Python"],
            "success_criteria": ["clock counts down"]
        })
    }

    #[tokio::test]
    async fn test_decodes_clean_breakdown() {
        let client = MockClient::new("m").with_json(spec_json());
        let outcome = ProjectManager::run(&client, "chess clock").await.unwrap();
        assert_eq!(outcome.output.tasks.len(), 2);
        assert_eq!(outcome.output.project_name, "Chess Clock");
    }

    #[tokio::test]
    async fn test_unknown_agent_type_becomes_coder() {
        let mut json = spec_json();
        json["tasks"][0]["agent_type"] = serde_json::json!("architect");
        let client = MockClient::new("m").with_json(json);
        let outcome = ProjectManager::run(&client, "chess clock").await.unwrap();
        assert_eq!(outcome.output.tasks[0].agent_type, AgentRole::Coder);
    }

    #[tokio::test]
    async fn test_prose_output_falls_back() {
        let client = MockClient::new("m").with_text("I cannot answer in JSON today.");
        let outcome = ProjectManager::run(&client, "chess clock").await.unwrap();
        // Fallback breakdown: implementation + documentation.
        assert_eq!(outcome.output.tasks.len(), 2);
        assert!(outcome.output.project_name.contains("chess clock"));
    }

    #[tokio::test]
    async fn test_empty_task_list_falls_back() {
        let mut json = spec_json();
        json["tasks"] = serde_json::json!([]);
        let client = MockClient::new("m").with_json(json);
        let outcome = ProjectManager::run(&client, "chess clock").await.unwrap();
        assert_eq!(outcome.output.tasks.len(), 2);
    }

    #[tokio::test]
    async fn test_fenced_breakdown_decodes() {
        let fenced = format!("```json\n{}\n```", spec_json());
        let client = MockClient::new("m").with_text(fenced);
        let outcome = ProjectManager::run(&client, "chess clock").await.unwrap();
        assert_eq!(outcome.output.project_name, "Chess Clock");
    }
}
