//! # Specialists (Phase 2)
//!
//! The four task-executing roles. A specialist never fails the phase: a
//! transport error yields a `Failed` TaskResult, and output that is not
//! valid JSON is wrapped into the role's fallback shape with the raw text
//! preserved.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::llm::{extract, CompletionRequest, ModelClient};
use crate::project::{AgentRole, AgentTask, ProjectSpec, TaskResult, TaskStatus};
use crate::prompts;

/// Coder deliverable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CoderOutput {
    pub code: String,
    #[serde(default)]
    pub explanation: String,
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub file_name: String,
    #[serde(default)]
    pub instructions: String,
}

/// Designer deliverable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DesignerOutput {
    pub design: String,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub notes: String,
}

/// Researcher deliverable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResearcherOutput {
    pub findings: String,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Writer deliverable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WriterOutput {
    pub content: String,
    #[serde(default)]
    pub format: String,
    #[serde(default)]
    pub sections: Vec<String>,
}

pub struct Specialist;

impl Specialist {
    /// Execute one task. Infallible by design: errors are folded into the
    /// returned result so one dead provider does not sink the whole wave.
    pub async fn execute(
        client: &dyn ModelClient,
        task: &AgentTask,
        spec: &ProjectSpec,
    ) -> TaskResult {
        let role = task.agent_type;
        tracing::info!(task_id = task.id, role = role.slug(), title = %task.title, "executing task");

        let request = CompletionRequest::new(prompts::specialist(task, spec, &schema_for(role)))
            .with_system(prompts::specialist_system(role));

        let completion = match client.generate(&request).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::error!(task_id = task.id, role = role.slug(), error = %e, "task failed");
                return TaskResult {
                    task_id: task.id,
                    agent: role,
                    status: TaskStatus::Failed,
                    output: serde_json::json!({ "error": e.to_string() }),
                    model_used: "error".to_string(),
                };
            }
        };

        let output = decode_output(role, &completion.content);

        TaskResult {
            task_id: task.id,
            agent: role,
            status: TaskStatus::Completed,
            output,
            model_used: completion.model,
        }
    }
}

fn schema_for(role: AgentRole) -> String {
    match role {
        AgentRole::Coder => prompts::schema_hint::<CoderOutput>(),
        AgentRole::Designer => prompts::schema_hint::<DesignerOutput>(),
        AgentRole::Researcher => prompts::schema_hint::<ResearcherOutput>(),
        AgentRole::Writer => prompts::schema_hint::<WriterOutput>(),
    }
}

/// Typed decode with a per-role raw-text fallback.
fn decode_output(role: AgentRole, content: &str) -> serde_json::Value {
    let typed = match role {
        AgentRole::Coder => extract::from_model_text::<CoderOutput>(content)
            .map(|o| serde_json::to_value(o).unwrap_or_default()),
        AgentRole::Designer => extract::from_model_text::<DesignerOutput>(content)
            .map(|o| serde_json::to_value(o).unwrap_or_default()),
        AgentRole::Researcher => extract::from_model_text::<ResearcherOutput>(content)
            .map(|o| serde_json::to_value(o).unwrap_or_default()),
        AgentRole::Writer => extract::from_model_text::<WriterOutput>(content)
            .map(|o| serde_json::to_value(o).unwrap_or_default()),
    };

    match typed {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(role = role.slug(), "specialist output not JSON, wrapping raw text");
            fallback_output(role, content)
        }
    }
}

fn fallback_output(role: AgentRole, raw: &str) -> serde_json::Value {
    match role {
        AgentRole::Coder => serde_json::json!({
            "code": raw,
            "explanation": "Generated code",
            "dependencies": [],
            "file_name": "main.py",
            "instructions": "Run: python main.py",
        }),
        AgentRole::Designer => serde_json::json!({
            "design": raw,
            "components": [],
            "notes": "Raw design notes",
        }),
        AgentRole::Researcher => serde_json::json!({
            "findings": raw,
            "recommendations": [],
            "sources": [],
        }),
        AgentRole::Writer => serde_json::json!({
            "content": raw,
            "format": "markdown",
            "sections": [],
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockClient;

    fn sample_task(role: AgentRole) -> AgentTask {
        AgentTask {
            id: 1,
            title: "Task".to_string(),
            description: "Do the thing".to_string(),
            agent_type: role,
            priority: Default::default(),
            dependencies: vec![],
            expected_output: "the thing".to_string(),
        }
    }

    #[tokio::test]
    async fn test_coder_typed_output() {
        let client = MockClient::new("m").with_json(serde_json::json!({
            "code": "print('hi')",
            "file_name": "hello.py",
            "dependencies": [],
        }));
        let spec = ProjectSpec::fallback("x");
        let result = Specialist::execute(&client, &sample_task(AgentRole::Coder), &spec).await;
        assert_eq!(result.status, TaskStatus::Completed);
        assert_eq!(result.output["code"], "print('hi')");
        assert_eq!(result.output["file_name"], "hello.py");
    }

    #[tokio::test]
    async fn test_coder_raw_text_wrapped() {
        let client = MockClient::new("m").with_text("def main():\n    pass");
        let spec = ProjectSpec::fallback("x");
        let result = Specialist::execute(&client, &sample_task(AgentRole::Coder), &spec).await;
        assert_eq!(result.status, TaskStatus::Completed);
        assert!(result.output["code"]
            .as_str()
            .unwrap()
            .contains("def main()"));
        assert_eq!(result.output["file_name"], "main.py");
    }

    #[tokio::test]
    async fn test_provider_error_yields_failed_result() {
        let client = MockClient::new("dead").always_failing();
        let spec = ProjectSpec::fallback("x");
        let result = Specialist::execute(&client, &sample_task(AgentRole::Writer), &spec).await;
        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.model_used, "error");
        assert!(result.output["error"].is_string());
    }

    #[tokio::test]
    async fn test_writer_raw_text_wrapped_as_markdown() {
        let client = MockClient::new("m").with_text("# Title\nBody");
        let spec = ProjectSpec::fallback("x");
        let result = Specialist::execute(&client, &sample_task(AgentRole::Writer), &spec).await;
        assert_eq!(result.output["format"], "markdown");
        assert!(result.output["content"].as_str().unwrap().contains("# Title"));
    }
}
