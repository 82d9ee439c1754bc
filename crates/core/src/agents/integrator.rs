//! # Integrator (Phase 3)
//!
//! Merges specialist results into one project. When the model's merge
//! cannot be decoded, a deterministic local merge assembles the project
//! from the raw results instead: coder output wins for code, writer output
//! for documentation.

use anyhow::Context;

use super::AgentOutcome;
use crate::llm::{extract, CompletionRequest, ModelClient};
use crate::project::{AgentRole, IntegrationOutput, ProjectSpec, TaskResult};
use crate::prompts;

pub struct Integrator;

impl Integrator {
    pub async fn run(
        client: &dyn ModelClient,
        spec: &ProjectSpec,
        results: &[TaskResult],
    ) -> anyhow::Result<AgentOutcome<IntegrationOutput>> {
        tracing::info!(results = results.len(), "integrating specialist results");

        let request = CompletionRequest::new(prompts::integration(spec, results))
            .with_system(prompts::INTEGRATOR)
            .with_max_output_tokens(4096);

        let completion = client
            .generate(&request)
            .await
            .context("integration call failed")?;

        let output = match extract::from_model_text::<IntegrationOutput>(&completion.content) {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(error = %e, "integration output not decodable, merging locally");
                assemble_from_results(results)
            }
        };

        Ok(AgentOutcome {
            output,
            model: completion.model,
            latency_ms: completion.latency_ms,
        })
    }
}

/// Deterministic merge of raw specialist results.
pub fn assemble_from_results(results: &[TaskResult]) -> IntegrationOutput {
    let mut output = IntegrationOutput::default();

    for result in results.iter().filter(|r| r.succeeded()) {
        match result.agent {
            AgentRole::Coder => {
                let code = result.output["code"].as_str().unwrap_or_default();
                if output.main_file.is_none() && !code.is_empty() {
                    output.main_file = Some(code.to_string());
                    if let Some(name) = result.output["file_name"].as_str() {
                        if !name.is_empty() {
                            output.entry_point = Some(name.to_string());
                        }
                    }
                    if let Some(instructions) = result.output["instructions"].as_str() {
                        if !instructions.is_empty() {
                            output.build_commands.push(instructions.to_string());
                        }
                    }
                } else if !code.is_empty() {
                    // Later coder tasks become auxiliary modules.
                    let name = result.output["file_name"]
                        .as_str()
                        .filter(|n| !n.is_empty())
                        .map(|n| n.to_string())
                        .unwrap_or_else(|| format!("task_{}.py", result.task_id));
                    output.project_structure.insert(name, code.to_string());
                }

                if let Some(deps) = result.output["dependencies"].as_array() {
                    for dep in deps.iter().filter_map(|d| d.as_str()) {
                        if !output.dependencies.iter().any(|existing| existing == dep) {
                            output.dependencies.push(dep.to_string());
                        }
                    }
                }
            }
            AgentRole::Writer => {
                if output.documentation.is_none() {
                    let content = result.output["content"].as_str().unwrap_or_default();
                    if !content.is_empty() {
                        output.documentation = Some(content.to_string());
                    }
                }
            }
            AgentRole::Designer | AgentRole::Researcher => {
                let body = result.output["design"]
                    .as_str()
                    .or_else(|| result.output["findings"].as_str())
                    .unwrap_or_default();
                if !body.is_empty() {
                    let name = format!("notes/task_{}.md", result.task_id);
                    output.project_structure.insert(name, body.to_string());
                }
            }
        }
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockClient;
    use crate::project::TaskStatus;

    fn coder_result(id: u32, code: &str) -> TaskResult {
        TaskResult {
            task_id: id,
            agent: AgentRole::Coder,
            status: TaskStatus::Completed,
            output: serde_json::json!({
                "code": code,
                "file_name": format!("mod{id}.py"),
                "dependencies": ["requests"],
                "instructions": "python mod1.py",
            }),
            model_used: "mock".to_string(),
        }
    }

    #[tokio::test]
    async fn test_decodes_model_merge() {
        let client = MockClient::new("m").with_json(serde_json::json!({
            "main_file": "print('merged')",
            "entry_point": "app.py",
            "dependencies": ["flask"],
            "build_commands": ["python app.py"],
        }));
        let spec = ProjectSpec::fallback("x");
        let results = vec![coder_result(1, "print('a')")];

        let outcome = Integrator::run(&client, &spec, &results).await.unwrap();
        assert_eq!(outcome.output.main_file.as_deref(), Some("print('merged')"));
        assert_eq!(outcome.output.entry_point.as_deref(), Some("app.py"));
    }

    #[tokio::test]
    async fn test_undecodable_merge_falls_back_to_local_assembly() {
        let client = MockClient::new("m").with_text("no json here");
        let spec = ProjectSpec::fallback("x");
        let results = vec![coder_result(1, "print('a')")];

        let outcome = Integrator::run(&client, &spec, &results).await.unwrap();
        assert_eq!(outcome.output.main_file.as_deref(), Some("print('a')"));
        assert_eq!(outcome.output.entry_point.as_deref(), Some("mod1.py"));
        assert_eq!(outcome.output.dependencies, vec!["requests"]);
    }

    #[test]
    fn test_local_assembly_routes_roles() {
        let results = vec![
            coder_result(1, "print('main')"),
            coder_result(2, "print('extra')"),
            TaskResult {
                task_id: 3,
                agent: AgentRole::Writer,
                status: TaskStatus::Completed,
                output: serde_json::json!({"content": "# Readme"}),
                model_used: "mock".to_string(),
            },
            TaskResult {
                task_id: 4,
                agent: AgentRole::Researcher,
                status: TaskStatus::Completed,
                output: serde_json::json!({"findings": "use sqlite"}),
                model_used: "mock".to_string(),
            },
        ];

        let merged = assemble_from_results(&results);
        assert_eq!(merged.main_file.as_deref(), Some("print('main')"));
        assert_eq!(merged.project_structure["mod2.py"], "print('extra')");
        assert_eq!(merged.documentation.as_deref(), Some("# Readme"));
        assert_eq!(merged.project_structure["notes/task_4.md"], "use sqlite");
        // Dependencies from both coder tasks, deduplicated.
        assert_eq!(merged.dependencies, vec!["requests"]);
    }

    #[test]
    fn test_local_assembly_skips_failed_results() {
        let results = vec![TaskResult {
            task_id: 1,
            agent: AgentRole::Coder,
            status: TaskStatus::Failed,
            output: serde_json::json!({"error": "boom"}),
            model_used: "error".to_string(),
        }];
        let merged = assemble_from_results(&results);
        assert!(merged.main_file.is_none());
        assert!(merged.project_structure.is_empty());
    }
}
