//! # Tester (Phase 4)
//!
//! Reviews the integrated project against the success criteria. Transport
//! errors propagate; an unreadable verdict becomes a failed iteration so
//! the refinement loop stays in control.

use anyhow::Context;

use super::AgentOutcome;
use crate::llm::{extract, CompletionRequest, ModelClient};
use crate::project::{IntegrationOutput, ProjectSpec, TestReport};
use crate::prompts;

pub struct Tester;

impl Tester {
    pub async fn run(
        client: &dyn ModelClient,
        spec: &ProjectSpec,
        integration: &IntegrationOutput,
    ) -> anyhow::Result<AgentOutcome<TestReport>> {
        tracing::info!("testing integrated project");

        let request = CompletionRequest::new(prompts::testing(spec, integration))
            .with_system(prompts::TESTER)
            .with_temperature(0.2);

        let completion = client
            .generate(&request)
            .await
            .context("testing call failed")?;

        let report = match extract::from_model_text::<TestReport>(&completion.content) {
            Ok(mut report) => {
                // The prompt forbids both repair paths at once; restart wins
                // when a model sets both anyway.
                if report.needs_phase1_restart && report.needs_phase2_modifications {
                    report.needs_phase2_modifications = false;
                    report.specific_tasks_to_fix.clear();
                }
                report
            }
            Err(e) => {
                tracing::warn!(error = %e, "tester verdict not decodable");
                TestReport::undecodable(&e.to_string())
            }
        };

        tracing::info!(
            status = %report.status,
            errors = report.errors.len(),
            "test verdict received"
        );

        Ok(AgentOutcome {
            output: report,
            model: completion.model,
            latency_ms: completion.latency_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::mock::MockClient;

    #[tokio::test]
    async fn test_pass_verdict() {
        let client = MockClient::new("m").with_json(serde_json::json!({
            "status": "pass",
            "summary": "all good",
        }));
        let spec = ProjectSpec::fallback("x");
        let outcome = Tester::run(&client, &spec, &IntegrationOutput::default())
            .await
            .unwrap();
        assert!(outcome.output.passed());
    }

    #[tokio::test]
    async fn test_conflicting_repair_paths_prefer_restart() {
        let client = MockClient::new("m").with_json(serde_json::json!({
            "status": "fail",
            "errors": ["plan is wrong"],
            "needs_phase1_restart": true,
            "needs_phase2_modifications": true,
            "specific_tasks_to_fix": [1, 2],
        }));
        let spec = ProjectSpec::fallback("x");
        let outcome = Tester::run(&client, &spec, &IntegrationOutput::default())
            .await
            .unwrap();
        assert!(outcome.output.needs_phase1_restart);
        assert!(!outcome.output.needs_phase2_modifications);
        assert!(outcome.output.specific_tasks_to_fix.is_empty());
    }

    #[tokio::test]
    async fn test_unreadable_verdict_is_failed_iteration() {
        let client = MockClient::new("m").with_text("looks fine to me!");
        let spec = ProjectSpec::fallback("x");
        let outcome = Tester::run(&client, &spec, &IntegrationOutput::default())
            .await
            .unwrap();
        assert!(!outcome.output.passed());
        assert!(!outcome.output.needs_phase1_restart);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let client = MockClient::new("dead").always_failing();
        let spec = ProjectSpec::fallback("x");
        let err = Tester::run(&client, &spec, &IntegrationOutput::default()).await;
        assert!(err.is_err());
    }
}
