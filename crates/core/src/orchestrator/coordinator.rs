//! # Pipeline Orchestrator
//!
//! Drives a brief through the four phases: analysis, specialist dispatch,
//! integration, and the bounded testing/refinement loop. Specialist tasks
//! run in dependency-aware waves with configurable concurrency.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;

use crate::agents::{Integrator, ProjectManager, Specialist, Tester};
use crate::artifacts::ArtifactWriter;
use crate::llm::{FallbackClient, ModelClient};
use crate::models::{LlmProvider, ModelConfig};
use crate::project::{
    AgentTask, PhaseResult, ProjectBrief, ProjectSpec, RunReport, RunStatus, TaskResult,
    TaskStatus,
};
use crate::prompts;
use crate::store::{self, RunManager, SymphonyDb};

use super::events::{PipelineEvent, PipelineEventKind};
use super::pipeline::{Pipeline, PipelineStage};

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Global provider (default: Gemini)
    #[serde(default)]
    pub global_provider: LlmProvider,
    /// Global model override for all roles
    pub global_model: Option<String>,
    /// Base URL override (for OpenAI-compatible endpoints)
    pub base_url: Option<String>,
    /// Per-role provider overrides (role slug -> provider)
    #[serde(default)]
    pub per_role_providers: HashMap<String, LlmProvider>,
    /// Per-role model overrides (role slug -> model name)
    #[serde(default)]
    pub per_role_models: HashMap<String, String>,
    /// Maximum refinement iterations per pass
    pub max_iterations: u32,
    /// Maximum full restarts from Phase 1
    pub max_restarts: u32,
    /// Maximum concurrent specialist tasks
    pub max_concurrent_tasks: usize,
    /// Directory generated projects are written under
    pub output_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            global_provider: LlmProvider::Gemini,
            global_model: None,
            base_url: None,
            per_role_providers: HashMap::new(),
            per_role_models: HashMap::new(),
            max_iterations: 3,
            max_restarts: 1,
            max_concurrent_tasks: 3,
            output_dir: PathBuf::from("generated_projects"),
        }
    }
}

impl OrchestratorConfig {
    /// Model config for a specific role: per-role override, then global,
    /// then the provider default.
    pub fn model_config(&self, role: &str) -> ModelConfig {
        let provider = self
            .per_role_providers
            .get(role)
            .cloned()
            .unwrap_or_else(|| self.global_provider.clone());

        let model = self
            .per_role_models
            .get(role)
            .or(self.global_model.as_ref())
            .cloned()
            .unwrap_or_else(|| provider.default_model().to_string());

        let base_url = if provider.supports_base_url() {
            self.base_url.clone()
        } else {
            None
        };

        ModelConfig {
            provider,
            model,
            base_url,
        }
    }
}

/// Outcome of one full pass through the phases.
enum PassOutcome {
    Finished(RunReport),
    Restart { errors: Vec<String> },
}

/// The pipeline orchestrator
pub struct Orchestrator {
    config: OrchestratorConfig,
    pipeline: Pipeline,
    events: Vec<PipelineEvent>,
    event_tx: Option<mpsc::Sender<PipelineEvent>>,
    client_overrides: HashMap<String, Arc<dyn ModelClient>>,
    artifacts: ArtifactWriter,
    db: Option<Arc<SymphonyDb>>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig) -> Self {
        let pipeline = Pipeline::new(config.max_iterations, config.max_restarts);
        let artifacts = ArtifactWriter::new(config.output_dir.clone());
        Self {
            config,
            pipeline,
            events: Vec::new(),
            event_tx: None,
            client_overrides: HashMap::new(),
            artifacts,
            db: None,
        }
    }

    /// Set event channel for streaming events
    pub fn with_event_channel(mut self, tx: mpsc::Sender<PipelineEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Persist runs and phase results to the given database
    pub fn with_store(mut self, db: Arc<SymphonyDb>) -> Self {
        self.db = Some(db);
        self
    }

    /// Pin a role to a specific client instead of building one from config.
    /// The role `"*"` applies to every role without its own override.
    pub fn with_client(mut self, role: &str, client: Arc<dyn ModelClient>) -> Self {
        self.client_overrides.insert(role.to_string(), client);
        self
    }

    /// Events accumulated so far (spawned task events go to the channel only).
    pub fn events(&self) -> &[PipelineEvent] {
        &self.events
    }

    fn client_for(&self, role: &str) -> Result<Arc<dyn ModelClient>> {
        if let Some(client) = self.client_overrides.get(role) {
            return Ok(Arc::clone(client));
        }
        if let Some(client) = self.client_overrides.get("*") {
            return Ok(Arc::clone(client));
        }
        let config = self.config.model_config(role);
        let chain = FallbackClient::from_env(&config)
            .with_context(|| format!("building client chain for role {role}"))?;
        Ok(Arc::new(chain))
    }

    /// Emit an event
    async fn emit(&mut self, event: PipelineEvent) {
        self.events.push(event.clone());
        if let Some(tx) = &self.event_tx {
            let _ = tx.send(event).await;
        }
    }

    /// Run a brief through the whole pipeline.
    ///
    /// Refinement happens inside a pass; a `needs_phase1_restart` verdict
    /// within the restart budget starts a fresh pass with the brief
    /// augmented by the tester's findings.
    #[tracing::instrument(skip(self, brief), fields(brief_preview = %brief.chars().take(50).collect::<String>()))]
    pub async fn run(&mut self, brief: &str) -> Result<RunReport> {
        let run_id = store::generate_run_id();
        self.run_with_id(&run_id, brief).await
    }

    /// Like [`run`](Self::run) with a caller-supplied run id, so an API
    /// surface can hand the id out before the work finishes.
    pub async fn run_with_id(&mut self, run_id: &str, brief: &str) -> Result<RunReport> {
        if let Some(db) = &self.db {
            RunManager::new(db).create(run_id, &ProjectBrief::new(brief))?;
        }

        self.emit(PipelineEvent::new(
            PipelineEventKind::PipelineStarted,
            "orchestrator",
        ))
        .await;

        let mut current_brief = brief.to_string();
        loop {
            match self.execute_pass(run_id, brief, &current_brief).await? {
                PassOutcome::Finished(report) => {
                    self.emit(PipelineEvent::new(
                        if report.status == RunStatus::Success {
                            PipelineEventKind::PipelineCompleted
                        } else {
                            PipelineEventKind::PipelineFailed
                        },
                        "orchestrator",
                    ))
                    .await;
                    return Ok(report);
                }
                PassOutcome::Restart { errors } => {
                    self.emit(
                        PipelineEvent::new(PipelineEventKind::PipelineRestarted, "orchestrator")
                            .with_data(serde_json::json!({ "errors": errors })),
                    )
                    .await;
                    current_brief = prompts::augment_brief(brief, &errors);
                }
            }
        }
    }

    async fn execute_pass(
        &mut self,
        run_id: &str,
        original_brief: &str,
        brief: &str,
    ) -> Result<PassOutcome> {
        let mut phases: Vec<PhaseResult> = Vec::new();

        // === Phase 1: Analysis ===
        self.phase_started(PipelineStage::Analysis).await;
        self.emit(PipelineEvent::new(
            PipelineEventKind::AgentStarted,
            "project_manager",
        ))
        .await;

        let client = self.client_for("project_manager")?;
        let analysis = match ProjectManager::run(client.as_ref(), brief).await {
            Ok(analysis) => analysis,
            Err(e) => return self.abort_run(run_id, "project_manager", e).await,
        };
        let spec = analysis.output;

        self.emit(
            PipelineEvent::new(PipelineEventKind::AgentCompleted, "project_manager")
                .with_data(serde_json::json!({ "tasks": spec.tasks.len() })),
        )
        .await;

        self.record_phase(
            run_id,
            &mut phases,
            PhaseResult::new(
                "analysis",
                TaskStatus::Completed,
                serde_json::to_value(&spec)?,
            )
            .with_model(analysis.model)
            .with_latency(analysis.latency_ms),
        )
        .await;
        self.pipeline.advance();

        // === Phase 2: Specialists ===
        self.phase_started(PipelineStage::Specialists).await;

        let mut results = self.dispatch_specialists(&spec).await?;

        let specialists_status = if results.iter().any(|r| r.succeeded()) {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        self.record_phase(
            run_id,
            &mut phases,
            PhaseResult::new(
                "specialists",
                specialists_status,
                serde_json::to_value(&results)?,
            ),
        )
        .await;
        self.pipeline.advance();

        // === Phase 3: Integration ===
        self.phase_started(PipelineStage::Integration).await;
        self.emit(PipelineEvent::new(
            PipelineEventKind::AgentStarted,
            "integrator",
        ))
        .await;

        let client = self.client_for("integrator")?;
        let merged = match Integrator::run(client.as_ref(), &spec, &results).await {
            Ok(merged) => merged,
            Err(e) => return self.abort_run(run_id, "integrator", e).await,
        };
        let mut integration = merged.output;

        self.emit(PipelineEvent::new(
            PipelineEventKind::AgentCompleted,
            "integrator",
        ))
        .await;
        self.record_phase(
            run_id,
            &mut phases,
            PhaseResult::new(
                "integration",
                TaskStatus::Completed,
                serde_json::to_value(&integration)?,
            )
            .with_model(merged.model)
            .with_latency(merged.latency_ms),
        )
        .await;
        self.pipeline.advance();

        // === Phase 4: Testing and refinement ===
        self.phase_started(PipelineStage::Testing).await;

        let mut status = RunStatus::Failed;
        loop {
            if !self.pipeline.begin_iteration() {
                tracing::warn!(
                    max_iterations = self.pipeline.max_iterations,
                    "refinement budget exhausted"
                );
                break;
            }

            self.emit(
                PipelineEvent::new(PipelineEventKind::RefinementIteration, "tester").with_data(
                    serde_json::json!({
                        "iteration": self.pipeline.iterations,
                        "max": self.pipeline.max_iterations,
                    }),
                ),
            )
            .await;

            let client = self.client_for("tester")?;
            let verdict = match Tester::run(client.as_ref(), &spec, &integration).await {
                Ok(verdict) => verdict,
                Err(e) => return self.abort_run(run_id, "tester", e).await,
            };
            let report = verdict.output;

            self.record_phase(
                run_id,
                &mut phases,
                PhaseResult::new(
                    "testing",
                    if report.passed() {
                        TaskStatus::Completed
                    } else {
                        TaskStatus::Failed
                    },
                    serde_json::to_value(&report)?,
                )
                .with_model(verdict.model)
                .with_latency(verdict.latency_ms),
            )
            .await;

            if report.passed() {
                tracing::info!(
                    iteration = self.pipeline.iterations,
                    "project passed QA"
                );
                status = RunStatus::Success;
                break;
            }

            if report.needs_phase1_restart {
                if self.pipeline.begin_restart() {
                    tracing::info!("restarting from Phase 1 with augmented brief");
                    return Ok(PassOutcome::Restart {
                        errors: report.errors,
                    });
                }
                tracing::warn!("restart requested but budget exhausted, continuing refinement");
            } else if report.needs_phase2_modifications {
                self.rerun_tasks(&spec, &mut results, &report.specific_tasks_to_fix)
                    .await;

                let client = self.client_for("integrator")?;
                let merged = match Integrator::run(client.as_ref(), &spec, &results).await {
                    Ok(merged) => merged,
                    Err(e) => return self.abort_run(run_id, "integrator", e).await,
                };
                integration = merged.output;

                self.record_phase(
                    run_id,
                    &mut phases,
                    PhaseResult::new(
                        "integration",
                        TaskStatus::Completed,
                        serde_json::to_value(&integration)?,
                    )
                    .with_model(merged.model)
                    .with_latency(merged.latency_ms),
                )
                .await;
            }
            // A plain fail with no repair path re-tests on the next
            // iteration until the budget runs out.
        }

        if status == RunStatus::Success {
            self.pipeline.advance();
        } else {
            self.pipeline.fail();
        }

        // === Final artifacts ===
        let final_project = match self.artifacts.write_final(run_id, &integration) {
            Ok(final_project) => Some(final_project),
            Err(e) => {
                tracing::warn!(error = %e, "failed to write final project files");
                None
            }
        };

        let report = RunReport {
            run_id: run_id.to_string(),
            project_name: spec.project_name.clone(),
            status,
            brief: original_brief.to_string(),
            phases,
            final_project,
            iterations: self.pipeline.iterations,
            restarts: self.pipeline.restarts,
            finished_at: chrono::Utc::now(),
        };

        if let Some(db) = &self.db {
            RunManager::new(db).finish(run_id, &report)?;
        }

        Ok(PassOutcome::Finished(report))
    }

    /// Run specialist tasks in dependency-aware waves.
    ///
    /// A wave holds every task whose known dependencies have finished;
    /// waves run concurrently under the semaphore. Unknown dependency ids
    /// are treated as satisfied, and a fully cyclic remainder is scheduled
    /// anyway - both surface as `DependencyWarning` events.
    async fn dispatch_specialists(&mut self, spec: &ProjectSpec) -> Result<Vec<TaskResult>> {
        let total = spec.tasks.len();
        let known: HashSet<u32> = spec.tasks.iter().map(|t| t.id).collect();

        for task in &spec.tasks {
            let unknown: Vec<u32> = task
                .dependencies
                .iter()
                .copied()
                .filter(|d| !known.contains(d))
                .collect();
            if !unknown.is_empty() {
                self.emit(
                    PipelineEvent::new(PipelineEventKind::DependencyWarning, "orchestrator")
                        .with_task(task.id)
                        .with_data(serde_json::json!({ "unknown_dependencies": unknown })),
                )
                .await;
            }
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_tasks.max(1)));
        let progress = Arc::new(AtomicUsize::new(0));
        let shared_spec = Arc::new(spec.clone());

        let mut remaining: Vec<AgentTask> = spec.tasks.clone();
        let mut completed: HashSet<u32> = HashSet::new();
        let mut results: HashMap<u32, TaskResult> = HashMap::new();

        while !remaining.is_empty() {
            let (ready, blocked): (Vec<AgentTask>, Vec<AgentTask>) =
                remaining.into_iter().partition(|t| {
                    t.dependencies
                        .iter()
                        .all(|d| completed.contains(d) || !known.contains(d))
                });

            let wave = if ready.is_empty() {
                // Every remaining task waits on another: a cycle.
                self.emit(
                    PipelineEvent::new(PipelineEventKind::DependencyWarning, "orchestrator")
                        .with_data(serde_json::json!({
                            "cycle": blocked.iter().map(|t| t.id).collect::<Vec<_>>(),
                        })),
                )
                .await;
                remaining = Vec::new();
                blocked
            } else {
                remaining = blocked;
                ready
            };

            let mut join_set = JoinSet::new();
            for task in wave {
                let permit = semaphore
                    .clone()
                    .acquire_owned()
                    .await
                    .context("task semaphore closed")?;
                let client = self.client_for(task.agent_type.slug())?;
                let task_spec = Arc::clone(&shared_spec);
                let tx = self.event_tx.clone();
                let progress = Arc::clone(&progress);

                join_set.spawn(async move {
                    let _permit = permit;
                    let role = task.agent_type.slug();

                    if let Some(tx) = &tx {
                        let _ = tx
                            .send(
                                PipelineEvent::new(PipelineEventKind::AgentStarted, role)
                                    .with_task(task.id),
                            )
                            .await;
                    }

                    let result = Specialist::execute(client.as_ref(), &task, &task_spec).await;

                    let done = progress.fetch_add(1, Ordering::SeqCst) + 1;
                    if let Some(tx) = &tx {
                        let kind = if result.succeeded() {
                            PipelineEventKind::AgentCompleted
                        } else {
                            PipelineEventKind::AgentFailed
                        };
                        let _ = tx.send(PipelineEvent::new(kind, role).with_task(task.id)).await;
                        let _ = tx
                            .send(
                                PipelineEvent::new(PipelineEventKind::TaskProgress, role)
                                    .with_task(task.id)
                                    .with_data(serde_json::json!({
                                        "completed": done,
                                        "total": total,
                                    })),
                            )
                            .await;
                    }

                    result
                });
            }

            while let Some(joined) = join_set.join_next().await {
                match joined {
                    Ok(result) => {
                        completed.insert(result.task_id);
                        results.insert(result.task_id, result);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "specialist task panicked");
                    }
                }
            }
        }

        // Results in spec order, panicked tasks omitted.
        Ok(spec
            .tasks
            .iter()
            .filter_map(|t| results.remove(&t.id))
            .collect())
    }

    /// Re-execute the tasks a failed test round singled out. Ids that match
    /// no known task are skipped.
    async fn rerun_tasks(
        &mut self,
        spec: &ProjectSpec,
        results: &mut Vec<TaskResult>,
        task_ids: &[u32],
    ) {
        for id in task_ids {
            let Some(task) = spec.task(*id) else {
                tracing::warn!(task_id = *id, "tester referenced unknown task, skipping");
                continue;
            };

            self.emit(
                PipelineEvent::new(PipelineEventKind::TaskRetried, task.agent_type.slug())
                    .with_task(task.id),
            )
            .await;

            let client = match self.client_for(task.agent_type.slug()) {
                Ok(client) => client,
                Err(e) => {
                    tracing::error!(task_id = *id, error = %e, "no client for task re-run");
                    continue;
                }
            };

            let new_result = Specialist::execute(client.as_ref(), task, spec).await;
            match results.iter_mut().find(|r| r.task_id == *id) {
                Some(slot) => *slot = new_result,
                None => results.push(new_result),
            }
        }
    }

    async fn phase_started(&mut self, stage: PipelineStage) {
        self.emit(
            PipelineEvent::new(PipelineEventKind::PhaseStarted, "orchestrator")
                .with_data(serde_json::json!({ "phase": stage.label() })),
        )
        .await;
    }

    async fn record_phase(
        &mut self,
        run_id: &str,
        phases: &mut Vec<PhaseResult>,
        result: PhaseResult,
    ) {
        if let Some(db) = &self.db {
            if let Err(e) = RunManager::new(db).add_phase_result(run_id, phases.len(), &result) {
                tracing::warn!(error = %e, phase = %result.phase, "failed to persist phase result");
            }
        }

        if let Err(e) =
            self.artifacts
                .write_phase_snapshot(run_id, phases.len(), &result.phase, &result.data)
        {
            tracing::warn!(error = %e, phase = %result.phase, "failed to write phase snapshot");
        }

        self.emit(
            PipelineEvent::new(PipelineEventKind::PhaseCompleted, "orchestrator").with_data(
                serde_json::json!({ "phase": result.phase, "status": result.status }),
            ),
        )
        .await;

        phases.push(result);
    }

    async fn abort_run<T>(
        &mut self,
        run_id: &str,
        agent: &str,
        error: anyhow::Error,
    ) -> Result<T> {
        self.emit(
            PipelineEvent::new(PipelineEventKind::AgentFailed, agent)
                .with_data(serde_json::json!({ "error": error.to_string() })),
        )
        .await;
        self.emit(PipelineEvent::new(
            PipelineEventKind::PipelineFailed,
            "orchestrator",
        ))
        .await;

        self.pipeline.fail();

        if let Some(db) = &self.db {
            if let Err(e) = RunManager::new(db).set_status(run_id, RunStatus::Failed) {
                tracing::warn!(error = %e, "failed to mark run as failed");
            }
        }

        Err(error.context(format!("{agent} failed")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.max_restarts, 1);
        assert_eq!(config.max_concurrent_tasks, 3);
        assert_eq!(config.global_provider, LlmProvider::Gemini);
    }

    #[test]
    fn test_model_config_override_precedence() {
        let mut config = OrchestratorConfig {
            global_model: Some("global-model".to_string()),
            ..Default::default()
        };
        config
            .per_role_models
            .insert("coder".to_string(), "coder-model".to_string());
        config
            .per_role_providers
            .insert("tester".to_string(), LlmProvider::HuggingFace);

        assert_eq!(config.model_config("coder").model, "coder-model");
        assert_eq!(config.model_config("writer").model, "global-model");
        assert_eq!(
            config.model_config("tester").provider,
            LlmProvider::HuggingFace
        );
    }

    #[test]
    fn test_base_url_only_for_compatible_provider() {
        let config = OrchestratorConfig {
            base_url: Some("http://localhost:1/v1".to_string()),
            ..Default::default()
        };
        // Gemini ignores base_url.
        assert!(config.model_config("coder").base_url.is_none());

        let mut config = config;
        config
            .per_role_providers
            .insert("coder".to_string(), LlmProvider::OpenAiCompatible);
        assert_eq!(
            config.model_config("coder").base_url.as_deref(),
            Some("http://localhost:1/v1")
        );
    }
}
