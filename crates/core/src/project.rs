//! # Project Domain Types
//!
//! The data that flows through the four-phase pipeline: the user's brief,
//! the Phase-1 task breakdown, specialist results, the integrated project,
//! and the tester's verdict.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The user-supplied project description. Immutable once a run starts;
/// refinement rounds derive augmented briefs instead of mutating this.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectBrief {
    pub description: String,
    pub submitted_at: DateTime<Utc>,
}

impl ProjectBrief {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            submitted_at: Utc::now(),
        }
    }
}

/// Specialist roles that can own an [`AgentTask`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum AgentRole {
    Coder,
    Designer,
    Researcher,
    Writer,
}

impl AgentRole {
    /// Slug used for per-role model configuration and event attribution.
    pub fn slug(&self) -> &'static str {
        match self {
            AgentRole::Coder => "coder",
            AgentRole::Designer => "designer",
            AgentRole::Researcher => "researcher",
            AgentRole::Writer => "writer",
        }
    }

    /// Parse a role string, defaulting unknown values to `Coder`.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "designer" => AgentRole::Designer,
            "researcher" => AgentRole::Researcher,
            "writer" => AgentRole::Writer,
            _ => AgentRole::Coder,
        }
    }

    pub fn all() -> [AgentRole; 4] {
        [
            AgentRole::Coder,
            AgentRole::Designer,
            AgentRole::Researcher,
            AgentRole::Writer,
        ]
    }
}

/// Task priority as assigned by the project manager.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

/// A unit of specialist work produced by Phase 1.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AgentTask {
    pub id: u32,
    pub title: String,
    pub description: String,
    pub agent_type: AgentRole,
    #[serde(default)]
    pub priority: Priority,
    /// Ids of tasks that must complete before this one starts.
    #[serde(default)]
    pub dependencies: Vec<u32>,
    #[serde(default)]
    pub expected_output: String,
}

/// Phase-1 output: the full task breakdown for a project.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ProjectSpec {
    pub project_name: String,
    pub description: String,
    pub tasks: Vec<AgentTask>,
    #[serde(default)]
    pub tech_stack: Vec<String>,
    #[serde(default)]
    pub success_criteria: Vec<String>,
    #[serde(default)]
    pub constraints: Vec<String>,
}

impl ProjectSpec {
    pub fn task(&self, id: u32) -> Option<&AgentTask> {
        self.tasks.iter().find(|t| t.id == id)
    }

    /// Minimal two-task breakdown used when the model's analysis cannot be
    /// decoded: one implementation task and one documentation task.
    pub fn fallback(brief: &str) -> Self {
        let preview: String = brief.chars().take(50).collect();
        Self {
            project_name: format!("Project from: {preview}"),
            description: brief.to_string(),
            tasks: vec![
                AgentTask {
                    id: 1,
                    title: "Create main implementation".to_string(),
                    description: brief.to_string(),
                    agent_type: AgentRole::Coder,
                    priority: Priority::High,
                    dependencies: vec![],
                    expected_output: "Main code implementation".to_string(),
                },
                AgentTask {
                    id: 2,
                    title: "Create documentation".to_string(),
                    description: "Document the project".to_string(),
                    agent_type: AgentRole::Writer,
                    priority: Priority::Medium,
                    dependencies: vec![1],
                    expected_output: "Project documentation".to_string(),
                },
            ],
            tech_stack: vec!["Python".to_string()],
            success_criteria: vec!["Working implementation".to_string()],
            constraints: vec![],
        }
    }
}

/// Outcome status of a task or phase.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// One specialist's outcome for one task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: u32,
    pub agent: AgentRole,
    pub status: TaskStatus,
    pub output: serde_json::Value,
    pub model_used: String,
}

impl TaskResult {
    pub fn succeeded(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

/// A phase's record for reporting and persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseResult {
    /// Phase label ("analysis", "specialists", "integration", "testing").
    pub phase: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub model_used: Option<String>,
    #[serde(default)]
    pub latency_ms: Option<u64>,
    pub data: serde_json::Value,
    pub completed_at: DateTime<Utc>,
}

impl PhaseResult {
    pub fn new(phase: &str, status: TaskStatus, data: serde_json::Value) -> Self {
        Self {
            phase: phase.to_string(),
            status,
            model_used: None,
            latency_ms: None,
            data,
            completed_at: Utc::now(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model_used = Some(model.into());
        self
    }

    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }
}

/// Phase-3 output: the merged project ready for testing and writing out.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Default)]
pub struct IntegrationOutput {
    /// Contents of the project entrypoint.
    #[serde(default)]
    pub main_file: Option<String>,
    /// Entrypoint file name; defaults to `main.py` when absent.
    #[serde(default)]
    pub entry_point: Option<String>,
    /// README contents.
    #[serde(default)]
    pub documentation: Option<String>,
    /// Package names for the dependency manifest.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Additional files: relative path -> contents.
    #[serde(default)]
    pub project_structure: BTreeMap<String, String>,
    /// How to build and run the generated project.
    #[serde(default)]
    pub build_commands: Vec<String>,
}

/// Phase-4 verdict from the tester agent.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TestReport {
    /// "pass" or "fail".
    pub status: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub needs_phase1_restart: bool,
    #[serde(default)]
    pub needs_phase2_modifications: bool,
    #[serde(default)]
    pub specific_tasks_to_fix: Vec<u32>,
    #[serde(default)]
    pub summary: String,
}

impl TestReport {
    pub fn passed(&self) -> bool {
        self.status == "pass"
    }

    /// Verdict used when the tester's output cannot be decoded: a failed
    /// iteration, never a crash.
    pub fn undecodable(detail: &str) -> Self {
        Self {
            status: "fail".to_string(),
            errors: vec![format!("tester output could not be decoded: {detail}")],
            needs_phase1_restart: false,
            needs_phase2_modifications: false,
            specific_tasks_to_fix: vec![],
            summary: "Unreadable test verdict".to_string(),
        }
    }
}

/// Manifest of the files materialized for a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalProject {
    pub files_created: Vec<String>,
    pub total_files: usize,
    pub project_dir: String,
    pub instructions: Vec<String>,
}

/// Terminal status of a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

/// Everything a caller gets back from a finished run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub project_name: String,
    pub status: RunStatus,
    pub brief: String,
    pub phases: Vec<PhaseResult>,
    pub final_project: Option<FinalProject>,
    pub iterations: u32,
    pub restarts: u32,
    pub finished_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_agent_role_parse_defaults_to_coder() {
        assert_eq!(AgentRole::parse("designer"), AgentRole::Designer);
        assert_eq!(AgentRole::parse("WRITER"), AgentRole::Writer);
        assert_eq!(AgentRole::parse("project_manager"), AgentRole::Coder);
        assert_eq!(AgentRole::parse(""), AgentRole::Coder);
    }

    #[test]
    fn test_fallback_spec_shape() {
        let spec = ProjectSpec::fallback("Build a CLI stopwatch");
        assert_eq!(spec.tasks.len(), 2);
        assert_eq!(spec.tasks[0].agent_type, AgentRole::Coder);
        assert_eq!(spec.tasks[1].dependencies, vec![1]);
        assert!(spec.project_name.contains("Build a CLI stopwatch"));
    }

    #[test]
    fn test_task_deserializes_with_defaults() {
        let task: AgentTask = serde_json::from_str(
            r#"{"id": 3, "title": "T", "description": "D", "agent_type": "researcher"}"#,
        )
        .unwrap();
        assert_eq!(task.agent_type, AgentRole::Researcher);
        assert_eq!(task.priority, Priority::Medium);
        assert!(task.dependencies.is_empty());
    }

    #[test]
    fn test_test_report_pass() {
        let report: TestReport =
            serde_json::from_str(r#"{"status": "pass", "summary": "ok"}"#).unwrap();
        assert!(report.passed());
        assert!(!report.needs_phase1_restart);
    }

    #[test]
    fn test_integration_output_roundtrip() {
        let json = r##"{
            "main_file": "print('hi')",
            "dependencies": ["requests"],
            "project_structure": {"utils.py": "# helpers"},
            "build_commands": ["python main.py"]
        }"##;
        let out: IntegrationOutput = serde_json::from_str(json).unwrap();
        assert_eq!(out.dependencies, vec!["requests"]);
        assert!(out.entry_point.is_none());
        assert_eq!(out.project_structure["utils.py"], "# helpers");
    }
}
