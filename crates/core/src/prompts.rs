//! Default prompt templates bundled at compile time, plus the render
//! functions that compose per-phase user prompts from the brief, the task
//! breakdown, and prior-phase outputs.
//!
//! Structured prompts embed the JSON schema of the expected output type so
//! providers without native structured output still see the contract.

use schemars::JsonSchema;

use crate::project::{AgentRole, AgentTask, IntegrationOutput, ProjectSpec, TaskResult};

/// Project Manager - breaks a brief into specialist tasks
pub const PROJECT_MANAGER: &str = include_str!("prompts/defaults/project_manager.md");

/// Coder - writes code
pub const CODER: &str = include_str!("prompts/defaults/coder.md");

/// Designer - produces interface and structure designs
pub const DESIGNER: &str = include_str!("prompts/defaults/designer.md");

/// Researcher - gathers background and recommendations
pub const RESEARCHER: &str = include_str!("prompts/defaults/researcher.md");

/// Writer - produces documentation
pub const WRITER: &str = include_str!("prompts/defaults/writer.md");

/// Integrator - merges specialist outputs into one project
pub const INTEGRATOR: &str = include_str!("prompts/defaults/integrator.md");

/// Tester - reviews the integrated project and issues a verdict
pub const TESTER: &str = include_str!("prompts/defaults/tester.md");

/// All default prompts with their role slugs.
pub fn all_defaults() -> Vec<(&'static str, &'static str)> {
    vec![
        ("project_manager", PROJECT_MANAGER),
        ("coder", CODER),
        ("designer", DESIGNER),
        ("researcher", RESEARCHER),
        ("writer", WRITER),
        ("integrator", INTEGRATOR),
        ("tester", TESTER),
    ]
}

/// System prompt for a role slug.
pub fn system_for(slug: &str) -> Option<&'static str> {
    all_defaults()
        .into_iter()
        .find(|(s, _)| *s == slug)
        .map(|(_, text)| text)
}

/// Pretty-printed JSON schema for an output type, for embedding in prompts.
pub fn schema_hint<T: JsonSchema>() -> String {
    let schema = schemars::schema_for!(T);
    serde_json::to_string_pretty(&schema).unwrap_or_else(|_| "{}".to_string())
}

/// Phase-1 user prompt: the brief plus the expected breakdown shape.
pub fn analysis(brief: &str) -> String {
    format!(
        "Analyze this project request and break it into specialist tasks.\n\n\
         PROJECT REQUEST:\n{brief}\n\n\
         Respond with a single JSON object matching this schema:\n{}\n\n\
         Assign each task an agent_type of coder, designer, researcher or writer, \
         give tasks numeric ids starting at 1, and list dependencies by id.",
        schema_hint::<ProjectSpec>()
    )
}

/// Phase-2 user prompt for one specialist task.
pub fn specialist(task: &AgentTask, spec: &ProjectSpec, schema: &str) -> String {
    format!(
        "PROJECT: {}\nTECH STACK: {}\nCONSTRAINTS: {}\n\n\
         TASK #{} - {}\n{}\n\nEXPECTED OUTPUT: {}\n\n\
         Respond with a single JSON object matching this schema:\n{schema}",
        spec.project_name,
        join_or(&spec.tech_stack, "unspecified"),
        join_or(&spec.constraints, "none"),
        task.id,
        task.title,
        task.description,
        task.expected_output,
    )
}

/// Phase-3 user prompt: every completed task result plus the spec.
pub fn integration(spec: &ProjectSpec, results: &[TaskResult]) -> String {
    let results_json = serde_json::to_string_pretty(results).unwrap_or_else(|_| "[]".to_string());
    format!(
        "PROJECT: {}\nDESCRIPTION: {}\nTECH STACK: {}\n\n\
         SPECIALIST RESULTS:\n{results_json}\n\n\
         Merge these results into one coherent project. Respond with a single \
         JSON object matching this schema:\n{}",
        spec.project_name,
        spec.description,
        join_or(&spec.tech_stack, "unspecified"),
        schema_hint::<IntegrationOutput>()
    )
}

/// Phase-4 user prompt: the integrated project plus acceptance criteria.
pub fn testing(spec: &ProjectSpec, integration: &IntegrationOutput) -> String {
    let integration_json =
        serde_json::to_string_pretty(integration).unwrap_or_else(|_| "{}".to_string());
    format!(
        "PROJECT: {}\nSUCCESS CRITERIA: {}\n\n\
         INTEGRATED PROJECT:\n{integration_json}\n\n\
         Review the project against the criteria. Respond with a single JSON \
         object matching this schema:\n{}\n\n\
         Use status \"pass\" only when every criterion is met. When requesting \
         fixes, reference tasks by their numeric ids in specific_tasks_to_fix.",
        spec.project_name,
        join_or(&spec.success_criteria, "a working implementation"),
        crate::prompts::schema_hint::<crate::project::TestReport>()
    )
}

/// Brief for a full restart: the original text plus the tester's findings.
pub fn augment_brief(brief: &str, errors: &[String]) -> String {
    if errors.is_empty() {
        return brief.to_string();
    }
    let issues = errors
        .iter()
        .map(|e| format!("- {e}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!("{brief}\n\nIssues to fix from the previous attempt:\n{issues}")
}

/// System prompt for a specialist role.
pub fn specialist_system(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Coder => CODER,
        AgentRole::Designer => DESIGNER,
        AgentRole::Researcher => RESEARCHER,
        AgentRole::Writer => WRITER,
    }
}

fn join_or(items: &[String], fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(", ")
    }
}
