//! # Pipeline Events
//!
//! Event types streamed from the orchestrator to subscribers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of pipeline event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineEventKind {
    /// Run started
    PipelineStarted,
    /// A phase started
    PhaseStarted,
    /// A phase completed
    PhaseCompleted,
    /// An agent started working
    AgentStarted,
    /// An agent completed successfully
    AgentCompleted,
    /// An agent failed
    AgentFailed,
    /// Specialist task progress (completed/total)
    TaskProgress,
    /// A task is being re-executed after a failed test round
    TaskRetried,
    /// A refinement iteration began
    RefinementIteration,
    /// The pipeline went back to Phase 1 with an augmented brief
    PipelineRestarted,
    /// A task's dependencies were unknown or cyclic
    DependencyWarning,
    /// Run completed
    PipelineCompleted,
    /// Run failed
    PipelineFailed,
}

/// An event in the pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineEvent {
    /// Unique event ID
    pub id: String,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
    /// Kind of event
    pub kind: PipelineEventKind,
    /// Agent or role that produced this event
    pub agent: String,
    /// Associated data (JSON)
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    /// Related task ID if applicable
    #[serde(default)]
    pub task_id: Option<u32>,
}

impl PipelineEvent {
    /// Create a new event
    pub fn new(kind: PipelineEventKind, agent: &str) -> Self {
        Self {
            id: uuid_v4(),
            timestamp: Utc::now(),
            kind,
            agent: agent.to_string(),
            data: None,
            task_id: None,
        }
    }

    /// Add data to the event
    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    /// Add task ID to the event
    pub fn with_task(mut self, task_id: u32) -> Self {
        self.task_id = Some(task_id);
        self
    }
}

/// Generate a simple UUID v4
fn uuid_v4() -> String {
    use std::time::{Duration, SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_nanos();
    format!("{:x}-{:x}", nanos, rand_u32())
}

/// Simple random number (not cryptographic)
fn rand_u32() -> u32 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};
    RandomState::new().build_hasher().finish() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_creation() {
        let event = PipelineEvent::new(PipelineEventKind::AgentStarted, "coder").with_task(7);

        assert_eq!(event.agent, "coder");
        assert_eq!(event.task_id, Some(7));
        assert!(event.data.is_none());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let a = PipelineEvent::new(PipelineEventKind::PhaseStarted, "x");
        let b = PipelineEvent::new(PipelineEventKind::PhaseStarted, "x");
        assert_ne!(a.id, b.id);
    }

    #[test]
    fn test_event_kind_serializes_snake_case() {
        let json = serde_json::to_string(&PipelineEventKind::PipelineRestarted).unwrap();
        assert_eq!(json, "\"pipeline_restarted\"");
    }
}
