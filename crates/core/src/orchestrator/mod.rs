//! # Orchestration
//!
//! The four-phase pipeline: stage machine, event stream, and the
//! coordinator that drives agents through Analysis -> Specialists ->
//! Integration -> Testing with bounded refinement.

pub mod coordinator;
pub mod events;
pub mod pipeline;

pub use coordinator::{Orchestrator, OrchestratorConfig};
pub use events::{PipelineEvent, PipelineEventKind};
pub use pipeline::{Pipeline, PipelineStage};
