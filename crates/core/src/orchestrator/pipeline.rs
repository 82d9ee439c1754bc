//! # Pipeline Stages
//!
//! The four-phase state machine and the refinement/restart budget.

use serde::{Deserialize, Serialize};

/// Stage of the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Project manager breaking the brief into tasks
    Analysis,
    /// Specialist tasks executing
    Specialists,
    /// Integrator merging results
    Integration,
    /// Tester reviewing, refinement loop running
    Testing,
    /// Complete
    Complete,
    /// Failed
    Failed,
}

impl PipelineStage {
    pub fn label(&self) -> &'static str {
        match self {
            PipelineStage::Analysis => "analysis",
            PipelineStage::Specialists => "specialists",
            PipelineStage::Integration => "integration",
            PipelineStage::Testing => "testing",
            PipelineStage::Complete => "complete",
            PipelineStage::Failed => "failed",
        }
    }
}

/// The pipeline state machine
#[derive(Debug, Clone)]
pub struct Pipeline {
    /// Current stage
    pub stage: PipelineStage,
    /// Refinement iterations spent in the current pass
    pub iterations: u32,
    /// Maximum refinement iterations per pass
    pub max_iterations: u32,
    /// Full restarts taken (never reset)
    pub restarts: u32,
    /// Maximum full restarts
    pub max_restarts: u32,
}

impl Default for Pipeline {
    fn default() -> Self {
        Self {
            stage: PipelineStage::Analysis,
            iterations: 0,
            max_iterations: 3,
            restarts: 0,
            max_restarts: 1,
        }
    }
}

impl Pipeline {
    pub fn new(max_iterations: u32, max_restarts: u32) -> Self {
        Self {
            max_iterations,
            max_restarts,
            ..Self::default()
        }
    }

    /// Advance to the next stage
    pub fn advance(&mut self) {
        self.stage = match self.stage {
            PipelineStage::Analysis => PipelineStage::Specialists,
            PipelineStage::Specialists => PipelineStage::Integration,
            PipelineStage::Integration => PipelineStage::Testing,
            PipelineStage::Testing => PipelineStage::Complete,
            PipelineStage::Complete => PipelineStage::Complete,
            PipelineStage::Failed => PipelineStage::Failed,
        };
    }

    /// Fail the pipeline
    pub fn fail(&mut self) {
        self.stage = PipelineStage::Failed;
    }

    /// Start a refinement iteration; false once the budget is spent.
    pub fn begin_iteration(&mut self) -> bool {
        if self.iterations >= self.max_iterations {
            return false;
        }
        self.iterations += 1;
        true
    }

    /// Take a full restart - back to Analysis with fresh iterations.
    /// False once the restart budget is spent; the restart count itself
    /// survives the reset.
    pub fn begin_restart(&mut self) -> bool {
        if self.restarts >= self.max_restarts {
            return false;
        }
        self.restarts += 1;
        self.iterations = 0;
        self.stage = PipelineStage::Analysis;
        true
    }

    /// Check if pipeline is complete
    pub fn is_complete(&self) -> bool {
        matches!(self.stage, PipelineStage::Complete | PipelineStage::Failed)
    }

    /// Check if pipeline succeeded
    pub fn is_success(&self) -> bool {
        self.stage == PipelineStage::Complete
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_advance() {
        let mut pipeline = Pipeline::default();
        assert_eq!(pipeline.stage, PipelineStage::Analysis);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Specialists);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Integration);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Testing);

        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Complete);
        assert!(pipeline.is_success());
    }

    #[test]
    fn test_terminal_stages_absorb() {
        let mut pipeline = Pipeline::default();
        pipeline.fail();
        pipeline.advance();
        assert_eq!(pipeline.stage, PipelineStage::Failed);
        assert!(pipeline.is_complete());
        assert!(!pipeline.is_success());
    }

    #[test]
    fn test_iteration_budget() {
        let mut pipeline = Pipeline::new(2, 1);
        assert!(pipeline.begin_iteration());
        assert!(pipeline.begin_iteration());
        assert!(!pipeline.begin_iteration());
        assert_eq!(pipeline.iterations, 2);
    }

    #[test]
    fn test_restart_resets_iterations_not_restarts() {
        let mut pipeline = Pipeline::new(2, 1);
        pipeline.stage = PipelineStage::Testing;
        assert!(pipeline.begin_iteration());
        assert!(pipeline.begin_iteration());

        // First restart allowed: back to Analysis, iterations fresh.
        assert!(pipeline.begin_restart());
        assert_eq!(pipeline.stage, PipelineStage::Analysis);
        assert_eq!(pipeline.iterations, 0);
        assert_eq!(pipeline.restarts, 1);

        // Second restart denied.
        pipeline.stage = PipelineStage::Testing;
        assert!(!pipeline.begin_restart());
        assert_eq!(pipeline.stage, PipelineStage::Testing);
    }

    #[test]
    fn test_stage_labels() {
        assert_eq!(PipelineStage::Analysis.label(), "analysis");
        assert_eq!(PipelineStage::Testing.label(), "testing");
    }
}
