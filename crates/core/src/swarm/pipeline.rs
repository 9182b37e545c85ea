//! # Pipeline Run
//!
//! Per-run state machine tracked by the coordinator.

use serde::{Deserialize, Serialize};

/// Phase of a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum RunPhase {
    /// Context built, no stage started
    Created,
    /// A stage is executing
    Running { stage: String },
    /// Synthesizer produced the artifact
    Completed { degraded: bool },
    /// The run ended with the error artifact
    FatallyAborted { error: String },
}

/// The run state machine
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: String,
    pub phase: RunPhase,
    /// Stages entered so far, in order
    pub visited: Vec<String>,
}

impl PipelineRun {
    /// Create a new run
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase: RunPhase::Created,
            visited: Vec::new(),
        }
    }

    /// Enter a stage. Ignored once the run is terminal.
    pub fn advance(&mut self, stage: &str) {
        if self.is_complete() {
            return;
        }
        self.visited.push(stage.to_string());
        self.phase = RunPhase::Running {
            stage: stage.to_string(),
        };
    }

    /// Finish with the synthesizer's artifact
    pub fn complete(&mut self, degraded: bool) {
        if !self.is_complete() {
            self.phase = RunPhase::Completed { degraded };
        }
    }

    /// Fail the run
    pub fn fail(&mut self, error: impl Into<String>) {
        if !self.is_complete() {
            self.phase = RunPhase::FatallyAborted {
                error: error.into(),
            };
        }
    }

    /// Check if the run reached a terminal phase
    pub fn is_complete(&self) -> bool {
        matches!(
            self.phase,
            RunPhase::Completed { .. } | RunPhase::FatallyAborted { .. }
        )
    }

    /// Check if the run produced a synthesized artifact
    pub fn is_success(&self) -> bool {
        matches!(self.phase, RunPhase::Completed { .. })
    }

    pub fn current_stage(&self) -> Option<&str> {
        match &self.phase {
            RunPhase::Running { stage } => Some(stage),
            _ => None,
        }
    }
}
