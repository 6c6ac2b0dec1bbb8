use serde::Serialize;
use std::fmt;

use crate::llm::GenerationError;

/// Which generation fault ended a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    GenerationBackend,
    GenerationTimeout,
    EmptyGeneration,
}

impl From<&GenerationError> for FailureKind {
    fn from(error: &GenerationError) -> Self {
        match error {
            GenerationError::Backend(_) => FailureKind::GenerationBackend,
            GenerationError::Timeout(_) => FailureKind::GenerationTimeout,
            GenerationError::EmptyOutput => FailureKind::EmptyGeneration,
        }
    }
}

/// Stages of one pipeline run.
///
/// ```text
/// Generating -> Validating -> Rejected
///     |              \-----> Executing -> Summarizing
///     \-> Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Generating,
    Validating,
    Rejected,
    Executing,
    Summarizing,
    Failed(FailureKind),
}

impl PipelineState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::Rejected | PipelineState::Summarizing | PipelineState::Failed(_)
        )
    }

    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Generating, Validating)
                | (Generating, Failed(_))
                | (Validating, Rejected)
                | (Validating, Executing)
                | (Executing, Summarizing)
        )
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineState::Generating => write!(f, "generating"),
            PipelineState::Validating => write!(f, "validating"),
            PipelineState::Rejected => write!(f, "rejected"),
            PipelineState::Executing => write!(f, "executing"),
            PipelineState::Summarizing => write!(f, "summarizing"),
            PipelineState::Failed(kind) => write!(f, "failed ({:?})", kind),
        }
    }
}

/// Ordered record of the states a run went through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateTrace {
    states: Vec<PipelineState>,
}

impl StateTrace {
    pub fn start() -> Self {
        tracing::debug!(state = %PipelineState::Generating, "pipeline started");
        Self {
            states: vec![PipelineState::Generating],
        }
    }

    pub fn current(&self) -> PipelineState {
        // Never empty: start() seeds the first state
        self.states[self.states.len() - 1]
    }

    /// Move to `next`. Illegal edges are a programming error.
    pub fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal pipeline transition {} -> {}",
            current,
            next
        );
        tracing::debug!(from = %current, to = %next, "pipeline transition");
        self.states.push(next);
    }

    pub fn states(&self) -> &[PipelineState] {
        &self.states
    }
}
