//! Analysis pipeline state machine.

use serde::{Deserialize, Serialize};

/// State of one orchestrated analysis run.
///
/// `Degraded` is terminal and reachable from `ExternalReasoning`: the run
/// still completes with the locally computed fields, it just lacks the
/// collaborator output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    #[default]
    Ingesting,
    RetrievingContext,
    AnalyzingChange,
    QueryingKnowledge,
    ExternalReasoning,
    Composing,
    Done,
    Degraded,
}

impl PipelineState {
    /// Whether the pipeline has finished, successfully or degraded.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Degraded)
    }
}

/// Tracks state transitions for one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct PipelineStateMachine {
    state: PipelineState,
}

impl PipelineStateMachine {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Move to a new state. Terminal states absorb further transitions,
    /// so a run degraded at the reasoning step stays `Degraded` while the
    /// local composition steps still execute.
    pub fn transition(&mut self, new_state: PipelineState) {
        if self.state.is_terminal() {
            tracing::debug!(state = ?self.state, ignored = ?new_state, "Pipeline already terminal");
            return;
        }
        tracing::debug!(from = ?self.state, to = ?new_state, "Pipeline transition");
        self.state = new_state;
    }
}
