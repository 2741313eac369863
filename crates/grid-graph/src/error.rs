use grid_domain::StateGuid;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("edge {from} -> {to} would close a cycle")]
    CycleDetected { from: StateGuid, to: StateGuid },

    #[error("state {0} not present in graph snapshot")]
    UnknownState(StateGuid),

    #[error("inconsistent graph: {0}")]
    InconsistentGraph(String),
}
