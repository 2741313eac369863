use grid_domain::{EdgeId, StateGuid};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(EdgeId),

    #[error("logic id already in use: {0}")]
    DuplicateLogicId(String),

    #[error("duplicate edge: {from_state}/{from_output} -> {to_state}")]
    DuplicateEdge {
        from_state: StateGuid,
        from_output: String,
        to_state: StateGuid,
    },

    #[error("input alias '{alias}' already used on state {to_state}")]
    AliasConflict { to_state: StateGuid, alias: String },

    #[error("state {0} is locked")]
    Locked(StateGuid),

    #[error("state {0} is not locked")]
    NotLocked(StateGuid),

    #[error("lock id mismatch for state {0}")]
    LockIdMismatch(StateGuid),

    #[error("edge {from} -> {to} would close a cycle")]
    CycleDetected { from: StateGuid, to: StateGuid },

    #[error(transparent)]
    Domain(#[from] grid_domain::DomainError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),
}
