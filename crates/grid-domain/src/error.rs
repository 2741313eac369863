use thiserror::Error;

/// Core error taxonomy shared across every crate in the workspace.
///
/// Transport-facing crates (`grid-api`) translate these into status codes;
/// nothing below `grid-api` should construct a protocol-specific error.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("state not found: {0}")]
    StateNotFound(String),

    #[error("edge not found: {0}")]
    EdgeNotFound(i64),

    #[error("logic id already in use: {0}")]
    DuplicateLogicId(String),

    #[error("duplicate edge: {from_state}/{from_output} -> {to_state}")]
    DuplicateEdge {
        from_state: String,
        from_output: String,
        to_state: String,
    },

    #[error("input alias '{alias}' already used on state {to_state}")]
    AliasConflict { to_state: String, alias: String },

    #[error("state {0} is locked")]
    Locked(String),

    #[error("state {0} is not locked")]
    NotLocked(String),

    #[error("lock id mismatch for state {0}")]
    LockIdMismatch(String),

    #[error("edge {from} -> {to} would close a cycle")]
    CycleDetected { from: String, to: String },

    #[error("malformed state blob: {0}")]
    MalformedState(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}
