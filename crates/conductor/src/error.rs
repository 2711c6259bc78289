use thiserror::Error;

/// Errors surfaced by the orchestration engine.
///
/// Transport-class failures (timeouts, connection errors, non-200 responses)
/// are normalized at their boundary (room client, webhook caller) and never
/// reach this enum as raw stack traces; see `RoomDelegationResult`.
#[derive(Error, Debug, Clone)]
pub enum ConductorError {
    #[error("capability '{0}' is not satisfiable by any registered tool")]
    Capability(String),

    #[error("spawn depth {depth} exceeds max_depth {max_depth}")]
    DepthExceeded { depth: u32, max_depth: u32 },

    #[error("policy denied action '{action_type}': {reason}")]
    PolicyDenied { action_type: String, reason: String },

    #[error("approval {0} not found")]
    ApprovalNotFound(String),

    #[error("approval {0} already resolved")]
    ApprovalAlreadyResolved(String),

    #[error("task {0} not found")]
    TaskNotFound(String),

    #[error("room {0} not found")]
    RoomNotFound(String),

    #[error("no room available for required capabilities {0:?}")]
    NoRoomAvailable(Vec<String>),

    #[error("query must stay local but no local room is available")]
    PrivacyLocalOnly,

    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("invalid loop proposal: {0}")]
    InvalidLoopProposal(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ConductorResult<T> = Result<T, ConductorError>;
