use crate::runtime::instance::InstanceId;
use crate::runtime::token::TokenId;

/// Errors raised while executing process instances.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("more than {limit} steps performed, cannot complete update for instance {instance}")]
    StepLimitExceeded { instance: InstanceId, limit: usize },

    #[error("more than {limit} update rounds performed, process instances keep spawning")]
    RoundLimitExceeded { limit: usize },

    #[error("no start event found in collaboration '{0}'")]
    NoStartEvent(String),

    #[error("node '{node}' must only have a single outgoing edge, found {count}")]
    AmbiguousOutgoing { node: String, count: usize },

    #[error("no message flow leaves node '{0}'")]
    MissingMessageFlow(String),

    #[error("node '{0}' is not a start event")]
    NotAStartEvent(String),

    #[error("process instance not found: {0}")]
    InstanceNotFound(InstanceId),

    #[error("token not found: {0}")]
    TokenNotFound(TokenId),

    #[error("token {0} is not active")]
    TokenInactive(TokenId),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("cannot execute a path ending at '{0}'")]
    UnsupportedPathTarget(String),

    #[error("rule evaluation failed for '{expression}': {message}")]
    Rule { expression: String, message: String },

    #[error(transparent)]
    Collaborator(#[from] anyhow::Error),
}

impl EngineError {
    /// Runaway graphs. The caller must not retry these automatically.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            EngineError::StepLimitExceeded { .. } | EngineError::RoundLimitExceeded { .. }
        )
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Structural problems found while compiling a collaboration.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("duplicate edge id: {0}")]
    DuplicateEdge(String),

    #[error("duplicate process id: {0}")]
    DuplicateProcess(String),

    #[error("{context} references unknown node '{node}'")]
    UnknownNode { node: String, context: String },

    #[error("sequence flow '{0}' connects nodes of different processes")]
    CrossProcessFlow(String),

    #[error("boundary event '{event}' must be attached to a task, '{target}' is not one")]
    InvalidAttachment { event: String, target: String },

    #[error("default flow '{flow}' of gateway '{gateway}' is not one of its outgoing edges")]
    InvalidDefaultFlow { gateway: String, flow: String },

    #[error("lane '{lane}' lists node '{node}' that belongs to another lane or process")]
    InvalidLaneMember { lane: String, node: String },
}
