use thiserror::Error;
use uuid::Uuid;

use crate::runtime::task::TaskState;

/// Errors raised while a process instance is running.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("workflow is read-only")]
    IllegalState,

    #[error("cannot resolve checkpoint marker: {0}")]
    RestoreResolution(String),

    #[error("no outgoing flow selectable at gateway '{node}'")]
    AmbiguousCondition { node: String },

    #[error("duplicate arrival on flow '{transition}' at join '{node}'")]
    JoinCorrelation { node: String, transition: String },

    #[error(transparent)]
    Script(#[from] ScriptError),

    #[error("cannot resolve subprocess '{0}'")]
    UnresolvedSubprocess(String),

    #[error("no task with id {0}")]
    UnknownTask(Uuid),

    #[error("task '{node}' is {state:?}, not ready")]
    TaskNotReady { node: String, state: TaskState },
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("failed to evaluate '{expression}': {message}")]
    Evaluation { expression: String, message: String },
}

/// Errors raised while building a process graph.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("id '{0}' must not contain ':' or ';'")]
    ReservedChars(String),

    #[error("duplicate node id '{0}'")]
    DuplicateNode(String),

    #[error("flow '{flow}' references unknown node '{node}'")]
    UnknownNode { flow: String, node: String },

    #[error("duplicate flow id '{flow}' leaving '{node}'")]
    DuplicateFlow { node: String, flow: String },

    #[error("process '{0}' needs exactly one start event")]
    StartCount(String),

    #[error("flow '{0}' reuses the start event's id")]
    StartIdReused(String),

    #[error("end event '{0}' must not have outgoing flows")]
    EndWithOutgoing(String),

    #[error("condition on flow '{flow}': only exclusive and inclusive gateways take conditions")]
    MisplacedCondition { flow: String },

    #[error("flow '{flow}' may not target boundary event '{event}'")]
    FlowIntoBoundary { flow: String, event: String },

    #[error("boundary event '{event}' needs an activity as host, got '{host}'")]
    InvalidBoundaryHost { event: String, host: String },
}
