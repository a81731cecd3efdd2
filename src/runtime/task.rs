use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

use crate::graph::NodeIndex;
use crate::runtime::workflow::Workflow;

/// Arena index of a task within its owning workflow.
pub type TaskId = usize;

pub type DataMap = HashMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Created but not yet resolved. Only seen inside a restore.
    Future,
    Waiting,
    Ready,
    Completed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled)
    }

    /// Part of the active frontier, which is what checkpoints serialize.
    pub fn is_active(self) -> bool {
        matches!(self, TaskState::Ready | TaskState::Waiting)
    }
}

/// One runtime instance of a graph node. Tasks form a tree through
/// parent/children arena indices; a call activity task owns the nested
/// workflow it spawned.
pub struct Task {
    pub id: Uuid,
    pub node: NodeIndex,
    pub parent: Option<TaskId>,
    pub children: Vec<TaskId>,
    pub state: TaskState,
    /// Task scope, cloned from the parent scope at creation.
    pub data: DataMap,
    pub created_at: DateTime<Utc>,
    /// Incoming flow ids that have reached this join instance.
    pub arrivals: HashSet<String>,
    pub subprocess: Option<Box<Workflow>>,
}

impl Task {
    pub fn new(
        node: NodeIndex,
        parent: Option<TaskId>,
        data: DataMap,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            node,
            parent,
            children: Vec::new(),
            state: TaskState::Future,
            data,
            created_at,
            arrivals: HashSet::new(),
            subprocess: None,
        }
    }
}

/// Snapshot handed out by workflow queries.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    pub id: Uuid,
    pub node: String,
    pub state: TaskState,
    /// Name chain of the owning workflow, outermost first.
    pub workflow: Vec<String>,
    pub data: DataMap,
}
