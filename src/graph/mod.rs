pub mod builder;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::EngineError;

pub type NodeIndex = usize;

/// Static description of one process, immutable once built.
#[derive(Debug, Clone)]
pub struct ProcessGraph {
    pub name: String,
    pub nodes: Vec<GraphNode>,
    pub start: NodeIndex,
    pub index: HashMap<String, NodeIndex>,
}

#[derive(Debug, Clone)]
pub struct GraphNode {
    pub id: String,
    pub kind: NodeKind,
    /// Outgoing flows in declaration order.
    pub outgoing: Vec<Transition>,
    /// Reverse edges, computed at build time.
    pub incoming: Vec<Incoming>,
}

/// A sequence flow between two nodes. The id is unique within the process.
#[derive(Debug, Clone)]
pub struct Transition {
    pub id: String,
    pub target: NodeIndex,
    pub condition: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Incoming {
    pub id: String,
    pub source: NodeIndex,
}

#[derive(Debug, Clone)]
pub enum NodeKind {
    StartEvent,
    EndEvent,
    NoneTask,
    UserTask,
    ManualTask,
    ScriptTask {
        script: String,
    },
    ExclusiveGateway,
    ParallelGateway,
    InclusiveGateway,
    IntermediateCatchEvent {
        event: EventDefinition,
    },
    BoundaryEvent {
        event: EventDefinition,
    },
    /// Synthetic parent spliced in by the builder for a host with attached
    /// boundary events. Never written by hand.
    BoundarySplit,
    CallActivity {
        subprocess: Subprocess,
        out_assign: Vec<Assignment>,
    },
}

#[derive(Debug, Clone)]
pub enum EventDefinition {
    Message { name: String },
    Timer { delay_ms: i64 },
}

/// What a call activity runs: a graph known at build time, or a name
/// resolved through the configured [`SubprocessResolver`] when the task
/// is reached.
#[derive(Debug, Clone)]
pub enum Subprocess {
    Static(Arc<ProcessGraph>),
    Named(String),
}

/// Copies one variable from subprocess data into the call activity's scope
/// when the subprocess completes.
#[derive(Debug, Clone)]
pub struct Assignment {
    pub from: String,
    pub to: String,
}

pub trait SubprocessResolver: Send + Sync {
    fn resolve(&self, name: &str) -> Result<Arc<ProcessGraph>, EngineError>;
}

/// Default resolver for workflows without named call activities.
pub struct NoResolver;

impl SubprocessResolver for NoResolver {
    fn resolve(&self, name: &str) -> Result<Arc<ProcessGraph>, EngineError> {
        Err(EngineError::UnresolvedSubprocess(name.to_string()))
    }
}

impl ProcessGraph {
    pub fn node(&self, index: NodeIndex) -> &GraphNode {
        &self.nodes[index]
    }

    pub fn node_index(&self, id: &str) -> Option<NodeIndex> {
        self.index.get(id).copied()
    }

    /// The flow leaving `source` whose target is `target`, if any.
    pub fn transition_between(&self, source: NodeIndex, target: NodeIndex) -> Option<&Transition> {
        self.nodes[source].outgoing.iter().find(|t| t.target == target)
    }

    /// The flow with the given id, paired with its source node.
    pub fn transition_by_id(&self, id: &str) -> Option<(NodeIndex, &Transition)> {
        for (source, node) in self.nodes.iter().enumerate() {
            if let Some(t) = node.outgoing.iter().find(|t| t.id == id) {
                return Some((source, t));
            }
        }
        None
    }

    /// Shortest node route from the start event through the named flow,
    /// ending at the flow's target. Conditions are ignored; the route is
    /// structural.
    pub fn route_to_transition(&self, id: &str) -> Option<Vec<NodeIndex>> {
        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(self.start);
        queue.push_back(self.start);
        while let Some(current) = queue.pop_front() {
            for t in &self.nodes[current].outgoing {
                if t.id == id {
                    let mut route = Self::walk_back(&prev, current);
                    route.push(t.target);
                    return Some(route);
                }
                if seen.insert(t.target) {
                    prev.insert(t.target, current);
                    queue.push_back(t.target);
                }
            }
        }
        None
    }

    /// Shortest node route from the start event to `target`, inclusive.
    pub fn route_to_node(&self, target: NodeIndex) -> Option<Vec<NodeIndex>> {
        if self.start == target {
            return Some(vec![self.start]);
        }
        let mut prev: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(self.start);
        queue.push_back(self.start);
        while let Some(current) = queue.pop_front() {
            for t in &self.nodes[current].outgoing {
                if t.target == target {
                    let mut route = Self::walk_back(&prev, current);
                    route.push(target);
                    return Some(route);
                }
                if seen.insert(t.target) {
                    prev.insert(t.target, current);
                    queue.push_back(t.target);
                }
            }
        }
        None
    }

    /// True when `to` is reachable from `from` over outgoing flows,
    /// including `from == to`.
    pub fn reaches(&self, from: NodeIndex, to: NodeIndex) -> bool {
        if from == to {
            return true;
        }
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(from);
        queue.push_back(from);
        while let Some(current) = queue.pop_front() {
            for t in &self.nodes[current].outgoing {
                if t.target == to {
                    return true;
                }
                if seen.insert(t.target) {
                    queue.push_back(t.target);
                }
            }
        }
        false
    }

    fn walk_back(prev: &HashMap<NodeIndex, NodeIndex>, end: NodeIndex) -> Vec<NodeIndex> {
        let mut route = vec![end];
        let mut at = end;
        while let Some(&p) = prev.get(&at) {
            route.push(p);
            at = p;
        }
        route.reverse();
        route
    }
}
