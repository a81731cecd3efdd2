use tracing::debug;

use crate::error::EngineError;
use crate::graph::{NodeIndex, NodeKind};
use crate::runtime::task::{TaskId, TaskState};
use crate::runtime::workflow::Workflow;

/// Exclusive choice: first flow whose condition holds, else the first
/// unconditional flow. Selecting nothing is an error, a stuck automatic
/// task would keep the engine from reaching its fixpoint.
pub fn pick_exclusive(
    wf: &Workflow,
    task: TaskId,
) -> Result<Vec<(String, NodeIndex)>, EngineError> {
    let node = &wf.spec.nodes[wf.tasks[task].node];
    let scope = wf.eval_scope(task);
    let mut default = None;
    for t in &node.outgoing {
        match &t.condition {
            Some(condition) => {
                if wf.services.script.evaluate(condition, &scope)? {
                    return Ok(vec![(t.id.clone(), t.target)]);
                }
            }
            None => {
                if default.is_none() {
                    default = Some(t);
                }
            }
        }
    }
    match default {
        Some(t) => Ok(vec![(t.id.clone(), t.target)]),
        None => Err(EngineError::AmbiguousCondition { node: node.id.clone() }),
    }
}

/// Inclusive choice: every flow whose condition holds or is absent.
pub fn pick_inclusive(
    wf: &Workflow,
    task: TaskId,
) -> Result<Vec<(String, NodeIndex)>, EngineError> {
    let node = &wf.spec.nodes[wf.tasks[task].node];
    let scope = wf.eval_scope(task);
    let mut fired = Vec::new();
    for t in &node.outgoing {
        let take = match &t.condition {
            Some(condition) => wf.services.script.evaluate(condition, &scope)?,
            None => true,
        };
        if take {
            fired.push((t.id.clone(), t.target));
        }
    }
    if fired.is_empty() {
        return Err(EngineError::AmbiguousCondition { node: node.id.clone() });
    }
    Ok(fired)
}

fn is_join(wf: &Workflow, node: NodeIndex) -> bool {
    matches!(
        wf.spec.nodes[node].kind,
        NodeKind::ParallelGateway | NodeKind::InclusiveGateway
    ) && wf.spec.nodes[node].incoming.len() > 1
}

/// Route one fired flow into a join node. Arrivals correlate onto a shared
/// gateway instance; the first arrival creates it. Returns `None` when the
/// target is not a join and the caller should spawn a child normally.
pub fn route_arrival(
    wf: &mut Workflow,
    from_task: TaskId,
    flow: &str,
    target: NodeIndex,
) -> Result<Option<TaskId>, EngineError> {
    if !is_join(wf, target) {
        return Ok(None);
    }
    let instance = correlate_instance(wf, from_task, target);
    let join = match instance {
        Some(join) => {
            if !wf.tasks[join].arrivals.insert(flow.to_string()) {
                return Err(EngineError::JoinCorrelation {
                    node: wf.spec.nodes[target].id.clone(),
                    transition: flow.to_string(),
                });
            }
            join
        }
        None => {
            let join = wf.spawn_child(from_task, target);
            wf.tasks[join].arrivals.insert(flow.to_string());
            wf.tasks[join].state = TaskState::Waiting;
            join
        }
    };
    if join_is_ready(wf, join) {
        wf.tasks[join].state = TaskState::Ready;
        debug!(node = %wf.spec.nodes[target].id, "join unblocked");
    }
    Ok(Some(join))
}

/// A join is ready when every incoming flow has either arrived or gone
/// dead: no live task sits on a node from which the flow's source is still
/// reachable. This derives the expected subset for inclusive joins from
/// the tree itself, and restores cleanly from a checkpoint where earlier
/// arrivals left no tasks behind.
pub fn join_is_ready(wf: &Workflow, join: TaskId) -> bool {
    let node = wf.tasks[join].node;
    for inc in &wf.spec.nodes[node].incoming {
        if wf.tasks[join].arrivals.contains(&inc.id) {
            continue;
        }
        let live = wf.tasks.iter().enumerate().any(|(tid, t)| {
            tid != join && !t.state.is_terminal() && wf.spec.reaches(t.node, inc.source)
        });
        if live {
            return false;
        }
    }
    true
}

/// Among the waiting instances of one join node, pick the one sharing the
/// deepest tree ancestor with the arriving task.
fn correlate_instance(wf: &Workflow, from_task: TaskId, target: NodeIndex) -> Option<TaskId> {
    let from_path = ancestor_path(wf, from_task);
    let mut best: Option<(usize, TaskId)> = None;
    for (tid, t) in wf.tasks.iter().enumerate() {
        if t.node != target || t.state != TaskState::Waiting {
            continue;
        }
        let path = ancestor_path(wf, tid);
        let common = from_path.iter().zip(&path).take_while(|(a, b)| a == b).count();
        if best.map_or(true, |(depth, _)| common > depth) {
            best = Some((common, tid));
        }
    }
    best.map(|(_, tid)| tid)
}

fn ancestor_path(wf: &Workflow, task: TaskId) -> Vec<TaskId> {
    let mut path = vec![task];
    let mut at = task;
    while let Some(parent) = wf.tasks[at].parent {
        path.push(parent);
        at = parent;
    }
    path.reverse();
    path
}
