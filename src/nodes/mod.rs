pub mod activities;
pub mod events;
pub mod gateways;

use std::sync::Arc;

use crate::error::EngineError;
use crate::graph::{NodeIndex, NodeKind};
use crate::runtime::task::{TaskId, TaskState};
use crate::runtime::workflow::{Message, Workflow};

/// Kinds the engine completes on its own. User and manual tasks wait for
/// an external `complete_task`.
pub fn is_automatic(kind: &NodeKind) -> bool {
    !matches!(kind, NodeKind::UserTask | NodeKind::ManualTask)
}

/// Runs right after a task enters the tree: decides ready vs waiting and
/// spawns nested workflows. Join instances never pass through here, the
/// gateway arrival routing creates them directly.
pub fn on_created(wf: &mut Workflow, task: TaskId) -> Result<(), EngineError> {
    let spec = Arc::clone(&wf.spec);
    match &spec.nodes[wf.tasks[task].node].kind {
        NodeKind::CallActivity { .. } => activities::start_call(wf, task),
        NodeKind::IntermediateCatchEvent { .. } | NodeKind::BoundaryEvent { .. } => {
            wf.tasks[task].state = TaskState::Waiting;
            Ok(())
        }
        _ => {
            wf.tasks[task].state = TaskState::Ready;
            Ok(())
        }
    }
}

/// Waits the engine can satisfy by itself: joins whose arrival condition
/// holds and call activities whose subprocess has drained.
pub fn internal_wait_over(wf: &Workflow, task: TaskId) -> bool {
    match &wf.spec.nodes[wf.tasks[task].node].kind {
        NodeKind::ParallelGateway | NodeKind::InclusiveGateway => {
            gateways::join_is_ready(wf, task)
        }
        NodeKind::CallActivity { .. } => activities::call_finished(wf, task),
        _ => false,
    }
}

/// Waits satisfied by the outside world, polled by `refresh_waiting_tasks`.
/// Messages are never polled; they arrive through `accept_message`.
pub fn external_wait_over(wf: &Workflow, task: TaskId) -> bool {
    match &wf.spec.nodes[wf.tasks[task].node].kind {
        NodeKind::IntermediateCatchEvent { event } | NodeKind::BoundaryEvent { event } => {
            events::timer_elapsed(wf, task, event)
        }
        _ => false,
    }
}

/// Completion side effects, before the outgoing flows fire.
pub fn on_completed(wf: &mut Workflow, task: TaskId) -> Result<(), EngineError> {
    let spec = Arc::clone(&wf.spec);
    match &spec.nodes[wf.tasks[task].node].kind {
        NodeKind::ScriptTask { script } => activities::run_script(wf, task, script),
        NodeKind::EndEvent => {
            events::merge_end_data(wf, task);
            Ok(())
        }
        NodeKind::CallActivity { out_assign, .. } => {
            activities::apply_out_assignments(wf, task, out_assign);
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Offer a message to a waiting task. Returns true when consumed.
pub fn offer_message(wf: &mut Workflow, task: TaskId, message: &Message) -> bool {
    let spec = Arc::clone(&wf.spec);
    match &spec.nodes[wf.tasks[task].node].kind {
        NodeKind::IntermediateCatchEvent { event } | NodeKind::BoundaryEvent { event } => {
            events::consume_message(wf, task, event, message)
        }
        _ => false,
    }
}

/// Which outgoing flows fire when `task` completes. Exclusive and
/// inclusive gateways evaluate their conditions; everything else fans out
/// unconditionally.
pub fn outgoing_to_fire(
    wf: &Workflow,
    task: TaskId,
) -> Result<Vec<(String, NodeIndex)>, EngineError> {
    let node = &wf.spec.nodes[wf.tasks[task].node];
    match &node.kind {
        NodeKind::ExclusiveGateway => gateways::pick_exclusive(wf, task),
        NodeKind::InclusiveGateway => gateways::pick_inclusive(wf, task),
        _ => Ok(node.outgoing.iter().map(|t| (t.id.clone(), t.target)).collect()),
    }
}
