use chrono::Duration;
use tracing::debug;

use crate::graph::EventDefinition;
use crate::runtime::task::{TaskId, TaskState};
use crate::runtime::workflow::{Message, Workflow};

/// Timer events measure from task creation against the injected clock.
pub fn timer_elapsed(wf: &Workflow, task: TaskId, event: &EventDefinition) -> bool {
    match event {
        EventDefinition::Timer { delay_ms } => {
            let due = wf.tasks[task].created_at + Duration::milliseconds(*delay_ms);
            wf.services.clock.now() >= due
        }
        EventDefinition::Message { .. } => false,
    }
}

/// A waiting message event consumes a matching message: the payload is
/// merged into the task scope and the task becomes ready.
pub fn consume_message(
    wf: &mut Workflow,
    task: TaskId,
    event: &EventDefinition,
    message: &Message,
) -> bool {
    let EventDefinition::Message { name } = event else {
        return false;
    };
    if name != &message.name {
        return false;
    }
    for (k, v) in &message.data {
        wf.tasks[task].data.insert(k.clone(), v.clone());
    }
    wf.tasks[task].state = TaskState::Ready;
    let node = wf.tasks[task].node;
    debug!(node = %wf.spec.nodes[node].id, message = %message.name, "message consumed");
    true
}

/// End events feed their task scope back into the process scope, so
/// subprocess results are visible to the enclosing call activity.
pub fn merge_end_data(wf: &mut Workflow, task: TaskId) {
    let data = wf.tasks[task].data.clone();
    wf.data.extend(data);
}
