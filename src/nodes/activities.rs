use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::EngineError;
use crate::graph::{Assignment, NodeKind, Subprocess};
use crate::runtime::task::{TaskId, TaskState};
use crate::runtime::workflow::Workflow;

/// Instantiate the nested workflow of a call activity and park the task
/// until the subprocess drains.
pub fn start_call(wf: &mut Workflow, task: TaskId) -> Result<(), EngineError> {
    attach_subprocess(wf, task, true)?;
    wf.tasks[task].state = TaskState::Waiting;
    let node = wf.tasks[task].node;
    debug!(node = %wf.spec.nodes[node].id, "call activity started");
    Ok(())
}

/// Resolve and attach the subprocess without touching the task state.
/// Restore attaches inert subprocesses this way while materializing
/// checkpoint routes.
pub fn attach_subprocess(wf: &mut Workflow, task: TaskId, activate: bool) -> Result<(), EngineError> {
    let spec = Arc::clone(&wf.spec);
    let node = &spec.nodes[wf.tasks[task].node];
    let NodeKind::CallActivity { subprocess, .. } = &node.kind else {
        return Ok(());
    };
    let graph = match subprocess {
        Subprocess::Static(g) => Arc::clone(g),
        Subprocess::Named(name) => wf.services.resolver.resolve(name)?,
    };
    let mut outer = wf.outer_names.clone();
    outer.push(wf.name.clone());
    let data = wf.eval_scope(task);
    let nested = Workflow::new_nested(
        graph,
        node.id.clone(),
        outer,
        data,
        wf.services.clone(),
        wf.read_only,
        wf.restoring,
        activate,
    );
    wf.tasks[task].subprocess = Some(Box::new(nested));
    Ok(())
}

/// True once the nested workflow has no active tasks left.
pub fn call_finished(wf: &Workflow, task: TaskId) -> bool {
    wf.tasks[task].subprocess.as_ref().map_or(true, |sub| sub.is_completed())
}

pub fn run_script(wf: &mut Workflow, task: TaskId, script: &str) -> Result<(), EngineError> {
    let mut scope = wf.eval_scope(task);
    wf.services.script.execute(script, &mut scope)?;
    wf.tasks[task].data = scope;
    let node = wf.tasks[task].node;
    debug!(node = %wf.spec.nodes[node].id, "script executed");
    Ok(())
}

/// Copy the declared variables out of the completed subprocess into the
/// call activity's scope. Missing sources are skipped.
pub fn apply_out_assignments(wf: &mut Workflow, task: TaskId, out_assign: &[Assignment]) {
    let mut resolved = Vec::new();
    if let Some(sub) = wf.tasks[task].subprocess.as_ref() {
        for a in out_assign {
            resolved.push((a.from.clone(), a.to.clone(), sub.data.get(&a.from).cloned()));
        }
    }
    for (from, to, value) in resolved {
        match value {
            Some(value) => {
                wf.tasks[task].data.insert(to, value);
            }
            None => warn!(source = %from, "out assignment source missing in subprocess data"),
        }
    }
}
