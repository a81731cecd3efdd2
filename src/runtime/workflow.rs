use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::graph::{NodeIndex, NodeKind, NoResolver, ProcessGraph, SubprocessResolver};
use crate::nodes;
use crate::runtime::clock::{Clock, SystemClock};
use crate::runtime::task::{DataMap, Task, TaskId, TaskInfo, TaskState};
use crate::script::{EvalexprEngine, ScriptEngine};

/// Arena index of the root task. The arena is never empty.
pub(crate) const ROOT: TaskId = 0;

/// Shared collaborators, injected once and handed down to nested
/// workflows.
#[derive(Clone)]
pub struct EngineServices {
    pub script: Arc<dyn ScriptEngine>,
    pub clock: Arc<dyn Clock>,
    pub resolver: Arc<dyn SubprocessResolver>,
}

impl Default for EngineServices {
    fn default() -> Self {
        Self {
            script: Arc::new(EvalexprEngine),
            clock: Arc::new(SystemClock),
            resolver: Arc::new(NoResolver),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Message {
    pub name: String,
    pub data: DataMap,
}

impl Message {
    pub fn new(name: &str) -> Self {
        Self { name: name.to_string(), data: DataMap::new() }
    }

    pub fn with_data(name: &str, data: DataMap) -> Self {
        Self { name: name.to_string(), data }
    }
}

/// A running process instance: the task arena plus the process scope.
/// Nested instances spawned by call activities live inside their owning
/// task and share the services of the top-level workflow.
pub struct Workflow {
    pub spec: Arc<ProcessGraph>,
    pub name: String,
    /// Names of enclosing workflows, outermost first. Empty at top level.
    pub outer_names: Vec<String>,
    pub tasks: Vec<Task>,
    /// Process scope, distinct from per-task scopes.
    pub data: DataMap,
    pub services: EngineServices,
    pub read_only: bool,
    pub restoring: bool,
    pub success: bool,
}

impl Workflow {
    pub fn new(spec: Arc<ProcessGraph>) -> Self {
        Self::with_services(spec, EngineServices::default())
    }

    pub fn with_services(spec: Arc<ProcessGraph>, services: EngineServices) -> Self {
        let name = spec.name.clone();
        let mut wf = Self {
            spec,
            name,
            outer_names: Vec::new(),
            tasks: Vec::new(),
            data: DataMap::new(),
            services,
            read_only: false,
            restoring: false,
            success: true,
        };
        wf.reset_tree(true);
        info!(workflow = %wf.name, "workflow started");
        wf
    }

    pub(crate) fn new_nested(
        spec: Arc<ProcessGraph>,
        name: String,
        outer_names: Vec<String>,
        data: DataMap,
        services: EngineServices,
        read_only: bool,
        restoring: bool,
        activate: bool,
    ) -> Self {
        let mut wf = Self {
            spec,
            name,
            outer_names,
            tasks: Vec::new(),
            data,
            services,
            read_only,
            restoring,
            success: true,
        };
        wf.reset_tree(activate);
        wf
    }

    /// Throw away the task tree and start over with a root task on the
    /// start event. Restore materializes into an inactive tree.
    pub(crate) fn reset_tree(&mut self, activate: bool) {
        self.tasks.clear();
        self.tasks.push(Task::new(self.spec.start, None, DataMap::new(), self.services.clock.now()));
        if activate {
            self.tasks[ROOT].state = TaskState::Ready;
        }
        self.success = true;
    }

    /// Merge initial variables into the process scope.
    pub fn set_data(&mut self, data: DataMap) {
        self.data.extend(data);
    }

    pub fn set_read_only(&mut self, read_only: bool) {
        self.read_only = read_only;
        for task in &mut self.tasks {
            if let Some(sub) = task.subprocess.as_deref_mut() {
                sub.set_read_only(read_only);
            }
        }
    }

    pub(crate) fn set_restoring(&mut self, restoring: bool) {
        self.restoring = restoring;
        for task in &mut self.tasks {
            if let Some(sub) = task.subprocess.as_deref_mut() {
                sub.set_restoring(restoring);
            }
        }
    }

    fn guard_mutable(&self) -> Result<(), EngineError> {
        if self.read_only && !self.restoring {
            return Err(EngineError::IllegalState);
        }
        Ok(())
    }

    /// True once no task is ready or waiting, at any nesting depth.
    pub fn is_completed(&self) -> bool {
        !self.tasks.iter().any(|t| t.state.is_active())
    }

    /// Process scope plus the task scope on top, what conditions and
    /// scripts evaluate against.
    pub(crate) fn eval_scope(&self, task: TaskId) -> DataMap {
        let mut scope = self.data.clone();
        for (k, v) in &self.tasks[task].data {
            scope.insert(k.clone(), v.clone());
        }
        scope
    }

    pub(crate) fn spawn_child(&mut self, parent: TaskId, node: NodeIndex) -> TaskId {
        let data = self.tasks[parent].data.clone();
        let task = Task::new(node, Some(parent), data, self.services.clock.now());
        let tid = self.tasks.len();
        self.tasks.push(task);
        self.tasks[parent].children.push(tid);
        debug!(node = %self.spec.nodes[node].id, "task created");
        tid
    }

    /// Complete every ready automatic task, drive nested workflows and
    /// promote internally satisfied waits, until nothing moves. Timer and
    /// message waits are left alone; they belong to
    /// [`refresh_waiting_tasks`] and [`accept_message`].
    pub fn do_engine_steps(&mut self) -> Result<(), EngineError> {
        self.guard_mutable()?;
        self.run_engine_steps()?;
        Ok(())
    }

    pub(crate) fn run_engine_steps(&mut self) -> Result<bool, EngineError> {
        let mut progressed_any = false;
        loop {
            let mut progressed = false;

            // Collect first, the tree changes while we flush.
            let ready: Vec<TaskId> = self
                .tasks
                .iter()
                .enumerate()
                .filter(|(_, t)| {
                    t.state == TaskState::Ready
                        && nodes::is_automatic(&self.spec.nodes[t.node].kind)
                })
                .map(|(tid, _)| tid)
                .collect();
            for tid in ready {
                // A boundary event firing earlier in the batch may have
                // cancelled this one.
                if self.tasks[tid].state != TaskState::Ready {
                    continue;
                }
                self.complete_and_advance(tid)?;
                progressed = true;
            }

            for tid in 0..self.tasks.len() {
                if self.tasks[tid].state != TaskState::Waiting {
                    continue;
                }
                let Some(mut sub) = self.tasks[tid].subprocess.take() else {
                    continue;
                };
                let result = sub.run_engine_steps();
                self.tasks[tid].subprocess = Some(sub);
                progressed |= result?;
            }

            for tid in 0..self.tasks.len() {
                if self.tasks[tid].state == TaskState::Waiting
                    && nodes::internal_wait_over(self, tid)
                {
                    self.tasks[tid].state = TaskState::Ready;
                    let node = self.tasks[tid].node;
                    debug!(node = %self.spec.nodes[node].id, "waiting task promoted");
                    progressed = true;
                }
            }

            if !progressed {
                break;
            }
            progressed_any = true;
        }
        Ok(progressed_any)
    }

    /// Poll every waiting task, promoting those whose wait is over: timers
    /// that elapsed, joins that unblocked, subprocesses that drained.
    pub fn refresh_waiting_tasks(&mut self) -> Result<(), EngineError> {
        self.guard_mutable()?;
        self.refresh_inner();
        Ok(())
    }

    fn refresh_inner(&mut self) {
        for tid in 0..self.tasks.len() {
            if self.tasks[tid].state != TaskState::Waiting {
                continue;
            }
            if let Some(mut sub) = self.tasks[tid].subprocess.take() {
                sub.refresh_inner();
                self.tasks[tid].subprocess = Some(sub);
            }
            if nodes::internal_wait_over(self, tid) || nodes::external_wait_over(self, tid) {
                self.tasks[tid].state = TaskState::Ready;
                let node = self.tasks[tid].node;
                debug!(node = %self.spec.nodes[node].id, "waiting task promoted");
            }
        }
    }

    /// Deliver a message: refresh and step to quiescence first, then offer
    /// it to every waiting task at any depth. Consuming tasks become ready
    /// but are not stepped; the next `do_engine_steps` picks them up.
    pub fn accept_message(&mut self, message: &Message) -> Result<(), EngineError> {
        self.guard_mutable()?;
        self.refresh_inner();
        self.run_engine_steps()?;
        let consumed = self.offer_message(message);
        if consumed == 0 {
            warn!(message = %message.name, "message matched no waiting task");
        }
        Ok(())
    }

    fn offer_message(&mut self, message: &Message) -> usize {
        let mut consumed = 0;
        for tid in 0..self.tasks.len() {
            if self.tasks[tid].state != TaskState::Waiting {
                continue;
            }
            if let Some(mut sub) = self.tasks[tid].subprocess.take() {
                consumed += sub.offer_message(message);
                self.tasks[tid].subprocess = Some(sub);
            }
            if nodes::offer_message(self, tid, message) {
                consumed += 1;
            }
        }
        consumed
    }

    /// Externally complete a ready task, typically a user task, merging
    /// the given data into its scope first. Works at any nesting depth.
    pub fn complete_task(&mut self, id: Uuid, data: Option<DataMap>) -> Result<(), EngineError> {
        self.guard_mutable()?;
        let path = self.find_task_path(id).ok_or(EngineError::UnknownTask(id))?;
        let (leaf, prefix) = match path.split_last() {
            Some((leaf, prefix)) => (*leaf, prefix),
            None => return Err(EngineError::UnknownTask(id)),
        };
        let wf = self.workflow_at_mut(prefix);
        let task = &mut wf.tasks[leaf];
        if task.state != TaskState::Ready {
            return Err(EngineError::TaskNotReady {
                node: wf.spec.nodes[task.node].id.clone(),
                state: task.state,
            });
        }
        if let Some(data) = data {
            task.data.extend(data);
        }
        wf.complete_and_advance(leaf)?;
        Ok(())
    }

    /// Call-activity task ids leading to the workflow holding `id`, ending
    /// with the task's own arena index.
    fn find_task_path(&self, id: Uuid) -> Option<Vec<TaskId>> {
        for (tid, task) in self.tasks.iter().enumerate() {
            if task.id == id {
                return Some(vec![tid]);
            }
            if let Some(sub) = &task.subprocess {
                if let Some(mut rest) = sub.find_task_path(id) {
                    let mut path = vec![tid];
                    path.append(&mut rest);
                    return Some(path);
                }
            }
        }
        None
    }

    fn workflow_at_mut(&mut self, path: &[TaskId]) -> &mut Workflow {
        let mut wf = self;
        for &tid in path {
            wf = wf.tasks[tid]
                .subprocess
                .as_deref_mut()
                .expect("call activity task owns its subprocess");
        }
        wf
    }

    pub(crate) fn complete_and_advance(&mut self, task: TaskId) -> Result<(), EngineError> {
        nodes::on_completed(self, task)?;
        self.tasks[task].state = TaskState::Completed;
        let node = self.tasks[task].node;
        debug!(node = %self.spec.nodes[node].id, task = %self.tasks[task].id, "task completed");
        self.resolve_boundary_siblings(task);
        for (flow, target) in nodes::outgoing_to_fire(self, task)? {
            if nodes::gateways::route_arrival(self, task, &flow, target)?.is_none() {
                let child = self.spawn_child(task, target);
                nodes::on_created(self, child)?;
            }
        }
        Ok(())
    }

    /// Under a boundary split, host and events race: whichever completes
    /// first cancels the others.
    fn resolve_boundary_siblings(&mut self, task: TaskId) {
        let Some(parent) = self.tasks[task].parent else {
            return;
        };
        if !matches!(self.spec.nodes[self.tasks[parent].node].kind, NodeKind::BoundarySplit) {
            return;
        }
        let fired_event =
            matches!(self.spec.nodes[self.tasks[task].node].kind, NodeKind::BoundaryEvent { .. });
        let siblings: Vec<TaskId> =
            self.tasks[parent].children.iter().copied().filter(|&c| c != task).collect();
        for sibling in siblings {
            let sibling_is_event = matches!(
                self.spec.nodes[self.tasks[sibling].node].kind,
                NodeKind::BoundaryEvent { .. }
            );
            if fired_event || sibling_is_event {
                self.cancel_subtree(sibling);
            }
        }
    }

    fn cancel_subtree(&mut self, task: TaskId) {
        if let Some(mut sub) = self.tasks[task].subprocess.take() {
            sub.cancel_inner(false);
            self.tasks[task].subprocess = Some(sub);
        }
        let children = self.tasks[task].children.clone();
        for child in children {
            self.cancel_subtree(child);
        }
        if !self.tasks[task].state.is_terminal() {
            self.tasks[task].state = TaskState::Cancelled;
            let node = self.tasks[task].node;
            debug!(node = %self.spec.nodes[node].id, "task cancelled");
        }
    }

    /// Cancel every non-terminal task in the tree.
    pub fn cancel(&mut self, success: bool) -> Result<(), EngineError> {
        self.guard_mutable()?;
        self.cancel_inner(success);
        Ok(())
    }

    pub(crate) fn cancel_inner(&mut self, success: bool) {
        self.success = success;
        for tid in 0..self.tasks.len() {
            if let Some(mut sub) = self.tasks[tid].subprocess.take() {
                sub.cancel_inner(success);
                self.tasks[tid].subprocess = Some(sub);
            }
            if !self.tasks[tid].state.is_terminal() {
                self.tasks[tid].state = TaskState::Cancelled;
            }
        }
        info!(workflow = %self.name, success, "workflow cancelled");
    }

    pub fn get_tasks(&self) -> Vec<TaskInfo> {
        let mut out = Vec::new();
        self.collect_tasks(|_, _| true, &mut out);
        out
    }

    pub fn get_ready_user_tasks(&self) -> Vec<TaskInfo> {
        let mut out = Vec::new();
        self.collect_tasks(
            |wf, t| {
                t.state == TaskState::Ready && !nodes::is_automatic(&wf.spec.nodes[t.node].kind)
            },
            &mut out,
        );
        out
    }

    pub fn get_waiting_tasks(&self) -> Vec<TaskInfo> {
        let mut out = Vec::new();
        self.collect_tasks(|_, t| t.state == TaskState::Waiting, &mut out);
        out
    }

    fn collect_tasks<F>(&self, filter: F, out: &mut Vec<TaskInfo>)
    where
        F: Fn(&Workflow, &Task) -> bool + Copy,
    {
        let mut chain = self.outer_names.clone();
        chain.push(self.name.clone());
        for task in &self.tasks {
            if filter(self, task) {
                out.push(TaskInfo {
                    id: task.id,
                    node: self.spec.nodes[task.node].id.clone(),
                    state: task.state,
                    workflow: chain.clone(),
                    data: task.data.clone(),
                });
            }
            if let Some(sub) = &task.subprocess {
                sub.collect_tasks(filter, out);
            }
        }
    }
}
