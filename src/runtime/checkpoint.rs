//! Compact fingerprint of a running workflow: one path marker per active
//! task, sorted and semicolon-joined, reconstructable without any event
//! history.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::EngineError;
use crate::graph::{NodeIndex, NodeKind, Subprocess};
use crate::nodes::activities;
use crate::runtime::task::{Task, TaskId, TaskState};
use crate::runtime::workflow::{ROOT, Workflow};

const COMPLETE: &str = "COMPLETE";

impl Workflow {
    /// Serialize the active frontier. Each marker is the flow from the
    /// task's parent into it (the start event's id for a bare root task),
    /// suffixed `:R` or `:W` and prefixed with the enclosing workflow
    /// names, outermost first. Markers sort lexicographically, so equal
    /// frontiers always produce equal strings. An empty frontier is the
    /// literal `COMPLETE`.
    pub fn get_workflow_state(&self) -> String {
        let mut markers = Vec::new();
        self.collect_markers(&mut markers);
        if markers.is_empty() {
            return COMPLETE.to_string();
        }
        markers.sort();
        markers.join(";")
    }

    fn collect_markers(&self, out: &mut Vec<String>) {
        let prefix: String = self.outer_names.iter().map(|n| format!("{n}:")).collect();
        for task in &self.tasks {
            if task.state.is_active() {
                let suffix = if task.state == TaskState::Ready { "R" } else { "W" };
                out.push(format!("{prefix}{}:{suffix}", self.marker_segment(task)));
            }
            if let Some(sub) = &task.subprocess {
                sub.collect_markers(out);
            }
        }
    }

    fn marker_segment(&self, task: &Task) -> String {
        let Some(parent) = task.parent else {
            return self.spec.nodes[self.spec.start].id.clone();
        };
        let from = self.tasks[parent].node;
        match self.spec.transition_between(from, task.node) {
            Some(t) => t.id.clone(),
            None => {
                warn!(node = %self.spec.nodes[task.node].id, "active task has no parent flow, using its node id");
                self.spec.nodes[task.node].id.clone()
            }
        }
    }

    /// Rebuild the task tree from a fingerprint produced by
    /// [`Workflow::get_workflow_state`]. The current tree is discarded;
    /// process data and clocks are not part of a fingerprint and are left
    /// alone, so restored timers measure from the restore itself. On error
    /// the workflow is reset to its initial state.
    ///
    /// Restore is allowed on a read-only workflow; the restoring flag
    /// lifts the guard for the duration.
    pub fn restore_workflow_state(&mut self, state: &str) -> Result<(), EngineError> {
        self.set_restoring(true);
        let result = self.restore_inner(state);
        if result.is_err() {
            self.reset_tree(true);
        }
        self.set_restoring(false);
        if result.is_ok() {
            info!(workflow = %self.name, state = %state, "workflow state restored");
        }
        result
    }

    fn restore_inner(&mut self, state: &str) -> Result<(), EngineError> {
        if state == COMPLETE {
            self.reset_tree(false);
            self.tasks[ROOT].state = TaskState::Cancelled;
            return Ok(());
        }
        self.reset_tree(false);
        for marker in state.split(';') {
            self.place_marker(marker)?;
        }
        self.finalize_restore();
        Ok(())
    }

    fn place_marker(&mut self, marker: &str) -> Result<(), EngineError> {
        let parts: Vec<&str> = marker.split(':').collect();
        if parts.len() < 2 {
            return Err(EngineError::RestoreResolution(format!("malformed marker '{marker}'")));
        }
        let state = match parts[parts.len() - 1] {
            "R" => TaskState::Ready,
            "W" => TaskState::Waiting,
            other => {
                return Err(EngineError::RestoreResolution(format!(
                    "unknown state '{other}' in marker '{marker}'"
                )));
            }
        };
        let segment = parts[parts.len() - 2];
        let prefixes = &parts[..parts.len() - 2];
        if prefixes.is_empty() {
            return self.place_local(segment, state, marker);
        }
        if prefixes[0] != self.name {
            return Err(EngineError::RestoreResolution(format!(
                "marker '{marker}' names workflow '{}', this is '{}'",
                prefixes[0], self.name
            )));
        }
        self.descend_place(&prefixes[1..], segment, state, marker)
    }

    /// Walk the named call activities, then make the one unnamed final
    /// descent: the innermost workflow's own name never appears in a
    /// marker, so the last hop is found by which call activity's graph
    /// can resolve the segment.
    fn descend_place(
        &mut self,
        named: &[&str],
        segment: &str,
        state: TaskState,
        marker: &str,
    ) -> Result<(), EngineError> {
        if let Some((&ca, rest)) = named.split_first() {
            let node = self
                .spec
                .node_index(ca)
                .filter(|&n| matches!(self.spec.nodes[n].kind, NodeKind::CallActivity { .. }))
                .ok_or_else(|| {
                    EngineError::RestoreResolution(format!(
                        "no call activity '{ca}' in '{}' for '{marker}'",
                        self.name
                    ))
                })?;
            let ca_task = self.materialize_call_task(node, marker)?;
            let mut sub = self.take_subprocess(ca_task, marker)?;
            let result = sub.descend_place(rest, segment, state, marker);
            self.tasks[ca_task].subprocess = Some(sub);
            result
        } else {
            let node = self.find_call_for_segment(segment).ok_or_else(|| {
                EngineError::RestoreResolution(format!(
                    "no call activity in '{}' resolves '{segment}' for '{marker}'",
                    self.name
                ))
            })?;
            let ca_task = self.materialize_call_task(node, marker)?;
            let mut sub = self.take_subprocess(ca_task, marker)?;
            let result = sub.place_local(segment, state, marker);
            self.tasks[ca_task].subprocess = Some(sub);
            result
        }
    }

    fn take_subprocess(&mut self, task: TaskId, marker: &str) -> Result<Box<Workflow>, EngineError> {
        self.tasks[task].subprocess.take().ok_or_else(|| {
            EngineError::RestoreResolution(format!("call activity lost its subprocess for '{marker}'"))
        })
    }

    fn place_local(
        &mut self,
        segment: &str,
        state: TaskState,
        marker: &str,
    ) -> Result<(), EngineError> {
        let route = self.route_for_segment(segment).ok_or_else(|| {
            EngineError::RestoreResolution(format!(
                "no flow '{segment}' reachable in '{}' for '{marker}'",
                self.name
            ))
        })?;
        let leaf = self.place_route(&route)?;
        self.tasks[leaf].state = state;
        if state == TaskState::Waiting
            && matches!(
                self.spec.nodes[self.tasks[leaf].node].kind,
                NodeKind::ParallelGateway | NodeKind::InclusiveGateway
            )
        {
            // A restored waiting join knows at least its own parent edge;
            // dead-path analysis recovers the rest.
            self.tasks[leaf].arrivals.insert(segment.to_string());
        }
        debug!(workflow = %self.name, marker = %marker, "marker placed");
        Ok(())
    }

    /// A marker whose segment equals the start event's id pins the root
    /// task itself; anything else resolves through the flow with that id.
    fn route_for_segment(&self, segment: &str) -> Option<Vec<NodeIndex>> {
        if self.spec.nodes[self.spec.start].id == segment {
            return Some(vec![self.spec.start]);
        }
        self.spec.route_to_transition(segment)
    }

    fn find_call_for_segment(&self, segment: &str) -> Option<NodeIndex> {
        self.spec.nodes.iter().position(|n| {
            let NodeKind::CallActivity { subprocess, .. } = &n.kind else {
                return false;
            };
            let graph = match subprocess {
                Subprocess::Static(g) => Arc::clone(g),
                Subprocess::Named(name) => match self.services.resolver.resolve(name) {
                    Ok(g) => g,
                    Err(_) => return false,
                },
            };
            graph.transition_by_id(segment).is_some() || graph.nodes[graph.start].id == segment
        })
    }

    fn materialize_call_task(
        &mut self,
        node: NodeIndex,
        marker: &str,
    ) -> Result<TaskId, EngineError> {
        let route = self.spec.route_to_node(node).ok_or_else(|| {
            EngineError::RestoreResolution(format!(
                "call activity '{}' unreachable from start for '{marker}'",
                self.spec.nodes[node].id
            ))
        })?;
        self.place_route(&route)
    }

    /// Materialize a route as future tasks, reusing the chain built by
    /// markers sharing a prefix. Call activities on the way get an inert
    /// subprocess so deeper markers have somewhere to land.
    fn place_route(&mut self, route: &[NodeIndex]) -> Result<TaskId, EngineError> {
        let mut current = ROOT;
        for &node in &route[1..] {
            let existing = self.tasks[current]
                .children
                .iter()
                .copied()
                .find(|&c| self.tasks[c].node == node);
            current = match existing {
                Some(child) => child,
                None => {
                    let tid = self.spawn_child(current, node);
                    if matches!(self.spec.nodes[node].kind, NodeKind::CallActivity { .. }) {
                        activities::attach_subprocess(self, tid, false)?;
                    }
                    tid
                }
            };
        }
        Ok(current)
    }

    /// Tasks a route passed through but no marker claimed were already
    /// executed: complete them, except call activities whose subprocess
    /// still holds active tasks, which go back to waiting.
    fn finalize_restore(&mut self) {
        for tid in 0..self.tasks.len() {
            if let Some(mut sub) = self.tasks[tid].subprocess.take() {
                sub.finalize_restore();
                self.tasks[tid].subprocess = Some(sub);
            }
        }
        for tid in 0..self.tasks.len() {
            if self.tasks[tid].state != TaskState::Future {
                continue;
            }
            let active_below =
                self.tasks[tid].subprocess.as_ref().map_or(false, |sub| !sub.is_completed());
            self.tasks[tid].state =
                if active_below { TaskState::Waiting } else { TaskState::Completed };
        }
    }
}
