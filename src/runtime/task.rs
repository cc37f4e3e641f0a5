use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use serde::{Serialize, Deserialize};
use uuid::Uuid;
use crate::runtime::blueprint::{SpecGraph, SpecIndex, TaskSpec};
use crate::runtime::context::Data;
use crate::runtime::multi_instance::GroupState;
use crate::runtime::signal::Signal;

pub type TaskId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Future,
    Waiting,
    Ready,
    Started,
    Completed,
    Cancelled,
    Error,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Cancelled | TaskState::Error)
    }

    /// Holds a live token (or a prediction of one).
    pub fn is_pending(self) -> bool {
        !self.is_terminal()
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Future => "FUTURE",
            TaskState::Waiting => "WAITING",
            TaskState::Ready => "READY",
            TaskState::Started => "STARTED",
            TaskState::Completed => "COMPLETED",
            TaskState::Cancelled => "CANCELLED",
            TaskState::Error => "ERROR",
        };
        f.pad(s)
    }
}

/// Why a task sits where it does in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRole {
    Root,
    /// Successor predicted from the parent's outgoing flows
    Flow,
    /// Start task of a container's inner graph
    Inner,
    Boundary { owner: TaskId },
    /// One materialized iteration of a loop or multi-instance group
    Instance { group: TaskId, index: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeState {
    Open,
    Committed,
    RolledBack,
}

/// Variables owned by a task; reads fall through to `parent`.
#[derive(Debug, Clone)]
pub struct DataScope {
    pub vars: Data,
    pub parent: Option<TaskId>,
    pub state: ScopeState,
}

impl DataScope {
    pub fn new(vars: Data, parent: Option<TaskId>) -> Self {
        Self {
            vars,
            parent,
            state: ScopeState::Open,
        }
    }

    pub fn rollback(&mut self) {
        self.vars.clear();
        self.state = ScopeState::RolledBack;
    }
}

pub struct Task {
    pub(crate) id: TaskId,
    pub(crate) uuid: Uuid,
    pub(crate) graph: Arc<SpecGraph>,
    pub(crate) spec: SpecIndex,
    pub(crate) state: TaskState,
    pub(crate) parent: Option<TaskId>,
    pub(crate) children: Vec<TaskId>,
    pub(crate) role: TaskRole,
    /// Task whose data scope this task reads from and writes to
    pub(crate) scope: TaskId,
    pub(crate) data: Option<DataScope>,
    /// Index of the parent's outgoing transition this prediction stands for
    pub(crate) via: Option<usize>,
    pub(crate) fired: Option<Signal>,
    /// 汇聚节点已到达的分支
    pub(crate) arrivals: BTreeSet<SpecIndex>,
    pub(crate) group: Option<GroupState>,
}

impl Task {
    pub(crate) fn new(
        id: TaskId,
        graph: Arc<SpecGraph>,
        spec: SpecIndex,
        parent: Option<TaskId>,
        role: TaskRole,
        scope: TaskId,
    ) -> Self {
        Self {
            id,
            uuid: Uuid::new_v4(),
            graph,
            spec,
            state: TaskState::Future,
            parent,
            children: Vec::new(),
            role,
            scope,
            data: None,
            via: None,
            fired: None,
            arrivals: BTreeSet::new(),
            group: None,
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn parent(&self) -> Option<TaskId> {
        self.parent
    }

    pub fn children(&self) -> &[TaskId] {
        &self.children
    }

    pub fn role(&self) -> TaskRole {
        self.role
    }

    pub fn graph(&self) -> &Arc<SpecGraph> {
        &self.graph
    }

    pub fn spec(&self) -> &TaskSpec {
        self.graph.spec(self.spec)
    }

    pub fn name(&self) -> &str {
        &self.spec().name
    }

    pub fn description(&self) -> &str {
        &self.spec().description
    }

    /// Position inside a multi-instance or loop group.
    pub fn instance_index(&self) -> Option<usize> {
        match self.role {
            TaskRole::Instance { index, .. } => Some(index),
            _ => None,
        }
    }

    /// Signal that fired this boundary or catch event.
    pub fn fired(&self) -> Option<&Signal> {
        self.fired.as_ref()
    }

    /// Variables owned by this task, if it opens a data scope.
    pub fn own_data(&self) -> Option<&Data> {
        self.data.as_ref().map(|d| &d.vars)
    }

    pub fn scope_state(&self) -> Option<ScopeState> {
        self.data.as_ref().map(|d| d.state)
    }

    pub(crate) fn is_group(&self) -> bool {
        self.group.is_some()
    }

    pub(crate) fn is_instance(&self) -> bool {
        matches!(self.role, TaskRole::Instance { .. })
    }

    /// A task the engine never runs by itself; it waits for `complete()`.
    pub(crate) fn awaits_caller(&self) -> bool {
        let spec = self.spec();
        spec.is_human() && (spec.loop_characteristics.is_none() || self.is_instance())
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state)
            .field("role", &self.role)
            .field("parent", &self.parent)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(TaskState::Completed.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
        assert!(TaskState::Error.is_terminal());
        assert!(TaskState::Future.is_pending());
        assert!(TaskState::Waiting.is_pending());
    }

    #[test]
    fn states_display_in_upper_case() {
        assert_eq!(TaskState::Waiting.to_string(), "WAITING");
        assert_eq!(serde_json::to_string(&TaskState::Cancelled).unwrap(), "\"CANCELLED\"");
    }
}
