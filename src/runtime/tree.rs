use std::ops::{Index, IndexMut};
use std::sync::Arc;
use crate::runtime::blueprint::{SpecGraph, SpecIndex};
use crate::runtime::task::{DataScope, Task, TaskId, TaskRole, TaskState};

/// Arena holding every task of one instance; a child's id is always larger than its parent's.
#[derive(Debug, Default)]
pub struct TaskTree {
    tasks: Vec<Task>,
}

impl TaskTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_root(&mut self, graph: Arc<SpecGraph>, data: DataScope) -> TaskId {
        let id = self.tasks.len();
        let mut root = Task::new(id, graph, SpecGraph::ROOT, None, TaskRole::Root, id);
        root.state = TaskState::Started;
        root.data = Some(data);
        self.tasks.push(root);
        id
    }

    pub fn add_child(
        &mut self,
        parent: TaskId,
        graph: Arc<SpecGraph>,
        spec: SpecIndex,
        role: TaskRole,
        scope: TaskId,
    ) -> TaskId {
        let id = self.tasks.len();
        self.tasks.push(Task::new(id, graph, spec, Some(parent), role, scope));
        self.tasks[parent].children.push(id);
        id
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.tasks.iter()
    }
}

impl Index<TaskId> for TaskTree {
    type Output = Task;

    fn index(&self, id: TaskId) -> &Task {
        &self.tasks[id]
    }
}

impl IndexMut<TaskId> for TaskTree {
    fn index_mut(&mut self, id: TaskId) -> &mut Task {
        &mut self.tasks[id]
    }
}
