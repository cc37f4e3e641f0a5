use serde::Serialize;
use crate::runtime::instance::ProcessInstance;
use crate::runtime::task::{TaskId, TaskRole, TaskState};

/// One line of the navigation list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NavItem {
    pub task: TaskId,
    pub name: String,
    pub description: String,
    pub state: TaskState,
    pub kind: &'static str,
    pub depth: usize,
    /// Position inside a loop or multi-instance group
    pub instance: Option<usize>,
}

impl ProcessInstance {
    /// Flattened depth-first view of the tree for progress display.
    ///
    /// A container's own subtree comes before its successors, boundary
    /// branches after them. Loop groups are replaced by their iterations.
    pub fn navigation(&self) -> Vec<NavItem> {
        let mut items = Vec::new();
        for child in self.ordered_children(0) {
            self.project(child, 0, &mut items);
        }
        items
    }

    fn project(&self, id: TaskId, depth: usize, items: &mut Vec<NavItem>) {
        let task = &self.tree[id];
        let flattened = task.is_group() && task.children.iter().any(|&c| self.tree[c].is_instance());
        if !flattened {
            items.push(NavItem {
                task: id,
                name: task.name().to_string(),
                description: task.description().to_string(),
                state: task.state,
                kind: task.spec().kind_name(),
                depth,
                instance: task.instance_index(),
            });
        }
        for child in self.ordered_children(id) {
            let nested = matches!(self.tree[child].role, TaskRole::Inner) && !flattened;
            self.project(child, if nested { depth + 1 } else { depth }, items);
        }
    }

    fn ordered_children(&self, id: TaskId) -> Vec<TaskId> {
        let mut children = self.tree[id].children.clone();
        children.sort_by_key(|&c| {
            let rank = match self.tree[c].role {
                TaskRole::Inner | TaskRole::Instance { .. } => 0,
                TaskRole::Flow | TaskRole::Root => 1,
                TaskRole::Boundary { .. } => 2,
            };
            (rank, c)
        });
        children
    }
}
