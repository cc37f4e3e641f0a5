use std::sync::Arc;
use tracing::{debug, info};
use crate::error::EngineError;
use crate::nodes::flow;
use crate::runtime::blueprint::{SpecGraph, TaskKind};
use crate::runtime::context::{Context, Data};
use crate::runtime::instance::ProcessInstance;
use crate::runtime::task::{DataScope, ScopeState, TaskId, TaskRole, TaskState};

impl ProcessInstance {
    /// Resolves the inner graph of container `id` and the data scope its
    /// subtree will use. `None` keeps the scope the task already owns (a
    /// multi-instance iteration).
    pub(crate) fn prepare_entry(
        &self,
        id: TaskId,
        visible: &Data,
    ) -> Result<(Arc<SpecGraph>, Option<DataScope>), EngineError> {
        let task = &self.tree[id];
        let spec = task.spec();
        match &spec.kind {
            TaskKind::SubProcess(graph) | TaskKind::Transaction(graph) => {
                let scope = match task.data {
                    Some(_) => None,
                    // reads fall through to the outer scope, writes stay inside
                    None => Some(DataScope::new(Data::new(), Some(task.scope))),
                };
                Ok((graph.clone(), scope))
            }
            TaskKind::CallActivity(key) => {
                let graph = self
                    .engine
                    .process(key)
                    .ok_or_else(|| EngineError::ProcessNotFound(key.clone()))?;

                let mut vars = graph.variables.clone();
                if graph.data_inputs.is_empty() {
                    vars.extend(visible.iter().map(|(k, v)| (k.clone(), v.clone())));
                } else {
                    for name in &graph.data_inputs {
                        let value = visible.get(name).ok_or_else(|| EngineError::Data {
                            task: spec.name.clone(),
                            message: format!("missing data input '{}' for process '{}'", name, key),
                        })?;
                        vars.insert(name.clone(), value.clone());
                    }
                }
                // the called process sees only what was copied in
                Ok((graph, Some(DataScope::new(vars, None))))
            }
            _ => Err(EngineError::Data {
                task: spec.name.clone(),
                message: "task has no inner graph".to_string(),
            }),
        }
    }

    /// Starts the inner graph of a container below it.
    pub(crate) fn enter(&mut self, id: TaskId, graph: Arc<SpecGraph>, scope: Option<DataScope>) {
        let task = &mut self.tree[id];
        if let Some(scope) = scope {
            task.data = Some(scope);
        }
        task.state = TaskState::Started;
        if matches!(task.spec().kind, TaskKind::Transaction(_)) {
            info!(task = %task.name(), "Transaction opened");
        } else {
            debug!(task = %task.name(), graph = %graph.id, "Entering subprocess");
        }

        let start = self.tree.add_child(id, graph.clone(), graph.start, TaskRole::Inner, id);
        self.activate(start);
    }

    /// The subtree of container `id` went quiet: hand its outputs to the
    /// enclosing scope and complete the container.
    pub(crate) fn on_subtree_complete(&mut self, id: TaskId) -> Result<(), EngineError> {
        let outputs = match self.collect_outputs(id) {
            Ok(outputs) => outputs,
            Err(err) => return self.fail_task(id, err),
        };

        let scope = self.tree[id].scope;
        if scope != id {
            self.write_scope(scope, outputs);
            let task = &mut self.tree[id];
            if let Some(data) = task.data.as_mut() {
                data.state = ScopeState::Committed;
            }
            if matches!(task.spec().kind, TaskKind::Transaction(_)) {
                info!(task = %task.name(), "Transaction committed");
            }
        }
        self.finish_activity(id, true)
    }

    /// Transactions hand over every write; subprocesses and call activities
    /// their declared outputs when they name any.
    fn collect_outputs(&self, id: TaskId) -> Result<Data, EngineError> {
        let task = &self.tree[id];
        let spec = task.spec();
        let vars = task.own_data().cloned().unwrap_or_default();

        let declared: Vec<String> = match &spec.kind {
            TaskKind::Transaction(_) => Vec::new(),
            TaskKind::CallActivity(_) if spec.outputs.is_empty() => task
                .children
                .iter()
                .map(|&c| &self.tree[c])
                .find(|c| c.role == TaskRole::Inner)
                .map(|c| c.graph.data_outputs.clone())
                .unwrap_or_default(),
            _ => spec.outputs.clone(),
        };
        if declared.is_empty() {
            return Ok(vars);
        }

        let mut outputs = Data::new();
        for name in declared {
            let value = vars.get(&name).ok_or_else(|| EngineError::Data {
                task: spec.name.clone(),
                message: format!("declared output '{}' was never written", name),
            })?;
            outputs.insert(name, value.clone());
        }
        Ok(outputs)
    }

    /// Post-script, flow selection and completion for tasks that finish
    /// outside of their own step (containers and groups).
    pub(crate) fn finish_activity(&mut self, id: TaskId, postscript: bool) -> Result<(), EngineError> {
        let (flows, writes) = match self.conclude(id, postscript) {
            Ok(v) => v,
            Err(err) => return self.fail_task(id, err),
        };
        let scope = self.tree[id].scope;
        self.write_scope(scope, writes);
        self.complete_task(id, &flows)
    }

    fn conclude(&self, id: TaskId, postscript: bool) -> Result<(Vec<usize>, Data), EngineError> {
        let task = &self.tree[id];
        let mut ctx = Context::new(self.id(), task, &self.engine, self.visible(task.scope));
        if postscript {
            if let Some(post) = &task.spec().postscript {
                ctx.run_script(post)?;
            }
        }
        let flows = flow::select_flows(&ctx)?;
        Ok((flows, ctx.into_writes()))
    }

    /// Discards what the task's open data scope holds.
    pub(crate) fn rollback(&mut self, id: TaskId) {
        let task = &mut self.tree[id];
        let Some(data) = task.data.as_mut() else {
            return;
        };
        if data.state != ScopeState::Open {
            return;
        }
        data.rollback();
        if matches!(task.spec().kind, TaskKind::Transaction(_)) {
            info!(task = %task.name(), "Transaction rolled back");
        } else {
            debug!(task = %task.name(), "Scope rolled back");
        }
    }
}
