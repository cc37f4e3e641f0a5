use serde_json::{json, Value};
use tracing::{debug, info};
use crate::error::EngineError;
use crate::runtime::blueprint::{Cardinality, LoopCharacteristics, TaskSpec};
use crate::runtime::context::{Context, Data};
use crate::runtime::instance::ProcessInstance;
use crate::runtime::task::{DataScope, TaskId, TaskRole, TaskState};

/// 多实例组的聚合状态 (保存在组任务上)
#[derive(Debug, Clone, Default)]
pub(crate) struct GroupState {
    /// Elements handed out one per instance, when iterating a collection
    pub(crate) items: Option<Vec<Value>>,
    pub(crate) count: usize,
    /// Index of the next instance to spawn
    pub(crate) next: usize,
    /// Output items by instance index
    pub(crate) results: Vec<Value>,
    /// Finished iterations
    pub(crate) iterations: usize,
}

enum AfterInstance {
    Wait,
    Spawn,
    Finish,
}

fn loop_of(spec: &TaskSpec) -> Result<&LoopCharacteristics, EngineError> {
    spec.loop_characteristics.as_ref().ok_or_else(|| EngineError::Data {
        task: spec.name.clone(),
        message: "task has no loop characteristics".to_string(),
    })
}

impl ProcessInstance {
    /// The group task `id` became ready: size it and spawn the first instances.
    pub(crate) fn start_group(&mut self, id: TaskId) -> Result<(), EngineError> {
        let (group, initial) = match self.plan_group(id) {
            Ok(plan) => plan,
            Err(err) => return self.fail_task(id, err),
        };

        let task = &mut self.tree[id];
        task.state = TaskState::Started;
        debug!(task = %task.name(), count = group.count, initial, "Starting loop group");
        task.group = Some(group);

        if initial == 0 {
            return self.finish_group(id);
        }
        for _ in 0..initial {
            self.spawn_instance(id);
        }
        Ok(())
    }

    /// Returns the fresh group state and how many instances to spawn right away.
    fn plan_group(&self, id: TaskId) -> Result<(GroupState, usize), EngineError> {
        let task = &self.tree[id];
        let spec = task.spec();
        let ctx = Context::new(self.id(), task, &self.engine, self.visible(task.scope));

        match loop_of(spec)? {
            LoopCharacteristics::Standard { condition, test_before, .. } => {
                let initial = if *test_before && !ctx.evaluate_bool(condition)? { 0 } else { 1 };
                Ok((GroupState::default(), initial))
            }
            LoopCharacteristics::MultiInstance { sequential, cardinality, .. } => {
                let (count, items) = match cardinality {
                    Cardinality::Fixed(n) => (*n, None),
                    Cardinality::Expression(expr) => {
                        let value = ctx.evaluate(expr)?;
                        let n = value
                            .as_u64()
                            .or_else(|| value.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
                            .ok_or_else(|| EngineError::Data {
                                task: spec.name.clone(),
                                message: format!("cardinality `{}` gave {}", expr.source(), value),
                            })?;
                        (n as usize, None)
                    }
                    Cardinality::Collection(name) => match ctx.get_var(name) {
                        Some(Value::Array(items)) => (items.len(), Some(items.clone())),
                        other => {
                            return Err(EngineError::Data {
                                task: spec.name.clone(),
                                message: format!("collection '{}' is not an array: {:?}", name, other),
                            })
                        }
                    },
                };
                let initial = match (count, *sequential) {
                    (0, _) => 0,
                    (_, true) => 1,
                    (n, false) => n,
                };
                let group = GroupState {
                    items,
                    count,
                    results: vec![Value::Null; count],
                    ..GroupState::default()
                };
                Ok((group, initial))
            }
        }
    }

    fn spawn_instance(&mut self, group: TaskId) {
        let graph = self.tree[group].graph.clone();
        let spec_index = self.tree[group].spec;
        let outer = self.tree[group].scope;
        let Some(state) = self.tree[group].group.as_mut() else {
            return;
        };
        let index = state.next;
        state.next += 1;
        let item = state
            .items
            .as_ref()
            .and_then(|items| items.get(index).cloned())
            .unwrap_or_else(|| json!(index));

        let id = self.tree.add_child(group, graph.clone(), spec_index, TaskRole::Instance { group, index }, outer);
        if let Some(LoopCharacteristics::MultiInstance { input_item, .. }) = &graph.spec(spec_index).loop_characteristics {
            // each iteration keeps its own variables, reading through to the group's scope
            let mut vars = Data::new();
            if let Some(name) = input_item {
                vars.insert(name.clone(), item);
            }
            let task = &mut self.tree[id];
            task.scope = id;
            task.data = Some(DataScope::new(vars, Some(outer)));
        }
        debug!(group = %self.tree[group].name(), index, "Spawned instance");
        self.activate(id);
    }

    /// An instance of `group` completed.
    pub(crate) fn on_instance_done(&mut self, group: TaskId, instance: TaskId) -> Result<(), EngineError> {
        if self.tree[group].state != TaskState::Started {
            return Ok(());
        }
        match self.after_instance(group, instance) {
            Ok(AfterInstance::Wait) => Ok(()),
            Ok(AfterInstance::Spawn) => {
                self.spawn_instance(group);
                Ok(())
            }
            Ok(AfterInstance::Finish) => {
                self.cancel_pending_instances(group);
                self.finish_group(group)
            }
            Err(err) => {
                self.cancel_pending_instances(group);
                self.fail_task(group, err)
            }
        }
    }

    fn after_instance(&mut self, group: TaskId, instance: TaskId) -> Result<AfterInstance, EngineError> {
        let graph = self.tree[group].graph.clone();
        let spec = graph.spec(self.tree[group].spec);
        let mut data = self.visible(self.tree[group].scope);
        let index = self.tree[instance].instance_index().unwrap_or_default();

        match loop_of(spec)? {
            LoopCharacteristics::Standard { condition, maximum, .. } => {
                let iterations = self.bump_group(group, |state| {
                    state.iterations += 1;
                    state.count = state.iterations;
                })?;
                let ctx = Context::new(self.id(), &self.tree[group], &self.engine, data);
                if !ctx.evaluate_bool(condition)? {
                    return Ok(AfterInstance::Finish);
                }
                match maximum.or(self.engine.config().default_loop_maximum) {
                    Some(maximum) if iterations >= maximum => Err(EngineError::LoopBoundsExceeded {
                        task: spec.name.clone(),
                        maximum,
                    }),
                    _ => Ok(AfterInstance::Spawn),
                }
            }
            LoopCharacteristics::MultiInstance {
                sequential,
                output_item,
                output_collection,
                completion_condition,
                ..
            } => {
                let output = match output_item {
                    Some(name) => self.visible(instance).get(name).cloned().unwrap_or(Value::Null),
                    None => Value::Null,
                };
                let mut results = Vec::new();
                let mut count = 0;
                let completed = self.bump_group(group, |state| {
                    if let Some(slot) = state.results.get_mut(index) {
                        *slot = output;
                    }
                    state.iterations += 1;
                    results = state.results.clone();
                    count = state.count;
                })?;

                if let Some(condition) = completion_condition {
                    if let Some(name) = output_collection {
                        data.insert(name.clone(), Value::Array(results));
                    }
                    data.insert("nrOfInstances".to_string(), json!(count));
                    data.insert("nrOfCompletedInstances".to_string(), json!(completed));
                    let ctx = Context::new(self.id(), &self.tree[group], &self.engine, data);
                    if ctx.evaluate_bool(condition)? {
                        info!(task = %spec.name, completed, count, "Completion condition met");
                        return Ok(AfterInstance::Finish);
                    }
                }

                if completed >= count {
                    Ok(AfterInstance::Finish)
                } else if *sequential {
                    Ok(AfterInstance::Spawn)
                } else {
                    Ok(AfterInstance::Wait)
                }
            }
        }
    }

    /// Applies `update` to the group state and returns the finished iterations.
    fn bump_group(&mut self, group: TaskId, update: impl FnOnce(&mut GroupState)) -> Result<usize, EngineError> {
        let task = &mut self.tree[group];
        match task.group.as_mut() {
            Some(state) => {
                update(state);
                Ok(state.iterations)
            }
            None => Err(EngineError::Data {
                task: task.name().to_string(),
                message: "group state missing".to_string(),
            }),
        }
    }

    fn finish_group(&mut self, group: TaskId) -> Result<(), EngineError> {
        let graph = self.tree[group].graph.clone();
        let spec = graph.spec(self.tree[group].spec);
        if let Some(LoopCharacteristics::MultiInstance { output_collection: Some(name), .. }) = &spec.loop_characteristics {
            let results = self.tree[group].group.as_ref().map(|g| g.results.clone()).unwrap_or_default();
            let scope = self.tree[group].scope;
            self.write_scope(scope, Data::from([(name.clone(), Value::Array(results))]));
        }
        debug!(task = %spec.name, "Loop group finished");
        self.finish_activity(group, false)
    }

    fn cancel_pending_instances(&mut self, group: TaskId) {
        let pending: Vec<TaskId> = self.tree[group]
            .children
            .iter()
            .copied()
            .filter(|&c| self.tree[c].is_instance() && self.tree[c].state.is_pending())
            .collect();
        for id in pending {
            self.cancel_subtree(id);
        }
    }
}
