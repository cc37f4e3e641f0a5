use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;
use crate::error::EngineError;
use crate::nodes;
use crate::nodes::flow;
use crate::runtime::blueprint::{SpecGraph, TaskKind};
use crate::runtime::context::{Context, Data};
use crate::runtime::engine::Engine;
use crate::runtime::signal::Signal;
use crate::runtime::syscall::{Outcome, StepSyscall};
use crate::runtime::task::{DataScope, Task, TaskId, TaskRole, TaskState};
use crate::runtime::tree::TaskTree;

/// Why an instance ended in `ERROR`.
#[derive(Debug, Clone, PartialEq)]
pub struct Failure {
    pub task: TaskId,
    pub signal: Signal,
}

/// One running process: the task tree plus its bookkeeping.
pub struct ProcessInstance {
    id: Uuid,
    pub(crate) engine: Arc<Engine>,
    graph: Arc<SpecGraph>,
    pub(crate) tree: TaskTree,
    pub(crate) last_task: Option<TaskId>,
    pub(crate) failure: Option<Failure>,
}

/// What a successful step asks the engine to do.
enum Next {
    Proceed(Vec<usize>),
    Enter(Arc<SpecGraph>, Option<DataScope>),
    Throw(Signal),
    Terminate,
}

struct StepResult {
    next: Next,
    writes: Data,
    broadcasts: Vec<Signal>,
}

impl ProcessInstance {
    pub(crate) fn new(engine: Arc<Engine>, graph: Arc<SpecGraph>, data: Data) -> Self {
        let mut vars = graph.variables.clone();
        vars.extend(data);

        let mut tree = TaskTree::new();
        let root = tree.add_root(graph.clone(), DataScope::new(vars, None));
        let mut instance = Self {
            id: Uuid::new_v4(),
            engine,
            graph: graph.clone(),
            tree,
            last_task: None,
            failure: None,
        };
        let start = instance.tree.add_child(root, graph.clone(), graph.start, TaskRole::Inner, root);
        instance.activate(start);
        info!(instance = %instance.id, process = %graph.id, "Process instantiated");
        instance
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn graph(&self) -> &Arc<SpecGraph> {
        &self.graph
    }

    /// Runs every task the engine can run by itself until nothing changes.
    /// Calling it again without new input is a no-op.
    pub fn advance(&mut self) -> Result<(), EngineError> {
        let max_steps = self.engine.config().max_steps;
        let mut steps = 0;
        loop {
            let mut progressed = false;
            while let Some(id) = self.next_runnable() {
                steps += 1;
                if steps > max_steps {
                    warn!(instance = %self.id, max_steps, "Step limit exceeded");
                    return Err(EngineError::StepLimitExceeded(max_steps));
                }
                self.run_task(id, Data::new())?;
                progressed = true;
            }
            if self.settle()? {
                progressed = true;
            }
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Tasks in `READY`, in creation order.
    pub fn ready_tasks(&self) -> Vec<&Task> {
        self.tasks_in_state(TaskState::Ready)
    }

    /// Supplies external input to a `READY` task and runs it.
    pub fn complete(&mut self, id: TaskId, data: Data) -> Result<(), EngineError> {
        let task = self.tree.get(id).ok_or(EngineError::UnknownTask(id))?;
        if task.state != TaskState::Ready {
            return Err(EngineError::InvalidState { task: id, state: task.state });
        }
        debug!(task = %task.name(), "Completing on behalf of caller");
        self.run_task(id, data)
    }

    /// Injects an event. With a target task the signal travels outwards from
    /// it; without one it is delivered to every waiting listener (messages,
    /// signals and timers only). Returns whether anything caught it.
    pub fn raise_signal(&mut self, signal: Signal, at: Option<TaskId>) -> Result<bool, EngineError> {
        match at {
            Some(id) => {
                if self.tree.get(id).is_none() {
                    return Err(EngineError::UnknownTask(id));
                }
                if self.state().is_terminal() {
                    debug!(%signal, "Instance already finished, ignoring signal");
                    return Ok(false);
                }
                self.raise(signal, id)
            }
            None if signal.is_exceptional() => Err(EngineError::MissingSignalTarget(signal.to_string())),
            None => Ok(self.deliver(&signal)),
        }
    }

    /// Moves the token back to the completed task `id`: everything predicted
    /// or started after it is cancelled and the task is `READY` again.
    ///
    /// Data already written stays. Parallel branches outside the subtree of
    /// `id` are left alone, and every scope around `id` must still be open.
    pub fn reset_to(&mut self, id: TaskId) -> Result<(), EngineError> {
        let task = self.tree.get(id).ok_or(EngineError::UnknownTask(id))?;
        let resettable = matches!(task.role, TaskRole::Flow | TaskRole::Inner) && !task.spec().is_join();
        if !resettable || task.state != TaskState::Completed {
            return Err(EngineError::InvalidState { task: id, state: task.state });
        }
        let mut current = self.enclosing(id);
        while let Some(scope) = current {
            let state = self.tree[scope].state;
            if !state.is_pending() {
                return Err(EngineError::InvalidState { task: scope, state });
            }
            current = self.enclosing(scope);
        }

        info!(task = %self.tree[id].name(), "Resetting token");
        let children = self.tree[id].children.clone();
        for child in children {
            self.cancel_subtree(child);
        }
        let task = &mut self.tree[id];
        task.state = TaskState::Future;
        task.data = None;
        task.fired = None;
        task.group = None;
        task.arrivals.clear();
        self.activate(id);
        Ok(())
    }

    pub fn tasks_in_state(&self, state: TaskState) -> Vec<&Task> {
        self.tree.iter().filter(|t| t.state == state).collect()
    }

    pub fn tasks_for_spec(&self, name: &str) -> Vec<&Task> {
        self.tree
            .iter()
            .filter(|t| t.role != TaskRole::Root && t.name() == name)
            .collect()
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tree.get(id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tree.iter()
    }

    /// Instance-level (root scope) data.
    pub fn data(&self) -> Data {
        self.visible(0)
    }

    /// Everything task `id` can read.
    pub fn task_data(&self, id: TaskId) -> Option<Data> {
        self.tree.get(id).map(|t| self.visible(t.scope))
    }

    pub fn last_task(&self) -> Option<&Task> {
        self.last_task.and_then(|id| self.tree.get(id))
    }

    pub fn failure(&self) -> Option<&Failure> {
        self.failure.as_ref()
    }

    pub fn state(&self) -> TaskState {
        self.tree[0].state
    }

    pub fn is_completed(&self) -> bool {
        self.state() == TaskState::Completed
    }

    // --- stepping ---

    fn next_runnable(&self) -> Option<TaskId> {
        self.tree
            .iter()
            .find(|t| t.state == TaskState::Ready && !t.awaits_caller())
            .map(|t| t.id)
    }

    pub(crate) fn run_task(&mut self, id: TaskId, input: Data) -> Result<(), EngineError> {
        let task = &self.tree[id];
        if task.spec().loop_characteristics.is_some() && !task.is_instance() {
            let scope = task.scope;
            self.write_scope(scope, input);
            return self.start_group(id);
        }

        debug!(task = %task.name(), kind = task.spec().kind_name(), "Executing");
        match self.step(id, input) {
            Ok(result) => self.apply(id, result),
            Err(err) => self.fail_task(id, err),
        }
    }

    /// Runs the behaviour against a snapshot; touches nothing in the tree.
    fn step(&self, id: TaskId, input: Data) -> Result<StepResult, EngineError> {
        let task = &self.tree[id];
        let spec = task.spec();
        let mut ctx = Context::new(self.id, task, &self.engine, self.visible(task.scope));
        ctx.extend(input);

        if let Some(pre) = &spec.prescript {
            ctx.run_script(pre)?;
        }

        let mut syscall = StepSyscall::default();
        nodes::execute(&mut ctx, &mut syscall)?;

        let outcome = syscall.outcome.unwrap_or_else(|| {
            warn!(task = %spec.name, "Behaviour finished without an outcome");
            Outcome::Proceed
        });
        let next = match outcome {
            Outcome::Proceed => {
                if let Some(post) = &spec.postscript {
                    ctx.run_script(post)?;
                }
                Next::Proceed(flow::select_flows(&ctx)?)
            }
            Outcome::Enter => {
                let (graph, scope) = self.prepare_entry(id, ctx.data())?;
                Next::Enter(graph, scope)
            }
            Outcome::Throw(signal) => Next::Throw(signal),
            Outcome::Terminate => Next::Terminate,
        };

        Ok(StepResult {
            next,
            writes: ctx.into_writes(),
            broadcasts: syscall.broadcasts,
        })
    }

    fn apply(&mut self, id: TaskId, result: StepResult) -> Result<(), EngineError> {
        let scope = self.tree[id].scope;
        self.write_scope(scope, result.writes);

        match result.next {
            Next::Proceed(flows) => self.complete_task(id, &flows)?,
            Next::Enter(graph, data) => self.enter(id, graph, data),
            Next::Throw(signal) => {
                self.complete_task(id, &[])?;
                self.raise(signal, id)?;
            }
            Next::Terminate => {
                self.complete_task(id, &[])?;
                self.terminate_scope(scope, id);
            }
        }

        for signal in result.broadcasts {
            self.deliver(&signal);
        }
        Ok(())
    }

    /// Turns a task failure into an error signal raised at the task. When
    /// nothing catches it the original error is returned.
    pub(crate) fn fail_task(&mut self, id: TaskId, err: EngineError) -> Result<(), EngineError> {
        warn!(task = %self.tree[id].name(), error = %err, "Task failed");
        match self.raise(Signal::from(&err), id) {
            Ok(_) => Ok(()),
            Err(EngineError::UnhandledSignal { .. }) => Err(err),
            Err(other) => Err(other),
        }
    }

    pub(crate) fn complete_task(&mut self, id: TaskId, flows: &[usize]) -> Result<(), EngineError> {
        self.tree[id].state = TaskState::Completed;
        self.last_task = Some(id);
        debug!(task = %self.tree[id].name(), ?flows, "Completed");
        self.disarm_boundaries(id);

        if let TaskRole::Instance { group, .. } = self.tree[id].role {
            return self.on_instance_done(group, id);
        }

        let children = self.tree[id].children.clone();
        for child in children {
            let task = &self.tree[child];
            if task.role != TaskRole::Flow || task.state != TaskState::Future {
                continue;
            }
            let via = task.via;
            match via {
                Some(k) if flows.contains(&k) => self.activate(child),
                _ => self.cancel_subtree(child),
            }
        }
        Ok(())
    }

    /// Moves a `FUTURE` task onto the token: joins merge, catch events wait,
    /// everything else becomes `READY`.
    pub(crate) fn activate(&mut self, id: TaskId) {
        let task = &self.tree[id];
        let spec = task.spec();
        if spec.is_join() {
            self.arrive_at_join(id);
            return;
        }
        let waits = matches!(spec.kind, TaskKind::IntermediateCatch(_));
        let instance = task.is_instance();

        self.tree[id].state = if waits { TaskState::Waiting } else { TaskState::Ready };
        if !instance {
            self.predict(id);
            self.arm_boundaries(id);
        }
    }

    /// Adds a `FUTURE` child for each outgoing transition.
    fn predict(&mut self, id: TaskId) {
        let graph = self.tree[id].graph.clone();
        let spec = self.tree[id].spec;
        let scope = self.tree[id].scope;
        for (i, transition) in graph.spec(spec).outgoing.iter().enumerate() {
            let child = self.tree.add_child(id, graph.clone(), transition.target, TaskRole::Flow, scope);
            self.tree[child].via = Some(i);
        }
    }

    fn arm_boundaries(&mut self, owner: TaskId) {
        let graph = self.tree[owner].graph.clone();
        let spec = self.tree[owner].spec;
        for &boundary in &graph.spec(spec).boundaries {
            self.arm_boundary(owner, boundary);
        }
    }

    pub(crate) fn arm_boundary(&mut self, owner: TaskId, spec: usize) -> TaskId {
        let graph = self.tree[owner].graph.clone();
        let scope = self.tree[owner].scope;
        let id = self.tree.add_child(owner, graph, spec, TaskRole::Boundary { owner }, scope);
        self.tree[id].state = TaskState::Waiting;
        self.predict(id);
        id
    }

    fn disarm_boundaries(&mut self, owner: TaskId) {
        let children = self.tree[owner].children.clone();
        for child in children {
            let task = &self.tree[child];
            if matches!(task.role, TaskRole::Boundary { .. }) && task.state == TaskState::Waiting {
                // takes the predicted successors along
                self.cancel_subtree(child);
            }
        }
    }

    // --- joins ---

    fn arrive_at_join(&mut self, id: TaskId) {
        let task = &self.tree[id];
        let graph = task.graph.clone();
        let (spec, scope) = (task.spec, task.scope);
        let source = task.parent.map(|p| self.tree[p].spec);

        let primary = self
            .tree
            .iter()
            .find(|t| {
                t.id != id
                    && t.state == TaskState::Waiting
                    && t.spec == spec
                    && t.scope == scope
                    && Arc::ptr_eq(&t.graph, &graph)
            })
            .map(|t| t.id);

        match primary {
            Some(primary) => {
                if let Some(source) = source {
                    self.tree[primary].arrivals.insert(source);
                }
                // the token lives on in the primary
                self.tree[id].state = TaskState::Completed;
                debug!(join = %graph.spec(spec).name, primary, "Branch arrived at join");
            }
            None => {
                let task = &mut self.tree[id];
                task.state = TaskState::Waiting;
                if let Some(source) = source {
                    task.arrivals.insert(source);
                }
                self.predict(id);
            }
        }
    }

    fn join_ready(&self, id: TaskId) -> bool {
        let join = &self.tree[id];
        let spec = join.spec();
        match spec.kind {
            TaskKind::ParallelGateway => spec.incoming.iter().all(|s| join.arrivals.contains(s)),
            // inclusive: no other live token in this scope can still get here
            _ => !self.tree.iter().any(|t| {
                t.id != id
                    && t.id != join.scope
                    && t.scope == join.scope
                    && matches!(t.state, TaskState::Waiting | TaskState::Ready | TaskState::Started)
                    && Arc::ptr_eq(&t.graph, &join.graph)
                    && join.graph.can_reach(t.spec, join.spec)
            }),
        }
    }

    /// Releases satisfied joins and completes containers whose subtree went
    /// quiet. Returns whether anything changed.
    fn settle(&mut self) -> Result<bool, EngineError> {
        let mut changed = false;

        for id in 0..self.tree.len() {
            let task = &self.tree[id];
            if task.state == TaskState::Waiting && task.spec().is_join() && self.join_ready(id) {
                debug!(join = %task.name(), "Join released");
                self.tree[id].state = TaskState::Ready;
                changed = true;
            }
        }

        // innermost containers first
        for id in (0..self.tree.len()).rev() {
            let task = &self.tree[id];
            let container = task.role == TaskRole::Root || task.spec().is_container();
            if task.state != TaskState::Started || task.is_group() || !container {
                continue;
            }
            if !self.is_quiescent(id) {
                continue;
            }
            changed = true;
            if task.role == TaskRole::Root {
                self.tree[id].state = TaskState::Completed;
                info!(instance = %self.id, process = %self.graph.id, "Process completed");
            } else {
                self.on_subtree_complete(id)?;
            }
        }
        Ok(changed)
    }

    fn is_quiescent(&self, container: TaskId) -> bool {
        !self
            .tree
            .iter()
            .any(|t| t.id != container && t.scope == container && t.state.is_pending())
    }

    // --- data ---

    /// Variables readable from `scope`, inner scopes shadowing outer ones.
    pub(crate) fn visible(&self, scope: TaskId) -> Data {
        let mut chain = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            match &self.tree[id].data {
                Some(data) => {
                    chain.push(id);
                    current = data.parent;
                }
                None => break,
            }
        }

        let mut data = Data::new();
        for id in chain.into_iter().rev() {
            if let Some(scope) = &self.tree[id].data {
                data.extend(scope.vars.iter().map(|(k, v)| (k.clone(), v.clone())));
            }
        }
        data
    }

    pub(crate) fn write_scope(&mut self, scope: TaskId, writes: Data) {
        if writes.is_empty() {
            return;
        }
        match self.tree[scope].data.as_mut() {
            Some(data) => data.vars.extend(writes),
            None => warn!(scope, "Task owns no data scope, dropping writes"),
        }
    }

    // --- cancellation ---

    /// Cancels `top` and everything below it, rolling back the data scopes
    /// opened there. Branches started by boundary events of `top` itself that
    /// already fired survive; those of tasks further down are cancelled too.
    pub(crate) fn cancel_subtree(&mut self, top: TaskId) {
        let mut stack = vec![top];
        while let Some(id) = stack.pop() {
            let task = &mut self.tree[id];
            let fired_on_top = task.role == TaskRole::Boundary { owner: top }
                && matches!(task.state, TaskState::Ready | TaskState::Started | TaskState::Completed);
            if fired_on_top {
                continue;
            }
            if task.state.is_pending() {
                task.state = TaskState::Cancelled;
            }
            if task.role != TaskRole::Root {
                self.rollback(id);
            }
            stack.extend(self.tree[id].children.iter().copied());
        }
    }

    /// Cancels every other live task of `scope`; the scope then finishes normally.
    fn terminate_scope(&mut self, scope: TaskId, origin: TaskId) {
        info!(task = %self.tree[origin].name(), "Terminating scope");
        let targets: Vec<TaskId> = self
            .tree
            .iter()
            .filter(|t| t.id != origin && t.id != scope && t.scope == scope && t.state.is_pending())
            .map(|t| t.id)
            .collect();
        for id in targets {
            self.cancel_subtree(id);
        }
    }
}
