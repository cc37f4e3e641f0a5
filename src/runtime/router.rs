use tracing::{debug, error, info};
use crate::error::EngineError;
use crate::runtime::blueprint::TaskKind;
use crate::runtime::instance::{Failure, ProcessInstance};
use crate::runtime::signal::Signal;
use crate::runtime::task::{TaskId, TaskRole, TaskState};

/// A waiting boundary event that matches a signal.
struct Candidate {
    task: TaskId,
    interrupting: bool,
    specificity: u8,
}

impl ProcessInstance {
    /// Offers `signal` to the listeners of `origin`, then of each enclosing
    /// scope in turn. Returns `Ok(true)` when it was caught.
    ///
    /// Error and cancel signals only count as caught by an interrupting
    /// boundary; reaching the root without one fails the instance.
    pub(crate) fn raise(&mut self, signal: Signal, origin: TaskId) -> Result<bool, EngineError> {
        let target = &self.tree[origin];
        if target.state == TaskState::Waiting {
            if let TaskKind::IntermediateCatch(trigger) = &target.spec().kind {
                if trigger.matches(&signal) {
                    self.fire(origin, &signal);
                    return Ok(true);
                }
            }
        }

        let mut current = Some(origin);
        while let Some(owner) = current {
            if self.try_catch(owner, &signal) {
                return Ok(true);
            }
            current = self.enclosing(owner);
        }

        if signal.is_exceptional() {
            return Err(self.fail(origin, signal));
        }
        debug!(%signal, "Nobody listens for signal");
        Ok(false)
    }

    /// Delivers a message, signal or timer to every waiting listener in the
    /// instance. Returns whether any of them fired.
    pub(crate) fn deliver(&mut self, signal: &Signal) -> bool {
        let mut catchers = Vec::new();
        let mut owners = Vec::new();
        for task in self.tree.iter() {
            if task.state != TaskState::Waiting {
                continue;
            }
            match (&task.spec().kind, task.role) {
                (TaskKind::IntermediateCatch(trigger), _) if trigger.matches(signal) => catchers.push(task.id),
                (TaskKind::BoundaryEvent { trigger, .. }, TaskRole::Boundary { owner })
                    if trigger.matches(signal) && !owners.contains(&owner) =>
                {
                    owners.push(owner)
                }
                _ => {}
            }
        }

        let mut caught = false;
        for id in catchers {
            if self.tree[id].state == TaskState::Waiting {
                self.fire(id, signal);
                caught = true;
            }
        }
        for owner in owners {
            // an earlier interruption may already have removed this owner
            if self.tree[owner].state.is_pending() && self.try_catch(owner, signal) {
                caught = true;
            }
        }
        caught
    }

    /// Fires the boundary events of `owner` matching `signal`: every
    /// non-interrupting match, and the most specific interrupting one
    /// (declaration order breaks ties), which then cancels the owner.
    fn try_catch(&mut self, owner: TaskId, signal: &Signal) -> bool {
        let candidates: Vec<Candidate> = self.tree[owner]
            .children
            .iter()
            .filter_map(|&child| {
                let task = &self.tree[child];
                if task.state != TaskState::Waiting || !matches!(task.role, TaskRole::Boundary { .. }) {
                    return None;
                }
                match &task.spec().kind {
                    TaskKind::BoundaryEvent { trigger, interrupting, .. } => {
                        trigger.specificity(signal).map(|specificity| Candidate {
                            task: child,
                            interrupting: *interrupting,
                            specificity,
                        })
                    }
                    _ => None,
                }
            })
            .collect();
        if candidates.is_empty() {
            return false;
        }

        let mut caught = false;
        for candidate in candidates.iter().filter(|c| !c.interrupting) {
            self.fire(candidate.task, signal);
            if !signal.is_exceptional() {
                caught = true;
            }
        }

        let mut best: Option<&Candidate> = None;
        for candidate in candidates.iter().filter(|c| c.interrupting) {
            if best.is_none_or(|b| candidate.specificity > b.specificity) {
                best = Some(candidate);
            }
        }
        if let Some(best) = best {
            self.fire(best.task, signal);
            info!(owner = %self.tree[owner].name(), boundary = %self.tree[best.task].name(), "Interrupting activity");
            self.cancel_subtree(owner);
            caught = true;
        }
        caught
    }

    fn fire(&mut self, id: TaskId, signal: &Signal) {
        let task = &mut self.tree[id];
        task.state = TaskState::Ready;
        task.fired = Some(signal.clone());
        info!(task = %task.name(), %signal, "Event fired");

        let rearm = match (&task.spec().kind, task.role) {
            (TaskKind::BoundaryEvent { trigger, interrupting: false, .. }, TaskRole::Boundary { owner }) => {
                trigger.is_repeatable().then_some((owner, task.spec))
            }
            _ => None,
        };
        if let Some((owner, spec)) = rearm {
            if self.tree[owner].state.is_pending() {
                self.arm_boundary(owner, spec);
            }
        }
    }

    /// The task whose boundaries see a signal after `id` had its chance.
    pub(crate) fn enclosing(&self, id: TaskId) -> Option<TaskId> {
        let task = &self.tree[id];
        match task.role {
            TaskRole::Root => None,
            TaskRole::Instance { group, .. } => Some(group),
            _ if task.scope != id => Some(task.scope),
            _ => None,
        }
    }

    /// Nothing caught `signal`: the instance ends in `ERROR`.
    fn fail(&mut self, origin: TaskId, signal: Signal) -> EngineError {
        let name = self.tree[origin].name().to_string();
        error!(task = %name, %signal, "Unhandled signal, failing process");

        for id in 0..self.tree.len() {
            let task = &mut self.tree[id];
            if task.role == TaskRole::Root {
                continue;
            }
            if task.state.is_pending() {
                task.state = if id == origin { TaskState::Error } else { TaskState::Cancelled };
            }
            self.rollback(id);
        }
        self.tree[0].state = TaskState::Error;
        self.failure = Some(Failure {
            task: origin,
            signal: signal.clone(),
        });
        EngineError::UnhandledSignal { task: name, signal }
    }
}
