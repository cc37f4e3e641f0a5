use tracing::warn;
use crate::runtime::signal::Signal;

/// 系统调用接口
/// A task behaviour tells the engine what should happen next through this interface.
pub trait Syscall {
    /// Complete the task and follow the outgoing flows whose guards hold
    fn proceed(&mut self);

    /// Open the task's inner graph (subprocess, transaction, call activity)
    fn enter(&mut self);

    /// Complete the task, then raise `signal` from it
    fn throw(&mut self, signal: Signal);

    /// Deliver `signal` to every waiting listener once the task is done
    fn broadcast(&mut self, signal: Signal);

    /// Complete the task and cancel everything else in its scope
    fn terminate(&mut self);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Proceed,
    Enter,
    Throw(Signal),
    Terminate,
}

/// Collects the requests of one step; the engine applies them afterwards.
#[derive(Debug, Default)]
pub struct StepSyscall {
    pub outcome: Option<Outcome>,
    pub broadcasts: Vec<Signal>,
}

impl StepSyscall {
    fn set(&mut self, outcome: Outcome) {
        if let Some(previous) = &self.outcome {
            warn!(?previous, ?outcome, "Behaviour requested two outcomes, keeping the last");
        }
        self.outcome = Some(outcome);
    }
}

impl Syscall for StepSyscall {
    fn proceed(&mut self) {
        self.set(Outcome::Proceed);
    }

    fn enter(&mut self) {
        self.set(Outcome::Enter);
    }

    fn throw(&mut self, signal: Signal) {
        self.set(Outcome::Throw(signal));
    }

    fn broadcast(&mut self, signal: Signal) {
        self.broadcasts.push(signal);
    }

    fn terminate(&mut self) {
        self.set(Outcome::Terminate);
    }
}
