pub mod action;
pub mod common;
pub mod flow;

use crate::error::EngineError;
use crate::runtime::blueprint::TaskKind;
use crate::runtime::context::Context;
use crate::runtime::syscall::Syscall;

/// Runs the behaviour of the task in `ctx` for one step.
pub fn execute(ctx: &mut Context, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    let spec = ctx.spec();
    match &spec.kind {
        TaskKind::Root => {
            // the root is never scheduled
            syscall.proceed();
            Ok(())
        }
        TaskKind::StartEvent => common::start(syscall),
        TaskKind::EndEvent(end) => common::end(end, syscall),
        TaskKind::IntermediateCatch(_) | TaskKind::BoundaryEvent { .. } => common::catch(ctx, syscall),
        TaskKind::IntermediateThrow(trigger) => common::throw(ctx, trigger, syscall),
        TaskKind::ScriptTask(script) => action::script(ctx, script, syscall),
        TaskKind::UserTask | TaskKind::ManualTask => action::human(syscall),
        TaskKind::ServiceTask { operator, params, result } => {
            action::service(ctx, operator, params, result.as_deref(), syscall)
        }
        TaskKind::BusinessRuleTask(decision) => action::business_rule(ctx, decision, syscall),
        TaskKind::ExclusiveGateway | TaskKind::InclusiveGateway | TaskKind::ParallelGateway => {
            flow::gateway(syscall)
        }
        TaskKind::SubProcess(_) | TaskKind::Transaction(_) | TaskKind::CallActivity(_) => {
            action::container(syscall)
        }
    }
}
