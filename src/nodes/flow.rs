use crate::error::EngineError;
use crate::runtime::blueprint::{TaskKind, TaskSpec, Transition};
use crate::runtime::context::Context;
use crate::runtime::syscall::Syscall;

/// Gateways do nothing themselves; the engine picks their flows once they complete.
pub fn gateway(syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    syscall.proceed();
    Ok(())
}

/// Chooses which outgoing transitions of the task in `ctx` receive a token.
///
/// * parallel gateway: all of them
/// * exclusive gateway: the first (declaration order) whose guard holds, else the default
/// * everything else: every flow whose guard holds, else the default
///
/// An unguarded flow always holds. No match and no default is `NoMatchingFlow`.
pub fn select_flows(ctx: &Context) -> Result<Vec<usize>, EngineError> {
    let spec = ctx.spec();
    // iterations hand their token back to the group
    if spec.outgoing.is_empty() || ctx.task.is_instance() {
        return Ok(Vec::new());
    }

    match spec.kind {
        TaskKind::ParallelGateway => Ok((0..spec.outgoing.len()).collect()),
        TaskKind::ExclusiveGateway => {
            for (i, transition) in spec.outgoing.iter().enumerate() {
                if !transition.default && holds(ctx, transition)? {
                    return Ok(vec![i]);
                }
            }
            default_flow(spec)
        }
        _ => {
            let mut chosen = Vec::new();
            for (i, transition) in spec.outgoing.iter().enumerate() {
                if !transition.default && holds(ctx, transition)? {
                    chosen.push(i);
                }
            }
            if chosen.is_empty() {
                default_flow(spec)
            } else {
                Ok(chosen)
            }
        }
    }
}

fn holds(ctx: &Context, transition: &Transition) -> Result<bool, EngineError> {
    match &transition.guard {
        Some(guard) => ctx.evaluate_bool(guard),
        None => Ok(true),
    }
}

fn default_flow(spec: &TaskSpec) -> Result<Vec<usize>, EngineError> {
    spec.outgoing
        .iter()
        .position(|t| t.default)
        .map(|i| vec![i])
        .ok_or_else(|| EngineError::NoMatchingFlow { task: spec.name.clone() })
}
