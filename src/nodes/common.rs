use serde_json::Value;
use tracing::debug;
use crate::error::EngineError;
use crate::runtime::blueprint::EndKind;
use crate::runtime::context::Context;
use crate::runtime::signal::{Signal, Trigger};
use crate::runtime::syscall::Syscall;

pub fn start(syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    syscall.proceed();
    Ok(())
}

pub fn end(kind: &EndKind, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    match kind {
        EndKind::None => syscall.proceed(),
        EndKind::Error(code) => syscall.throw(Signal::Error {
            code: code.clone(),
            message: "error end event reached".to_string(),
        }),
        EndKind::Cancel => syscall.throw(Signal::Cancel),
        EndKind::Terminate => syscall.terminate(),
    }
    Ok(())
}

/// Intermediate catch and boundary events: take over the payload of the
/// message that woke them, then continue.
pub fn catch(ctx: &mut Context, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    if let Some(Signal::Message { name, payload }) = ctx.fired() {
        match payload {
            Value::Object(fields) => {
                for (key, value) in fields {
                    ctx.set_var(key, value.clone());
                }
            }
            Value::Null => {}
            other => ctx.set_var(name, other.clone()),
        }
    }
    syscall.proceed();
    Ok(())
}

/// Messages carry the variables named in the node's `inputs` as payload.
pub fn throw(ctx: &mut Context, trigger: &Trigger, syscall: &mut dyn Syscall) -> Result<(), EngineError> {
    let payload: serde_json::Map<String, Value> = ctx
        .spec()
        .inputs
        .iter()
        .filter_map(|name| ctx.get_var(name).map(|v| (name.clone(), v.clone())))
        .collect();
    let signal = trigger.to_signal(if payload.is_empty() { Value::Null } else { Value::Object(payload) });
    debug!(task = %ctx.spec().name, %signal, "Throwing");

    if signal.is_exceptional() {
        syscall.throw(signal);
    } else {
        syscall.broadcast(signal);
        syscall.proceed();
    }
    Ok(())
}
