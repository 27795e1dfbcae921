//! `Task`/`Task<T>`, their awaiters, async-method builders, and
//! `ExceptionDispatchInfo`. None of these have IL bodies worth compiling —
//! `Task.Run` is a thread-pool primitive, `AwaitUnsafeOnCompleted` wires a
//! continuation into the runtime's own scheduler — so every recognized call
//! routes to a fixed runtime symbol instead.
//!
//! The async-iterator handoff (`AsyncTaskMethodBuilder.Start` driving a
//! state machine through `MoveNext`) is represented here as a thread-local
//! slot the runtime uses to pass a promise source across the
//! `Reset → value-task constructor` boundary; this module only emits the
//! call that reads/writes that slot, it does not implement the slot itself
//! (that lives in the runtime support library, out of scope for the core).

use super::{CallSite, Interceptor};
use crate::ir::Instruction;

const TASK_TYPES: &[&str] = &[
    "System.Threading.Tasks.Task",
    "System.Threading.Tasks.Task`1",
    "System.Runtime.CompilerServices.TaskAwaiter",
    "System.Runtime.CompilerServices.TaskAwaiter`1",
    "System.Runtime.CompilerServices.AsyncTaskMethodBuilder",
    "System.Runtime.CompilerServices.AsyncTaskMethodBuilder`1",
    "System.Runtime.CompilerServices.AsyncVoidMethodBuilder",
];

fn base_type(declaring_type: &str) -> &str {
    declaring_type.split('<').next().unwrap_or(declaring_type)
}

pub struct TaskInterceptor;

impl Interceptor for TaskInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let base = base_type(&call.declaring_type);
        if !TASK_TYPES.contains(&base) {
            return None;
        }

        let target = call.target.clone();
        let symbol = match (base, call.method_name.as_str()) {
            (_, "Start") => "task_builder_start",
            (_, "SetResult") => "task_builder_set_result",
            (_, "SetException") => "task_builder_set_exception",
            (_, "AwaitUnsafeOnCompleted" | "AwaitOnCompleted") => "task_add_continuation",
            (_, "GetResult") => "task_awaiter_get_result",
            (_, "get_IsCompleted") => "task_awaiter_is_completed",
            ("System.Threading.Tasks.Task", "FromResult") => "task_from_result",
            ("System.Threading.Tasks.Task", "Run") => "task_run",
            ("System.Threading.Tasks.Task", "Delay") => "task_delay",
            ("System.Threading.Tasks.Task", "WhenAll") => "task_when_all",
            ("System.Threading.Tasks.Task", "WhenAny") => "task_when_any",
            _ => return None,
        };

        Some(vec![Instruction::Call { target, function: symbol.into(), arguments: call.arguments.clone() }])
    }
}

/// `ExceptionDispatchInfo.Capture`/`.Throw` preserve the original stack
/// trace across an await boundary; both reduce to a single runtime call
/// that the unwinder is taught to recognize.
pub struct ExceptionDispatchInterceptor;

impl Interceptor for ExceptionDispatchInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        if call.declaring_type != "System.Runtime.ExceptionServices.ExceptionDispatchInfo" {
            return None;
        }
        match call.method_name.as_str() {
            "Capture" => Some(vec![Instruction::Call {
                target: call.target.clone(),
                function: "edi_capture".into(),
                arguments: call.arguments.clone(),
            }]),
            "Throw" => Some(vec![Instruction::Call {
                target: None,
                function: "edi_rethrow".into(),
                arguments: call.arguments.clone(),
            }]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    fn call(declaring_type: &str, method_name: &str) -> CallSite {
        CallSite { declaring_type: declaring_type.into(), method_name: method_name.into(), generic_arguments: Vec::new(), arguments: vec![Operand::Local("t".into())], target: Some("__t0".into()) }
    }

    #[test]
    fn await_unsafe_on_completed_routes_to_continuation_symbol() {
        let interceptor = TaskInterceptor;
        let site = call("System.Runtime.CompilerServices.TaskAwaiter", "AwaitUnsafeOnCompleted");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "task_add_continuation"));
    }

    #[test]
    fn generic_task_from_result_is_recognized_through_generic_base() {
        let interceptor = TaskInterceptor;
        let site = call("System.Threading.Tasks.Task`1<System.Int32>", "GetResult");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "task_awaiter_get_result"));
    }

    #[test]
    fn edi_throw_emits_a_call_with_no_target() {
        let interceptor = ExceptionDispatchInterceptor;
        let site = call("System.Runtime.ExceptionServices.ExceptionDispatchInfo", "Throw");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { target: None, .. }));
    }
}
