//! Pattern-matched rewrites for BCL constructs whose bodies cannot be
//! compiled from bytecode (§4.4). Modeled as an ordered handler list,
//! first-success-wins, per the design note in §9 preferring that shape over
//! a dispatch table keyed on declaring type with fallback prefix matching —
//! the chain here *is* effectively declaring-type-keyed (each handler
//! checks the callee's declaring type first) but kept as an ordered `Vec`
//! so the fixed precedence order is visible at the call site instead of
//! implicit in table-construction order.

mod collections;
mod linq;
mod nullable_tuple;
mod reflection;
mod span;
mod task;

pub use collections::CollectionInterceptor;
pub use linq::LinqInterceptor;
pub use nullable_tuple::{NullableInterceptor, ValueTupleInterceptor};
pub use reflection::{ReflectionInterceptor, StringFormatInterceptor};
pub use span::{EqualityComparerInterceptor, IndexRangeInterceptor, SpanInterceptor};
pub use task::{ExceptionDispatchInterceptor, TaskInterceptor};

use crate::ir::Instruction;

/// A single managed-method call site, pre-resolved enough for an
/// interceptor to decide whether it applies: declaring type, method name,
/// and the already-translated argument operands.
#[derive(Debug, Clone)]
pub struct CallSite {
    pub declaring_type: String,
    pub method_name: String,
    pub generic_arguments: Vec<String>,
    pub arguments: Vec<crate::ir::Operand>,
    pub target: Option<String>,
}

pub trait Interceptor {
    /// Attempts to rewrite `call` into one or more IR instructions. Returns
    /// `None` when this handler does not recognize the call site, so the
    /// chain falls through to the next one.
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>>;
}

/// The fixed precedence order from §4.4: nullable/value-tuple → task/
/// awaiter/builder → index/range → span → equality-comparer → multi-dim-
/// array → list → dictionary → LINQ → reflection → string.format →
/// internal-call fallback (the fallback itself is `IcallRegistry`, consulted
/// by the caller when every interceptor here returns `None`).
pub struct InterceptorChain {
    handlers: Vec<Box<dyn Interceptor>>,
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::new()
    }
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self {
            handlers: vec![
                Box::new(NullableInterceptor),
                Box::new(ValueTupleInterceptor),
                Box::new(TaskInterceptor),
                Box::new(IndexRangeInterceptor),
                Box::new(SpanInterceptor),
                Box::new(EqualityComparerInterceptor),
                Box::new(CollectionInterceptor),
                Box::new(LinqInterceptor),
                Box::new(ReflectionInterceptor),
                Box::new(StringFormatInterceptor),
                Box::new(ExceptionDispatchInterceptor),
            ],
        }
    }

    pub fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        self.handlers.iter().find_map(|handler| handler.intercept(call))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    fn call(declaring_type: &str, method_name: &str) -> CallSite {
        CallSite {
            declaring_type: declaring_type.into(),
            method_name: method_name.into(),
            generic_arguments: Vec::new(),
            arguments: vec![Operand::Local("self".into())],
            target: Some("__t0".into()),
        }
    }

    #[test]
    fn first_matching_handler_wins() {
        let chain = InterceptorChain::new();
        let site = call("System.Nullable`1", "get_HasValue");
        assert!(chain.intercept(&site).is_some());
    }

    #[test]
    fn unrecognized_call_falls_through_to_none() {
        let chain = InterceptorChain::new();
        let site = call("App.MyCustomType", "DoSomething");
        assert!(chain.intercept(&site).is_none());
    }
}
