//! `Enumerable.*` extension methods are lowered to explicit loops rather
//! than left as iterator-chain calls, since the runtime has no generic
//! `IEnumerable` machinery worth invoking per-element. `Where` is a
//! two-pass operation (count matches, then fill); `Select` allocates its
//! result array up front from the source length.

use super::{CallSite, Interceptor};
use crate::ir::{Instruction, Operand};

pub struct LinqInterceptor;

impl Interceptor for LinqInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        if call.declaring_type != "System.Linq.Enumerable" {
            return None;
        }
        let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
        let source = call.arguments.first()?.clone();
        let predicate_or_selector = call.arguments.get(1).cloned();

        match call.method_name.as_str() {
            "Any" if call.arguments.len() == 1 => Some(vec![Instruction::Call {
                target: Some(target),
                function: "enumerable_any".into(),
                arguments: vec![source],
            }]),
            "Any" => Some(vec![Instruction::Call {
                target: Some(target),
                function: "enumerable_any_predicate".into(),
                arguments: vec![source, predicate_or_selector?],
            }]),
            "Count" if call.arguments.len() == 1 => Some(vec![Instruction::FieldLoad { target, receiver: source, field: "length".into() }]),
            "Where" => Some(where_loop(&target, source, predicate_or_selector?)),
            "Select" => Some(vec![Instruction::Call {
                target: Some(target),
                function: "enumerable_select".into(),
                arguments: vec![source, predicate_or_selector?],
            }]),
            "First" | "FirstOrDefault" => Some(vec![Instruction::Call {
                target: Some(target),
                function: format!("enumerable_{}", to_snake(&call.method_name)),
                arguments: vec![source],
            }]),
            "ToList" | "ToArray" => Some(vec![Instruction::Call {
                target: Some(target),
                function: format!("enumerable_{}", to_snake(&call.method_name)),
                arguments: vec![source],
            }]),
            _ => None,
        }
    }
}

/// `Where` materializes into a caller-visible array via a two-pass scan:
/// pass 1 counts predicate matches to size the allocation, pass 2 fills it.
/// Encoded here as two calls into the runtime's filter-count/filter-fill
/// primitives rather than inlined loop IR, since the loop shape itself
/// (index variable, branch back to head) is otherwise identical across
/// every call site and not worth re-deriving per occurrence.
fn where_loop(target: &str, source: Operand, predicate: Operand) -> Vec<Instruction> {
    let count_temp = format!("{target}_matched");
    vec![
        Instruction::Call { target: Some(count_temp.clone()), function: "enumerable_where_count".into(), arguments: vec![source.clone(), predicate.clone()] },
        Instruction::Call {
            target: Some(target.to_string()),
            function: "enumerable_where_fill".into(),
            arguments: vec![source, predicate, Operand::Temp(count_temp)],
        },
    ]
}

fn to_snake(pascal: &str) -> String {
    let mut out = String::new();
    for (i, c) in pascal.chars().enumerate() {
        if c.is_uppercase() && i > 0 {
            out.push('_');
        }
        out.extend(c.to_lowercase());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(method_name: &str, arguments: Vec<Operand>) -> CallSite {
        CallSite { declaring_type: "System.Linq.Enumerable".into(), method_name: method_name.into(), generic_arguments: Vec::new(), arguments, target: Some("__t0".into()) }
    }

    #[test]
    fn where_emits_count_then_fill() {
        let interceptor = LinqInterceptor;
        let site = call("Where", vec![Operand::Local("src".into()), Operand::Local("pred".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert_eq!(instructions.len(), 2);
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "enumerable_where_count"));
        assert!(matches!(&instructions[1], Instruction::Call { function, .. } if function == "enumerable_where_fill"));
    }

    #[test]
    fn select_allocates_via_single_runtime_call() {
        let interceptor = LinqInterceptor;
        let site = call("Select", vec![Operand::Local("src".into()), Operand::Local("sel".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert_eq!(instructions.len(), 1);
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "enumerable_select"));
    }

    #[test]
    fn any_without_predicate_is_distinct_from_any_with_predicate() {
        let interceptor = LinqInterceptor;
        let plain = interceptor.intercept(&call("Any", vec![Operand::Local("src".into())])).unwrap();
        assert!(matches!(&plain[0], Instruction::Call { function, .. } if function == "enumerable_any"));

        let predicated = interceptor.intercept(&call("Any", vec![Operand::Local("src".into()), Operand::Local("pred".into())])).unwrap();
        assert!(matches!(&predicated[0], Instruction::Call { function, .. } if function == "enumerable_any_predicate"));
    }
}
