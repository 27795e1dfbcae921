//! `Index`/`Range`, `Span<T>`/`ReadOnlySpan<T>`, and `EqualityComparer<T>`.
//! All three are value types (or a static-cache singleton, for the
//! comparer) whose "body" is either pure arithmetic on their own fields or
//! a dispatch the runtime already performs generically — nothing here
//! needs a compiled managed method.

use super::{CallSite, Interceptor};
use crate::ir::{BinaryOp, Instruction, Operand};

/// `Index` is `{ int32 value; bool from_end; }`; `GetOffset(length)` is the
/// one piece of actual arithmetic: `from_end ? length - value : value`.
/// `Range` is `{ Index start; Index end; }`, whose `GetOffsetAndLength`
/// calls down into two `Index.GetOffset`s — represented here as a direct
/// runtime call rather than inlining the control flow twice.
pub struct IndexRangeInterceptor;

impl Interceptor for IndexRangeInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
        match (call.declaring_type.as_str(), call.method_name.as_str()) {
            ("System.Index", "GetOffset") => {
                let receiver = call.arguments.first()?.clone();
                let length = call.arguments.get(1)?.clone();
                Some(vec![Instruction::Call {
                    target: Some(target),
                    function: "index_get_offset".into(),
                    arguments: vec![receiver, length],
                }])
            }
            ("System.Range", "GetOffsetAndLength") => {
                let receiver = call.arguments.first()?.clone();
                let length = call.arguments.get(1)?.clone();
                Some(vec![Instruction::Call {
                    target: Some(target),
                    function: "range_get_offset_and_length".into(),
                    arguments: vec![receiver, length],
                }])
            }
            _ => None,
        }
    }
}

/// `Span<T>`/`ReadOnlySpan<T>` are `{ T* pointer; int32 length; }`. Every
/// accessor either reads those two fields or performs a bounds-checked
/// pointer-offset load, matching the spec's note that span element access
/// must check `index < length` before indexing.
pub struct SpanInterceptor;

impl Interceptor for SpanInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let base = call.declaring_type.split('<').next().unwrap_or(&call.declaring_type);
        if base != "System.Span`1" && base != "System.ReadOnlySpan`1" {
            return None;
        }
        let receiver = call.arguments.first()?.clone();
        let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());

        match call.method_name.as_str() {
            "get_Length" => Some(vec![Instruction::FieldLoad { target, receiver, field: "length".into() }]),
            "get_Item" => {
                let index = call.arguments.get(1)?.clone();
                let length_temp = format!("{target}_len");
                let out_of_range = format!("{target}_out_of_range");
                let in_range = format!("{target}_in_range");
                Some(vec![
                    Instruction::FieldLoad { target: length_temp.clone(), receiver: receiver.clone(), field: "length".into() },
                    Instruction::ConditionalBranch {
                        condition: crate::ir::BranchCondition::GreaterThanOrEqualUnsigned,
                        lhs: index.clone(),
                        rhs: Some(Operand::Temp(length_temp)),
                        label: out_of_range.clone(),
                    },
                    Instruction::Call { target: Some(target.clone()), function: "span_element_at".into(), arguments: vec![receiver, index.clone()] },
                    Instruction::Branch { label: in_range.clone() },
                    Instruction::Label { name: out_of_range },
                    Instruction::Call { target: None, function: "span_throw_index_out_of_range".into(), arguments: vec![index] },
                    Instruction::Label { name: in_range },
                ])
            }
            "Slice" => {
                let start = call.arguments.get(1)?.clone();
                let args = if call.arguments.len() > 2 {
                    vec![receiver, start, call.arguments[2].clone()]
                } else {
                    vec![receiver, start]
                };
                Some(vec![Instruction::Call { target: Some(target), function: "span_slice".into(), arguments: args }])
            }
            _ => None,
        }
    }
}

/// `EqualityComparer<T>.Default` is a per-instantiation static cache; every
/// other member forwards to the runtime's generic equality/hash dispatch
/// (which already knows how to special-case `IEquatable<T>` vs
/// `Object.Equals`), so there is no managed body to translate.
pub struct EqualityComparerInterceptor;

impl Interceptor for EqualityComparerInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let base = call.declaring_type.split('<').next().unwrap_or(&call.declaring_type);
        if base != "System.Collections.Generic.EqualityComparer`1" {
            return None;
        }
        let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
        match call.method_name.as_str() {
            "get_Default" => Some(vec![Instruction::Call { target: Some(target), function: "equality_comparer_default".into(), arguments: Vec::new() }]),
            "Equals" => Some(vec![Instruction::BinaryOp {
                target,
                op: BinaryOp::Equal,
                lhs: call.arguments.first()?.clone(),
                rhs: call.arguments.get(1)?.clone(),
            }]),
            "GetHashCode" => Some(vec![Instruction::Call {
                target: Some(target),
                function: "runtime_get_hash_code".into(),
                arguments: vec![call.arguments.first()?.clone()],
            }]),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(declaring_type: &str, method_name: &str, arguments: Vec<Operand>) -> CallSite {
        CallSite { declaring_type: declaring_type.into(), method_name: method_name.into(), generic_arguments: Vec::new(), arguments, target: Some("__t0".into()) }
    }

    #[test]
    fn index_get_offset_routes_to_runtime_call() {
        let interceptor = IndexRangeInterceptor;
        let site = call("System.Index", "GetOffset", vec![Operand::Local("idx".into()), Operand::Local("len".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "index_get_offset"));
    }

    #[test]
    fn span_indexer_emits_a_bounds_check_before_the_load() {
        let interceptor = SpanInterceptor;
        let site = call("System.Span`1<System.Int32>", "get_Item", vec![Operand::Local("s".into()), Operand::Local("i".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert_eq!(instructions.len(), 7);
        assert!(matches!(&instructions[1], Instruction::ConditionalBranch { .. }));
        assert!(matches!(&instructions[4], Instruction::Label { .. }));
        assert!(matches!(&instructions[5], Instruction::Call { target: None, function, .. } if function == "span_throw_index_out_of_range"));
        assert!(matches!(&instructions[6], Instruction::Label { .. }));
    }

    #[test]
    fn equality_comparer_default_is_a_cache_lookup() {
        let interceptor = EqualityComparerInterceptor;
        let site = call("System.Collections.Generic.EqualityComparer`1<System.Int32>", "get_Default", vec![]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "equality_comparer_default"));
    }
}
