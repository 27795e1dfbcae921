//! `System.Nullable<T>` and `System.ValueTuple` (arity 1-7, plus the
//! `Rest`-chained 8+ case) are both fixed-layout value types the runtime
//! never sees a managed method body for — their accessors are synthesized
//! directly from the type shape instead of being compiled from IL.

use super::{CallSite, Interceptor};
use crate::ir::{BinaryOp, Instruction, Operand};

/// `Nullable<T>` is laid out as `{ bool has_value; T value; }`; every
/// accessor reduces to a field load/store against that fixed shape.
pub struct NullableInterceptor;

impl Interceptor for NullableInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        if !call.declaring_type.starts_with("System.Nullable`1") {
            return None;
        }
        let receiver = call.arguments.first()?.clone();
        let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());

        match call.method_name.as_str() {
            "get_HasValue" => Some(vec![Instruction::FieldLoad {
                target,
                receiver,
                field: "has_value".into(),
            }]),
            "get_Value" => Some(vec![
                Instruction::NullCheck { value: receiver.clone() },
                Instruction::FieldLoad { target, receiver, field: "value".into() },
            ]),
            "GetValueOrDefault" if call.arguments.len() == 1 => Some(vec![Instruction::FieldLoad {
                target,
                receiver,
                field: "value".into(),
            }]),
            ".ctor" => {
                let value = call.arguments.get(1)?.clone();
                Some(vec![
                    Instruction::FieldStore { receiver: receiver.clone(), field: "has_value".into(), value: Operand::IntLiteral(1) },
                    Instruction::FieldStore { receiver, field: "value".into(), value },
                ])
            }
            _ => None,
        }
    }
}

/// `ValueTuple` items are plain public fields (`Item1`..`Item7`, `Rest` for
/// the 8-ary extension); `.ctor` is a sequence of field stores and item
/// accessors are field loads, so there is nothing to compile — only to
/// recognize and rewrite.
pub struct ValueTupleInterceptor;

impl Interceptor for ValueTupleInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        if !call.declaring_type.starts_with("System.ValueTuple`") {
            return None;
        }
        let receiver = call.arguments.first()?.clone();

        if call.method_name == ".ctor" {
            let mut instructions = Vec::new();
            for (i, value) in call.arguments.iter().skip(1).enumerate() {
                let field = if i == 7 { "Rest".to_string() } else { format!("Item{}", i + 1) };
                instructions.push(Instruction::FieldStore { receiver: receiver.clone(), field, value: value.clone() });
            }
            return Some(instructions);
        }

        if let Some(n) = call.method_name.strip_prefix("get_Item") {
            let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
            return Some(vec![Instruction::FieldLoad { target, receiver, field: format!("Item{n}") }]);
        }

        if call.method_name == "Equals" {
            let other = call.arguments.get(1)?.clone();
            let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
            let arity = call.generic_arguments.len().max(1);
            let false_label = format!("{target}_ne");
            let done_label = format!("{target}_eq_done");
            let mut instructions = Vec::new();
            for i in 0..arity {
                let field = if i == 7 { "Rest".to_string() } else { format!("Item{}", i + 1) };
                let lhs_temp = format!("{target}_lhs{i}");
                let rhs_temp = format!("{target}_rhs{i}");
                let eq_temp = format!("{target}_eq{i}");
                instructions.push(Instruction::FieldLoad { target: lhs_temp.clone(), receiver: receiver.clone(), field: field.clone() });
                instructions.push(Instruction::FieldLoad { target: rhs_temp.clone(), receiver: other.clone(), field });
                instructions.push(Instruction::BinaryOp { target: eq_temp.clone(), op: BinaryOp::Equal, lhs: Operand::Temp(lhs_temp), rhs: Operand::Temp(rhs_temp) });
                instructions.push(Instruction::ConditionalBranch { condition: crate::ir::BranchCondition::False, lhs: Operand::Temp(eq_temp), rhs: None, label: false_label.clone() });
            }
            instructions.push(Instruction::Assign { target: target.clone(), value: Operand::IntLiteral(1) });
            instructions.push(Instruction::Branch { label: done_label.clone() });
            instructions.push(Instruction::Label { name: false_label });
            instructions.push(Instruction::Assign { target, value: Operand::IntLiteral(0) });
            instructions.push(Instruction::Label { name: done_label });
            return Some(instructions);
        }

        if call.method_name == "ToString" {
            let target = call.target.clone().unwrap_or_else(|| "__t_discard".to_string());
            return Some(vec![Instruction::Call { target: Some(target), function: "value_tuple_to_string".into(), arguments: vec![receiver] }]);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(declaring_type: &str, method_name: &str, arguments: Vec<Operand>) -> CallSite {
        CallSite { declaring_type: declaring_type.into(), method_name: method_name.into(), generic_arguments: Vec::new(), arguments, target: Some("__t0".into()) }
    }

    #[test]
    fn nullable_has_value_reads_the_flag_field() {
        let interceptor = NullableInterceptor;
        let site = call("System.Nullable`1<System.Int32>", "get_HasValue", vec![Operand::Local("n".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::FieldLoad { field, .. } if field == "has_value"));
    }

    #[test]
    fn value_tuple_to_string_routes_to_the_runtime_formatter() {
        let interceptor = ValueTupleInterceptor;
        let site = call("System.ValueTuple`2<System.Int32,System.String>", "ToString", vec![Operand::Local("t".into())]);
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "value_tuple_to_string"));
    }

    #[test]
    fn value_tuple_equals_compares_every_item_and_conjoins() {
        let interceptor = ValueTupleInterceptor;
        let mut site = call(
            "System.ValueTuple`2<System.Int32,System.Int32>",
            "Equals",
            vec![Operand::Local("t".into()), Operand::Local("other".into())],
        );
        site.generic_arguments = vec!["System.Int32".into(), "System.Int32".into()];
        let instructions = interceptor.intercept(&site).unwrap();

        let field_loads: Vec<_> = instructions.iter().filter(|i| matches!(i, Instruction::FieldLoad { .. })).collect();
        assert_eq!(field_loads.len(), 4, "two fields, one load from each side");
        let compares: Vec<_> = instructions.iter().filter(|i| matches!(i, Instruction::BinaryOp { op: BinaryOp::Equal, .. })).collect();
        assert_eq!(compares.len(), 2);
        assert!(instructions.iter().any(|i| matches!(i, Instruction::ConditionalBranch { .. })));
        assert!(instructions.iter().any(|i| matches!(i, Instruction::Label { .. })));
    }

    #[test]
    fn value_tuple_constructor_stores_each_item() {
        let interceptor = ValueTupleInterceptor;
        let site = call(
            "System.ValueTuple`2<System.Int32,System.Int32>",
            ".ctor",
            vec![Operand::Local("t".into()), Operand::IntLiteral(1), Operand::IntLiteral(2)],
        );
        let instructions = interceptor.intercept(&site).unwrap();
        assert_eq!(instructions.len(), 2);
        assert!(matches!(&instructions[0], Instruction::FieldStore { field, .. } if field == "Item1"));
        assert!(matches!(&instructions[1], Instruction::FieldStore { field, .. } if field == "Item2"));
    }
}
