//! Multi-dimensional arrays, `List<T>`, and `Dictionary<K,V>`. The runtime
//! treats all three as opaque layout types (their field shape is internal
//! to the runtime support library, not reconstructed by the core), so every
//! member call here becomes a runtime-symbol call rather than a compiled
//! method body.

use super::{CallSite, Interceptor};
use crate::ir::Instruction;

pub struct CollectionInterceptor;

impl Interceptor for CollectionInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let base = call.declaring_type.split('<').next().unwrap_or(&call.declaring_type);

        // Multi-dimensional (rank > 1) arrays expose `Get`/`Set`/`GetLength`
        // as pseudo-members rather than real IL methods; single-dimensional
        // arrays use the `ArrayLoad`/`ArrayStore` instructions directly and
        // never reach this interceptor.
        if base == "System.Array" {
            let target = call.target.clone();
            let symbol = match call.method_name.as_str() {
                "Get" => "array_md_get",
                "Set" => "array_md_set",
                "GetLength" => "array_md_get_length",
                _ => return None,
            };
            return Some(vec![Instruction::Call { target, function: symbol.into(), arguments: call.arguments.clone() }]);
        }

        let (prefix, is_dictionary) = if base == "System.Collections.Generic.List`1" {
            ("list", false)
        } else if base == "System.Collections.Generic.Dictionary`2" {
            ("dictionary", true)
        } else {
            return None;
        };

        let target = call.target.clone();
        let symbol = match call.method_name.as_str() {
            ".ctor" => format!("{prefix}_new"),
            "Add" if is_dictionary => format!("{prefix}_add"),
            "Add" => format!("{prefix}_add"),
            "get_Item" => format!("{prefix}_get_item"),
            "set_Item" => format!("{prefix}_set_item"),
            "get_Count" => format!("{prefix}_count"),
            "ContainsKey" if is_dictionary => format!("{prefix}_contains_key"),
            "Contains" if !is_dictionary => format!("{prefix}_contains"),
            "Remove" => format!("{prefix}_remove"),
            "Clear" => format!("{prefix}_clear"),
            "GetEnumerator" => format!("{prefix}_get_enumerator"),
            _ => return None,
        };

        Some(vec![Instruction::Call { target, function: symbol, arguments: call.arguments.clone() }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Operand;

    fn call(declaring_type: &str, method_name: &str) -> CallSite {
        CallSite { declaring_type: declaring_type.into(), method_name: method_name.into(), generic_arguments: Vec::new(), arguments: vec![Operand::Local("self".into())], target: Some("__t0".into()) }
    }

    #[test]
    fn list_add_routes_to_list_symbol() {
        let interceptor = CollectionInterceptor;
        let site = call("System.Collections.Generic.List`1<System.Int32>", "Add");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "list_add"));
    }

    #[test]
    fn dictionary_contains_key_is_distinct_from_list_contains() {
        let interceptor = CollectionInterceptor;
        let site = call("System.Collections.Generic.Dictionary`2<System.String,System.Int32>", "ContainsKey");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "dictionary_contains_key"));
    }

    #[test]
    fn multi_dim_array_get_is_recognized() {
        let interceptor = CollectionInterceptor;
        let site = call("System.Array", "Get");
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "array_md_get"));
    }
}
