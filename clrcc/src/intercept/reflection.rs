//! `Type.GetType`/`object.GetType`/`MethodBase.GetCurrentMethod` and
//! `string.Format` overloads. Reflection routes to a small fixed set of
//! runtime symbols backed by the type-metadata table the emitter writes out
//! per type (§2); `string.Format` is rewritten to the runtime's own
//! printf-style formatter rather than compiled as a loop over the format
//! string, since the format string itself is usually only known at the
//! call site and not worth re-deriving a parser for here.

use super::{CallSite, Interceptor};
use crate::ir::Instruction;

pub struct ReflectionInterceptor;

impl Interceptor for ReflectionInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        let target = call.target.clone();

        let symbol = match (call.declaring_type.as_str(), call.method_name.as_str()) {
            ("System.Object", "GetType") => "object_get_type",
            ("System.Type", "GetType") => "type_get_type_by_name",
            ("System.Type", "GetTypeFromHandle") => "type_from_handle",
            ("System.Reflection.MethodBase", "GetCurrentMethod") => "method_base_get_current_method",
            ("System.Object", "GetHashCode") => "runtime_get_hash_code",
            _ => return None,
        };

        Some(vec![Instruction::Call { target, function: symbol.into(), arguments: call.arguments.clone() }])
    }
}

pub struct StringFormatInterceptor;

impl Interceptor for StringFormatInterceptor {
    fn intercept(&self, call: &CallSite) -> Option<Vec<Instruction>> {
        if call.declaring_type != "System.String" || call.method_name != "Format" {
            return None;
        }
        Some(vec![Instruction::Call {
            target: call.target.clone(),
            function: "string_format".into(),
            arguments: call.arguments.clone(),
        }])
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
    fn object_get_type_routes_to_runtime_symbol() {
        let interceptor = ReflectionInterceptor;
        let instructions = interceptor.intercept(&call("System.Object", "GetType")).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "object_get_type"));
    }

    #[test]
    fn string_format_is_recognized_regardless_of_overload_arity() {
        let interceptor = StringFormatInterceptor;
        let mut site = call("System.String", "Format");
        site.arguments.push(Operand::StringLiteral("{0}".into()));
        site.arguments.push(Operand::Local("arg0".into()));
        let instructions = interceptor.intercept(&site).unwrap();
        assert!(matches!(&instructions[0], Instruction::Call { function, .. } if function == "string_format"));
    }

    #[test]
    fn unrelated_static_call_is_ignored() {
        let interceptor = ReflectionInterceptor;
        assert!(interceptor.intercept(&call("System.Console", "WriteLine")).is_none());
    }
}
