//! End-to-end coverage of the literal input-to-IR scenarios that the inline
//! unit tests in `translate.rs`/`records.rs` don't already exercise: virtual
//! dispatch through a vtable slot, a constrained call on a value-tuple,
//! Task await lowering to the continuation primitive, and LINQ `Any`. Each
//! test hand-encodes a short bytecode sequence and a `TokenResolver` test
//! double standing in for the metadata layer.

use clrcc::error::Diagnostics;
use clrcc::icall::IcallRegistry;
use clrcc::intercept::InterceptorChain;
use clrcc::ir::{Instruction, Operand};
use clrcc::raw::indices::metadata_token::MetadataToken;
use clrcc::translate::{BytecodeTranslator, ResolvedField, ResolvedMethod, TokenResolver};

/// Resolves a fixed set of `MethodDef`/`TypeSpec` token indices to
/// pre-scripted answers, keyed purely on `token.index()` (the token kind is
/// implied by which accessor is called).
#[derive(Default)]
struct ScriptedResolver {
    methods: Vec<(usize, ResolvedMethod)>,
    types: Vec<(usize, String)>,
}

impl TokenResolver for ScriptedResolver {
    fn resolve_method(&self, token: MetadataToken) -> Option<ResolvedMethod> {
        self.methods.iter().find(|(i, _)| *i == token.index()).map(|(_, m)| m.clone())
    }

    fn resolve_field(&self, _token: MetadataToken) -> Option<ResolvedField> {
        None
    }

    fn resolve_type(&self, token: MetadataToken) -> Option<String> {
        self.types.iter().find(|(i, _)| *i == token.index()).map(|(_, t)| t.clone())
    }

    fn resolve_string(&self, _token: MetadataToken) -> Option<String> {
        None
    }
}

fn method_def_token(index: u32) -> Vec<u8> {
    // MethodDef discriminant is 0x06; tokens are little-endian u32.
    (0x0600_0000u32 | index).to_le_bytes().to_vec()
}

fn type_spec_token(index: u32) -> Vec<u8> {
    (0x1b00_0000u32 | index).to_le_bytes().to_vec()
}

fn counter() -> impl FnMut() -> String {
    let mut n = 0u32;
    move || {
        let t = format!("__t{n}");
        n += 1;
        t
    }
}

fn non_virtual_method(name: &str, declaring_type: &str, params: usize, returns: bool) -> ResolvedMethod {
    ResolvedMethod {
        declaring_type_full_name: declaring_type.into(),
        declaring_type_mangled_name: declaring_type.replace('.', "_"),
        method_name: name.into(),
        mangled_name: format!("{}__{name}", declaring_type.replace('.', "_")),
        parameter_type_full_names: vec!["object".into(); params],
        return_type_full_name: returns.then(|| "object".into()),
        is_static: false,
        is_virtual: false,
        is_internal_call: false,
        vtable_slot: None,
        generic_arguments: Vec::new(),
    }
}

/// §8 scenario 2: an unconstrained `callvirt` on a user type overriding
/// `ToString` dispatches through vtable slot 0, receiver first.
#[test]
fn virtual_dispatch_on_object_goes_through_vtable_slot_zero() {
    let mut resolver = ScriptedResolver::default();
    resolver.methods.push((
        1,
        ResolvedMethod {
            declaring_type_full_name: "App.Widget".into(),
            declaring_type_mangled_name: "App_Widget".into(),
            method_name: "ToString".into(),
            mangled_name: "App_Widget__ToString".into(),
            parameter_type_full_names: Vec::new(),
            return_type_full_name: Some("System.String".into()),
            is_static: false,
            is_virtual: true,
            is_internal_call: false,
            vtable_slot: Some(0),
            generic_arguments: Vec::new(),
        },
    ));

    let mut code = vec![0x02]; // ldarg.0
    code.push(0x6F); // callvirt
    code.extend(method_def_token(1));

    let diagnostics = Diagnostics::new();
    let interceptors = InterceptorChain::new();
    let icalls = IcallRegistry::new();
    let translator = BytecodeTranslator::new("ToString", counter()).with_context(&resolver, &interceptors, &icalls, true);
    let block = translator.translate(&code, &[], &diagnostics);

    assert_eq!(block.instructions.len(), 1);
    match &block.instructions[0].instruction {
        Instruction::Call { target, function, arguments } => {
            assert_eq!(target.as_deref(), Some("__t0"));
            assert_eq!(function, "App_Widget->vtable[0]");
            assert_eq!(arguments, &[Operand::Argument("arg0".into())]);
        }
        other => panic!("unexpected instruction {other:?}"),
    }
}

/// §8 scenario 3: `ldloca.s 0; constrained. ValueTuple<int,string>; callvirt
/// object::ToString()` redirects to the value-tuple's own `ToString`
/// without ever touching a vtable slot or boxing the receiver.
#[test]
fn constrained_call_on_value_tuple_skips_vtable_and_boxing() {
    let mut resolver = ScriptedResolver::default();
    resolver.types.push((1, "System.ValueTuple`2<System.Int32,System.String>".into()));
    resolver.methods.push((2, non_virtual_method("ToString", "System.Object", 0, true)));
    // `ToString` is virtual on `System.Object`, but the constrained prefix
    // must win regardless — assert the resolver's `is_virtual` is also true
    // here so the test doesn't accidentally pass for the wrong reason.
    resolver.methods.last_mut().unwrap().1.is_virtual = true;
    resolver.methods.last_mut().unwrap().1.vtable_slot = Some(0);

    let mut code = vec![0x12, 0x00]; // ldloca.s 0
    code.push(0xFE);
    code.push(0x16); // constrained.
    code.extend(type_spec_token(1));
    code.push(0x6F); // callvirt
    code.extend(method_def_token(2));

    let diagnostics = Diagnostics::new();
    let interceptors = InterceptorChain::new();
    let icalls = IcallRegistry::new();
    let translator = BytecodeTranslator::new("Caller", counter()).with_context(&resolver, &interceptors, &icalls, true);
    let block = translator.translate(&code, &[], &diagnostics);

    assert_eq!(block.instructions.len(), 1);
    match &block.instructions[0].instruction {
        Instruction::Call { target, function, arguments } => {
            assert_eq!(target.as_deref(), Some("__t0"));
            assert_eq!(function, "value_tuple_to_string");
            assert_eq!(arguments, &[Operand::Local("loc_0".into())]);
        }
        other => panic!("unexpected instruction {other:?}, expected the intercepted value-tuple formatter, not a vtable call"),
    }
}

/// §8 scenario 4: a state machine's `AwaitUnsafeOnCompleted(ref awaiter, ref
/// this)` call routes to the continuation primitive rather than a managed
/// body (there isn't one to compile).
#[test]
fn task_await_unsafe_on_completed_routes_to_continuation_primitive() {
    let mut resolver = ScriptedResolver::default();
    resolver.methods.push((
        3,
        ResolvedMethod {
            declaring_type_full_name: "System.Runtime.CompilerServices.AsyncTaskMethodBuilder".into(),
            declaring_type_mangled_name: "System_Runtime_CompilerServices_AsyncTaskMethodBuilder".into(),
            method_name: "AwaitUnsafeOnCompleted".into(),
            mangled_name: "ignored".into(),
            parameter_type_full_names: vec!["TAwaiter".into(), "TStateMachine".into()],
            return_type_full_name: None,
            is_static: false,
            is_virtual: false,
            is_internal_call: false,
            vtable_slot: None,
            generic_arguments: Vec::new(),
        },
    ));

    let mut code = Vec::new();
    code.extend([0x12, 0x00]); // ldloca.s 0 -- builder
    code.extend([0x12, 0x01]); // ldloca.s 1 -- awaiter
    code.extend([0x12, 0x02]); // ldloca.s 2 -- state machine
    code.push(0x6F); // callvirt
    code.extend(method_def_token(3));

    let diagnostics = Diagnostics::new();
    let interceptors = InterceptorChain::new();
    let icalls = IcallRegistry::new();
    let translator = BytecodeTranslator::new("MoveNext", counter()).with_context(&resolver, &interceptors, &icalls, true);
    let block = translator.translate(&code, &[], &diagnostics);

    assert_eq!(block.instructions.len(), 1);
    match &block.instructions[0].instruction {
        Instruction::Call { target, function, arguments } => {
            assert_eq!(*target, None);
            assert_eq!(function, "task_add_continuation");
            assert_eq!(arguments, &[Operand::Local("loc_0".into()), Operand::Local("loc_1".into()), Operand::Local("loc_2".into())]);
        }
        other => panic!("unexpected instruction {other:?}"),
    }
}

/// §8 scenario 6: `array.Any(x => x > 2)` lowers to a single call against
/// the runtime's predicate-scanning primitive rather than a compiled
/// `IEnumerable` chain; the primitive itself is where the flat
/// read-one-element/invoke-delegate/break loop lives.
#[test]
fn linq_any_with_predicate_routes_to_the_predicate_scan_primitive() {
    let mut resolver = ScriptedResolver::default();
    resolver.methods.push((
        4,
        ResolvedMethod {
            declaring_type_full_name: "System.Linq.Enumerable".into(),
            declaring_type_mangled_name: "System_Linq_Enumerable".into(),
            method_name: "Any".into(),
            mangled_name: "ignored".into(),
            parameter_type_full_names: vec!["System.Int32[]".into(), "System.Func`2".into()],
            return_type_full_name: Some("System.Boolean".into()),
            is_static: true,
            is_virtual: false,
            is_internal_call: false,
            vtable_slot: None,
            generic_arguments: Vec::new(),
        },
    ));

    let mut code = vec![0x06, 0x07]; // ldloc.0 (array), ldloc.1 (predicate)
    code.push(0x28); // call
    code.extend(method_def_token(4));

    let diagnostics = Diagnostics::new();
    let interceptors = InterceptorChain::new();
    let icalls = IcallRegistry::new();
    let translator = BytecodeTranslator::new("Caller", counter()).with_context(&resolver, &interceptors, &icalls, true);
    let block = translator.translate(&code, &[], &diagnostics);

    assert_eq!(block.instructions.len(), 1);
    match &block.instructions[0].instruction {
        Instruction::Call { target, function, arguments } => {
            assert_eq!(target.as_deref(), Some("__t0"));
            assert_eq!(function, "enumerable_any_predicate");
            assert_eq!(arguments, &[Operand::Local("loc_0".into()), Operand::Local("loc_1".into())]);
        }
        other => panic!("unexpected instruction {other:?}"),
    }
}
