//! Monomorphization (§4.5). Three phases, each a full pass over the IR
//! built so far: scan concrete instantiations (pass 0), create or synthesize
//! the specialized types (pass 1.5), then resolve their base/interface
//! relationships once every specialization exists (pass 1.5 second sweep).
//!
//! Internal namespaces that cannot be usefully monomorphized are filtered
//! at scan time — reflection, globalization, diagnostics and similar
//! infrastructure types are consulted by name, never instantiated fresh by
//! user code in a way the core needs to specialize.

use fxhash::FxHashMap;

use crate::ir::Type;

/// Namespace prefixes filtered out of generic scanning; instantiations in
/// these namespaces are either intercepted wholesale (§4.4) or are runtime
/// infrastructure that never needs a monomorphized body.
const FILTERED_NAMESPACE_PREFIXES: &[&str] = &[
    "System.Reflection",
    "System.Diagnostics",
    "System.Globalization",
    "System.Resources",
    "System.Security",
    "System.IO",
    "System.Net",
    "System.Runtime.Intrinsics",
];

/// BCL families whose internal layout the core cannot resolve from
/// metadata alone; a synthetic fixed field set matching the runtime ABI
/// stands in for the real one instead of monomorphizing their bodies.
const OPAQUE_LAYOUT_FAMILIES: &[&str] = &[
    "System.Threading.Tasks.Task`1",
    "System.Threading.Tasks.ValueTask`1",
    "System.Span`1",
    "System.ReadOnlySpan`1",
    "System.Collections.Generic.List`1",
    "System.Collections.Generic.Dictionary`2",
    "System.Threading.CancellationToken",
    "System.Collections.Generic.IAsyncEnumerable`1",
    "System.Collections.Generic.IAsyncEnumerator`1",
];

fn is_filtered(open_full_name: &str) -> bool {
    FILTERED_NAMESPACE_PREFIXES.iter().any(|prefix| open_full_name.starts_with(prefix))
}

fn family_of(open_full_name: &str) -> Option<&'static str> {
    OPAQUE_LAYOUT_FAMILIES.iter().copied().find(|family| open_full_name.starts_with(family))
}

/// A single recorded generic-instance reference: the open type's full name
/// plus its concrete argument full names. Equivalent instantiations
/// (same open name, same argument sequence) collapse to one key via
/// [`Type::instantiation_key`].
#[derive(Debug, Clone, Eq, PartialEq, Hash)]
pub struct InstantiationRef {
    pub open_full_name: String,
    pub argument_full_names: Vec<String>,
}

/// The active substitution map during conversion of a specialized method's
/// body: generic parameter name (`T`, `T0`, …) to concrete argument full
/// name. Threaded explicitly through the translator rather than kept as
/// mutable context on the driver (§9's design note on "active mutable
/// context").
#[derive(Debug, Clone, Default)]
pub struct ActiveParameterMap {
    substitutions: FxHashMap<String, String>,
}

impl ActiveParameterMap {
    pub fn new(parameter_names: &[String], argument_full_names: &[String]) -> Self {
        let substitutions = parameter_names.iter().cloned().zip(argument_full_names.iter().cloned()).collect();
        Self { substitutions }
    }

    pub fn substitute(&self, type_name: &str) -> String {
        self.substitutions.get(type_name).cloned().unwrap_or_else(|| type_name.to_string())
    }

    /// Key construction for a type reference encountered inside a generic
    /// context: if the reference is to the enclosing open type itself
    /// (nested-generic self-reference), its own argument list is first run
    /// through this map before the instantiation key is built, so the
    /// nested reference resolves to the same closed specialization.
    pub fn resolve_nested_key(&self, open_full_name: &str, argument_full_names: &[String]) -> String {
        let substituted: Vec<String> = argument_full_names.iter().map(|a| self.substitute(a)).collect();
        Type::instantiation_key(open_full_name, &substituted)
    }
}

#[derive(Debug, Clone)]
pub enum SpecializationOrigin {
    /// The open type is resolvable; fields/methods were substituted through.
    Monomorphized,
    /// The open type's layout is opaque; a fixed ABI-matching field set was
    /// synthesized instead, and method bodies were not converted.
    SyntheticFixedLayout { family: &'static str },
}

#[derive(Debug, Clone)]
pub struct Specialization {
    pub key: String,
    pub origin: SpecializationOrigin,
}

/// Drives pass 0 and pass 1.5 of §4.6: scans for concrete instantiation
/// references, then (via the driver, which owns the arena) creates the
/// specialized types this engine has decided on.
#[derive(Debug, Default)]
pub struct GenericEngine {
    seen: FxHashMap<String, InstantiationRef>,
    specializations: FxHashMap<String, Specialization>,
}

impl GenericEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pass 0: records one instantiation reference. Returns `false` (the
    /// reference is dropped) when the namespace is filtered or any argument
    /// still names an unresolved generic parameter (a `T`/`T0`-shaped name
    /// the caller has not substituted, e.g. while scanning inside an open
    /// generic's own body).
    pub fn record_instantiation(&mut self, open_full_name: &str, argument_full_names: Vec<String>, is_unresolved_parameter: impl Fn(&str) -> bool) -> bool {
        if is_filtered(open_full_name) {
            return false;
        }
        if argument_full_names.iter().any(|a| is_unresolved_parameter(a)) {
            return false;
        }
        let key = Type::instantiation_key(open_full_name, &argument_full_names);
        self.seen.entry(key).or_insert_with(|| InstantiationRef { open_full_name: open_full_name.to_string(), argument_full_names });
        true
    }

    /// Pass 0 idempotence (§8): re-running the scan on the same inputs
    /// yields the same key set, since `record_instantiation` only ever
    /// inserts under `or_insert_with`.
    pub fn instantiation_keys(&self) -> Vec<&str> {
        self.seen.keys().map(String::as_str).collect()
    }

    pub fn instantiations(&self) -> impl Iterator<Item = &InstantiationRef> {
        self.seen.values()
    }

    /// Pass 1.5: classifies a recorded instantiation as either a real
    /// monomorphization target or a synthetic-fixed-layout one, and records
    /// the decision so pass 1.5's second sweep can look it up again without
    /// recomputing family membership.
    pub fn classify(&mut self, instantiation: &InstantiationRef) -> Specialization {
        let key = Type::instantiation_key(&instantiation.open_full_name, &instantiation.argument_full_names);
        let origin = match family_of(&instantiation.open_full_name) {
            Some(family) => SpecializationOrigin::SyntheticFixedLayout { family },
            None => SpecializationOrigin::Monomorphized,
        };
        let specialization = Specialization { key: key.clone(), origin };
        self.specializations.insert(key, specialization.clone());
        specialization
    }

    pub fn specialization(&self, key: &str) -> Option<&Specialization> {
        self.specializations.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filtered_namespace_is_dropped() {
        let mut engine = GenericEngine::new();
        let kept = engine.record_instantiation("System.Reflection.MemberInfo`1", vec!["System.Int32".into()], |_| false);
        assert!(!kept);
        assert!(engine.instantiation_keys().is_empty());
    }

    #[test]
    fn unresolved_parameter_argument_is_dropped() {
        let mut engine = GenericEngine::new();
        let kept = engine.record_instantiation("App.Box`1", vec!["T".into()], |a| a == "T");
        assert!(!kept);
    }

    #[test]
    fn repeated_scan_is_idempotent() {
        let mut engine = GenericEngine::new();
        engine.record_instantiation("App.Box`1", vec!["System.Int32".into()], |_| false);
        let first: Vec<String> = engine.instantiation_keys().into_iter().map(String::from).collect();
        engine.record_instantiation("App.Box`1", vec!["System.Int32".into()], |_| false);
        let second: Vec<String> = engine.instantiation_keys().into_iter().map(String::from).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn opaque_family_gets_synthetic_layout() {
        let mut engine = GenericEngine::new();
        let instantiation = InstantiationRef { open_full_name: "System.Collections.Generic.List`1".into(), argument_full_names: vec!["System.Int32".into()] };
        let specialization = engine.classify(&instantiation);
        assert!(matches!(specialization.origin, SpecializationOrigin::SyntheticFixedLayout { family: "System.Collections.Generic.List`1" }));
    }

    #[test]
    fn user_generic_is_monomorphized() {
        let mut engine = GenericEngine::new();
        let instantiation = InstantiationRef { open_full_name: "App.Box`1".into(), argument_full_names: vec!["System.Int32".into()] };
        let specialization = engine.classify(&instantiation);
        assert!(matches!(specialization.origin, SpecializationOrigin::Monomorphized));
    }

    #[test]
    fn nested_self_reference_substitutes_through_active_map() {
        let map = ActiveParameterMap::new(&["T".to_string()], &["System.Int32".to_string()]);
        let key = map.resolve_nested_key("App.Box`1", &["T".to_string()]);
        assert_eq!(key, "App.Box`1<System.Int32>");
    }
}
