//! Dual-table lookup of managed method signatures to runtime C++ symbol
//! names (§4.2). Two categories — true internal calls (always active) and
//! managed shortcuts (elidable via `BuildOptions::prefer_managed_shortcuts`)
//! — each with three lookup tables: exact-arity, wildcard-by-name, and
//! typed-by-first-parameter.

use fxhash::FxHashMap;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum IcallCategory {
    /// Always active: no managed body exists to fall back to.
    TrueInternalCall,
    /// Skippable when the caller prefers to compile the managed body instead.
    ManagedShortcut,
}

#[derive(Debug, Clone)]
pub struct IcallEntry {
    pub symbol: String,
    pub category: IcallCategory,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct ExactKey {
    type_name: String,
    method_name: String,
    arity: usize,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct WildcardKey {
    type_name: String,
    method_name: String,
}

#[derive(Debug, Clone, Eq, PartialEq, Hash)]
struct TypedKey {
    type_name: String,
    method_name: String,
    first_parameter_type: String,
}

#[derive(Debug, Default)]
struct Tables {
    exact: FxHashMap<ExactKey, IcallEntry>,
    wildcard: FxHashMap<WildcardKey, IcallEntry>,
    typed: FxHashMap<TypedKey, IcallEntry>,
}

#[derive(Debug, Default)]
pub struct IcallRegistry {
    internal: Tables,
    shortcuts: Tables,
}

impl IcallRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_exact(&mut self, category: IcallCategory, type_name: &str, method_name: &str, arity: usize, symbol: &str) {
        let table = self.table_mut(category);
        table.exact.insert(
            ExactKey { type_name: type_name.into(), method_name: method_name.into(), arity },
            IcallEntry { symbol: symbol.into(), category },
        );
    }

    pub fn register_wildcard(&mut self, category: IcallCategory, type_name: &str, method_name: &str, symbol: &str) {
        let table = self.table_mut(category);
        table.wildcard.insert(
            WildcardKey { type_name: type_name.into(), method_name: method_name.into() },
            IcallEntry { symbol: symbol.into(), category },
        );
    }

    pub fn register_typed(&mut self, category: IcallCategory, type_name: &str, method_name: &str, first_parameter_type: &str, symbol: &str) {
        let table = self.table_mut(category);
        table.typed.insert(
            TypedKey { type_name: type_name.into(), method_name: method_name.into(), first_parameter_type: first_parameter_type.into() },
            IcallEntry { symbol: symbol.into(), category },
        );
    }

    fn table_mut(&mut self, category: IcallCategory) -> &mut Tables {
        match category {
            IcallCategory::TrueInternalCall => &mut self.internal,
            IcallCategory::ManagedShortcut => &mut self.shortcuts,
        }
    }

    /// `lookup(type, method, arity, first-parameter-type?, skip-managed?)`:
    /// consults typed → exact → wildcard, in that order, returning the
    /// first hit. When `skip_managed` is set, managed-shortcut entries are
    /// not consulted at all (the caller intends to compile the bytecode
    /// body instead).
    ///
    /// Special case: a generic reference-argument atomic compare-and-swap
    /// (`Interlocked.CompareExchange<T>` where `T` is not a value type)
    /// dispatches to the object-typed overload regardless of the literal
    /// type argument, since the runtime only has one CAS primitive for
    /// reference slots.
    pub fn lookup(&self, type_name: &str, method_name: &str, arity: usize, first_parameter_type: Option<&str>, skip_managed: bool, first_arg_is_value_type: bool) -> Option<&IcallEntry> {
        if type_name == "System.Threading.Interlocked" && method_name == "CompareExchange" && !first_arg_is_value_type {
            if let Some(entry) = self.lookup_in(&self.internal, type_name, method_name, arity, Some("System.Object")) {
                return Some(entry);
            }
        }

        if let Some(entry) = self.lookup_in(&self.internal, type_name, method_name, arity, first_parameter_type) {
            return Some(entry);
        }

        if !skip_managed {
            if let Some(entry) = self.lookup_in(&self.shortcuts, type_name, method_name, arity, first_parameter_type) {
                return Some(entry);
            }
        }

        None
    }

    fn lookup_in<'a>(&'a self, table: &'a Tables, type_name: &str, method_name: &str, arity: usize, first_parameter_type: Option<&str>) -> Option<&'a IcallEntry> {
        if let Some(first) = first_parameter_type {
            let key = TypedKey { type_name: type_name.into(), method_name: method_name.into(), first_parameter_type: first.into() };
            if let Some(entry) = table.typed.get(&key) {
                return Some(entry);
            }
        }

        let exact = ExactKey { type_name: type_name.into(), method_name: method_name.into(), arity };
        if let Some(entry) = table.exact.get(&exact) {
            return Some(entry);
        }

        let wildcard = WildcardKey { type_name: type_name.into(), method_name: method_name.into() };
        table.wildcard.get(&wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_beats_exact_beats_wildcard() {
        let mut registry = IcallRegistry::new();
        registry.register_wildcard(IcallCategory::TrueInternalCall, "App.Foo", "Bar", "wildcard_symbol");
        registry.register_exact(IcallCategory::TrueInternalCall, "App.Foo", "Bar", 1, "exact_symbol");
        registry.register_typed(IcallCategory::TrueInternalCall, "App.Foo", "Bar", "System.Int32", "typed_symbol");

        let hit = registry.lookup("App.Foo", "Bar", 1, Some("System.Int32"), false, false).unwrap();
        assert_eq!(hit.symbol, "typed_symbol");

        let hit = registry.lookup("App.Foo", "Bar", 1, Some("System.String"), false, false).unwrap();
        assert_eq!(hit.symbol, "exact_symbol");

        let hit = registry.lookup("App.Foo", "Bar", 2, Some("System.String"), false, false).unwrap();
        assert_eq!(hit.symbol, "wildcard_symbol");
    }

    #[test]
    fn managed_shortcuts_are_skippable() {
        let mut registry = IcallRegistry::new();
        registry.register_exact(IcallCategory::ManagedShortcut, "App.Foo", "Bar", 0, "shortcut_symbol");

        assert!(registry.lookup("App.Foo", "Bar", 0, None, false, false).is_some());
        assert!(registry.lookup("App.Foo", "Bar", 0, None, true, false).is_none());
    }

    #[test]
    fn atomic_cas_reference_argument_dispatches_to_object_overload() {
        let mut registry = IcallRegistry::new();
        registry.register_typed(IcallCategory::TrueInternalCall, "System.Threading.Interlocked", "CompareExchange", "System.Object", "Interlocked_CompareExchange_obj");
        registry.register_typed(IcallCategory::TrueInternalCall, "System.Threading.Interlocked", "CompareExchange", "System.Int32", "Interlocked_CompareExchange_i32");

        let hit = registry.lookup("System.Threading.Interlocked", "CompareExchange", 3, Some("App.MyClass"), false, false).unwrap();
        assert_eq!(hit.symbol, "Interlocked_CompareExchange_obj");

        let hit = registry.lookup("System.Threading.Interlocked", "CompareExchange", 3, Some("System.Int32"), false, true).unwrap();
        assert_eq!(hit.symbol, "Interlocked_CompareExchange_i32");
    }
}
