//! Deterministic mapping of managed names to C++ identifiers (§4.1). Purely
//! structural: no type-cache lookups, so mangling agrees with the emitter
//! even for types the driver hasn't created yet. The value-type registry is
//! the one piece of process-wide mutable state in the whole core (§5); it is
//! owned here, never shared across threads, and cleared at the start of
//! every build.

use std::collections::HashSet;

/// C++ keywords and runtime-namespace prefixes that would collide with a
/// literal mangled name; escaped by appending an underscore.
const RESERVED: &[&str] = &[
    "class", "struct", "union", "enum", "namespace", "template", "typename",
    "public", "private", "protected", "friend", "virtual", "explicit",
    "static", "const", "volatile", "mutable", "inline", "operator",
    "new", "delete", "this", "nullptr", "true", "false", "try", "catch",
    "throw", "return", "if", "else", "for", "while", "do", "switch", "case",
    "default", "break", "continue", "goto", "sizeof", "typeid", "using",
    "int", "float", "double", "char", "bool", "void", "short", "long",
    "signed", "unsigned", "auto", "register", "extern", "asm", "gc", "object",
];

const PRIMITIVES: &[(&str, &str)] = &[
    ("System.Void", "void"),
    ("System.Boolean", "bool"),
    ("System.Char", "char16_t"),
    ("System.SByte", "int8_t"),
    ("System.Byte", "uint8_t"),
    ("System.Int16", "int16_t"),
    ("System.UInt16", "uint16_t"),
    ("System.Int32", "int32_t"),
    ("System.UInt32", "uint32_t"),
    ("System.Int64", "int64_t"),
    ("System.UInt64", "uint64_t"),
    ("System.Single", "float"),
    ("System.Double", "double"),
    ("System.IntPtr", "intptr_t"),
    ("System.UIntPtr", "uintptr_t"),
];

/// The process-wide mutable state described in §5: whether a managed full
/// name denotes a value type. Consulted by [`NameMangler::get_cpp_type_for_declaration`]
/// to decide whether a `*` suffix is needed. Cleared at the start of every
/// build so no build sees the previous one's registrations.
#[derive(Debug, Default)]
pub struct NameMangler {
    value_types: HashSet<String>,
}

impl NameMangler {
    pub fn new() -> Self {
        let mut mangler = Self { value_types: HashSet::new() };
        for (name, _) in PRIMITIVES {
            if *name != "System.Void" {
                mangler.register_value_type(name);
            }
        }
        mangler
    }

    /// Clears the value-type registry. Called once at the start of every
    /// build; never shared across concurrent builds (there are none — the
    /// driver is single-threaded, §5).
    pub fn reset(&mut self) {
        self.value_types.clear();
        for (name, _) in PRIMITIVES {
            if *name != "System.Void" {
                self.register_value_type(name);
            }
        }
    }

    pub fn register_value_type(&mut self, managed_full_name: &str) {
        self.value_types.insert(managed_full_name.to_string());
    }

    pub fn is_value_type(&self, managed_full_name: &str) -> bool {
        self.value_types.contains(managed_full_name)
    }

    pub fn is_primitive(&self, managed_full_name: &str) -> bool {
        PRIMITIVES.iter().any(|(name, _)| *name == managed_full_name)
    }

    /// mangle-type-name: a fully-qualified managed name to a flat C++
    /// identifier. Dots, backticks (generic arity markers), plus signs
    /// (nested types) and array/ref suffixes all collapse to underscores.
    pub fn mangle_type_name(&self, managed_full_name: &str) -> String {
        let mut out = String::with_capacity(managed_full_name.len());
        for c in managed_full_name.chars() {
            match c {
                'a'..='z' | 'A'..='Z' | '0'..='9' | '_' => out.push(c),
                '.' | '+' | '`' | '/' => out.push('_'),
                '[' | ']' => out.push_str("_arr"),
                '&' => out.push_str("_ref"),
                '*' => out.push_str("_ptr"),
                ',' | ' ' | '<' | '>' => {}
                _ => out.push('_'),
            }
        }
        escape_reserved(out)
    }

    /// mangle-generic-instance: the open type's mangled name plus its
    /// argument names, each independently mangled and joined, matching the
    /// textual shape of the instantiation key (invariant 7) but as a valid
    /// identifier rather than a display string.
    pub fn mangle_generic_instance(&self, open_name: &str, argument_names: &[String]) -> String {
        let base = self.mangle_type_name(open_name);
        if argument_names.is_empty() {
            return base;
        }
        let args: Vec<String> = argument_names.iter().map(|a| self.mangle_type_name(a)).collect();
        format!("{base}_of_{}", args.join("_"))
    }

    pub fn mangle_method_name(&self, type_mangled: &str, method_name: &str) -> String {
        format!("{type_mangled}__{}", escape_reserved(sanitize_ident(method_name)))
    }

    pub fn mangle_field_name(&self, name: &str) -> String {
        escape_reserved(sanitize_ident(name))
    }

    /// get-cpp-type-for-declaration: the C++ token used wherever this
    /// managed type name appears in a declaration, adding a `*` suffix iff
    /// the name is not (yet) in the value-type registry.
    pub fn get_cpp_type_for_declaration(&self, managed_full_name: &str) -> String {
        if let Some((_, cpp)) = PRIMITIVES.iter().find(|(name, _)| *name == managed_full_name) {
            return cpp.to_string();
        }
        let mangled = self.mangle_type_name(managed_full_name);
        if self.is_value_type(managed_full_name) {
            mangled
        } else {
            format!("{mangled}*")
        }
    }

    /// get-default-value: the C++ literal used to zero-initialize a
    /// declaration of `cpp_type`.
    pub fn get_default_value(&self, cpp_type: &str) -> &'static str {
        match cpp_type {
            "bool" => "false",
            "float" => "0.0f",
            "double" => "0.0",
            t if t.ends_with('*') => "nullptr",
            _ => "{}",
        }
    }
}

fn sanitize_ident(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

fn escape_reserved(ident: String) -> String {
    if RESERVED.contains(&ident.as_str()) {
        format!("{ident}_")
    } else {
        ident
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_is_a_fixed_point_on_its_own_output() {
        let mangler = NameMangler::new();
        let once = mangler.mangle_type_name("System.Collections.Generic.List`1");
        let twice = mangler.mangle_type_name(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn primitives_are_not_pointer_suffixed() {
        let mangler = NameMangler::new();
        assert_eq!(mangler.get_cpp_type_for_declaration("System.Int32"), "int32_t");
    }

    #[test]
    fn reference_types_get_pointer_suffix() {
        let mut mangler = NameMangler::new();
        mangler.register_value_type("App.Point");
        assert_eq!(mangler.get_cpp_type_for_declaration("App.Foo"), "App_Foo*");
        assert_eq!(mangler.get_cpp_type_for_declaration("App.Point"), "App_Point");
    }

    #[test]
    fn reserved_identifiers_are_escaped() {
        let mangler = NameMangler::new();
        assert_eq!(mangler.mangle_method_name("App_Foo", "new"), "App_Foo__new_");
    }

    #[test]
    fn generic_instance_embeds_argument_names() {
        let mangler = NameMangler::new();
        let mangled = mangler.mangle_generic_instance("List`1", &["System.Int32".to_string()]);
        assert_eq!(mangled, "List_1_of_System_Int32");
    }

    #[test]
    fn reset_clears_registrations_but_keeps_primitives() {
        let mut mangler = NameMangler::new();
        mangler.register_value_type("App.Point");
        mangler.reset();
        assert!(!mangler.is_value_type("App.Point"));
        assert!(mangler.is_value_type("System.Int32"));
    }
}
