//! IR data model (§3 of the spec): `Type`/`Field`/`Method`/`BasicBlock`/
//! `Instruction`, arena-allocated exactly the way `raw`'s metadata tables
//! are interned, with cross-references as plain `&'ir` references rather
//! than indices. Types and methods are created as empty shells in the
//! early driver passes and filled in later ones via `Cell`-guarded slots,
//! mirroring the two-phase `Cell<&'l [T]>` pattern the metadata-heap layer
//! already uses for its own deferred fills.

mod instruction;
mod module;

pub use instruction::*;
pub use module::Module;

use std::cell::{Cell, RefCell};
use std::fmt::{Debug, Formatter};

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct TypeFlags: u32 {
        const VALUE_TYPE = 1 << 0;
        const INTERFACE = 1 << 1;
        const ABSTRACT = 1 << 2;
        const SEALED = 1 << 3;
        const ENUM = 1 << 4;
        const DELEGATE = 1 << 5;
        const RECORD = 1 << 6;
        const HAS_CLASS_CONSTRUCTOR = 1 << 7;
        const GENERIC_INSTANCE = 1 << 8;
        const RUNTIME_PROVIDED = 1 << 9;
    }

    #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
    pub struct MethodFlags: u32 {
        const STATIC = 1 << 0;
        const VIRTUAL = 1 << 1;
        const ABSTRACT = 1 << 2;
        const CONSTRUCTOR = 1 << 3;
        const CLASS_CONSTRUCTOR = 1 << 4;
        const ENTRY_POINT = 1 << 5;
        const FINALIZER = 1 << 6;
        const OPERATOR = 1 << 7;
        const NEWSLOT = 1 << 8;
        const INTERNAL_CALL = 1 << 9;
        const GENERIC_INSTANCE = 1 << 10;
    }
}

/// A slot in a type's vtable: the slot name/parameter-types identity used
/// for override matching (invariant 2), plus the implementing method once
/// resolved (pass 4). `None` until an implementation is assigned or inherited.
#[derive(Debug, Clone)]
pub struct VtableSlot<'ir> {
    pub name: &'ir str,
    pub parameter_types: Vec<&'ir str>,
    pub method: Cell<Option<&'ir Method<'ir>>>,
}

/// Ordered, possibly-sparse list of method slots for a single interface
/// (invariant 4: length always equals the interface's method count).
#[derive(Debug, Clone)]
pub struct InterfaceImplMap<'ir> {
    pub interface: &'ir Type<'ir>,
    pub slots: Vec<Cell<Option<&'ir Method<'ir>>>>,
}

#[derive(Clone)]
pub struct Field<'ir> {
    pub name: &'ir str,
    pub mangled_name: String,
    /// Unresolved at creation time (pass 2), resolved once the referenced
    /// type exists (mirrors `raw`'s two-phase heap-ref pattern).
    pub field_type_name: &'ir str,
    pub field_type: Cell<Option<&'ir Type<'ir>>>,
    pub is_static: bool,
    pub visibility: Visibility,
    pub attribute_bits: u32,
    pub offset: Cell<i64>,
    pub constant_value: Option<ConstantValue>,
    pub owner: Cell<Option<&'ir Type<'ir>>>,
}

impl Debug for Field<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.name)
            .field("field_type_name", &self.field_type_name)
            .field("offset", &self.offset.get())
            .finish()
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Visibility {
    Private,
    FamilyAndAssembly,
    Assembly,
    Family,
    FamilyOrAssembly,
    Public,
}

#[derive(Debug, Clone)]
pub enum ConstantValue {
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    String(String),
    Null,
}

pub struct Method<'ir> {
    pub name: &'ir str,
    pub mangled_name: String,
    pub return_type_decl: String,
    pub return_type: Cell<Option<&'ir Type<'ir>>>,
    pub parameters: Vec<Parameter<'ir>>,
    pub locals: RefCell<Vec<Local<'ir>>>,
    pub basic_blocks: RefCell<Vec<BasicBlock<'ir>>>,
    pub flags: Cell<MethodFlags>,
    pub vtable_slot: Cell<i32>,
    pub overrides: RefCell<Vec<(&'ir str, &'ir str)>>,
    pub owner: Cell<Option<&'ir Type<'ir>>>,
    temp_counter: Cell<u32>,
}

impl Debug for Method<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.name)
            .field("mangled_name", &self.mangled_name)
            .field("flags", &self.flags.get())
            .field("vtable_slot", &self.vtable_slot.get())
            .finish()
    }
}

impl<'ir> Method<'ir> {
    pub fn new_shell(name: &'ir str, mangled_name: String, return_type_decl: String) -> Self {
        Self {
            name,
            mangled_name,
            return_type_decl,
            return_type: Cell::new(None),
            parameters: Vec::new(),
            locals: RefCell::new(Vec::new()),
            basic_blocks: RefCell::new(Vec::new()),
            flags: Cell::new(MethodFlags::empty()),
            vtable_slot: Cell::new(-1),
            overrides: RefCell::new(Vec::new()),
            owner: Cell::new(None),
            temp_counter: Cell::new(0),
        }
    }

    /// Names a fresh unique temporary per invariant 5 (`__t` prefix, monotonic
    /// counter scoped to this method).
    pub fn new_temp(&self) -> String {
        let n = self.temp_counter.get();
        self.temp_counter.set(n + 1);
        format!("__t{n}")
    }

    /// Matches a vtable slot or interface-map entry by name and parameter
    /// types, per invariant 2's override rule.
    pub fn matches_signature(&self, name: &str, parameter_types: &[&str]) -> bool {
        self.name == name
            && self.parameters.len() == parameter_types.len()
            && self.parameters.iter().zip(parameter_types).all(|(p, t)| p.type_name == *t)
    }
}

#[derive(Debug, Clone)]
pub struct Parameter<'ir> {
    pub name: &'ir str,
    pub type_name: &'ir str,
    pub resolved_type: Cell<Option<&'ir Type<'ir>>>,
}

#[derive(Debug, Clone)]
pub struct Local<'ir> {
    pub type_name: String,
    pub resolved_type: Cell<Option<&'ir Type<'ir>>>,
    pub pinned: bool,
}

pub struct Type<'ir> {
    pub managed_full_name: String,
    pub mangled_name: String,
    pub short_name: &'ir str,
    pub namespace: &'ir str,
    pub base_type: Cell<Option<&'ir Type<'ir>>>,
    pub interfaces: RefCell<Vec<&'ir Type<'ir>>>,
    pub instance_fields: RefCell<Vec<&'ir Field<'ir>>>,
    pub static_fields: RefCell<Vec<&'ir Field<'ir>>>,
    pub methods: RefCell<Vec<&'ir Method<'ir>>>,
    pub vtable: RefCell<Vec<VtableSlot<'ir>>>,
    pub interface_maps: RefCell<Vec<InterfaceImplMap<'ir>>>,
    pub instance_size: Cell<u32>,
    pub flags: Cell<TypeFlags>,
    pub generic_argument_names: Vec<String>,
}

impl Debug for Type<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Type")
            .field("managed_full_name", &self.managed_full_name)
            .field("mangled_name", &self.mangled_name)
            .field("flags", &self.flags.get())
            .field("instance_size", &self.instance_size.get())
            .finish()
    }
}

/// Reference-type header: type-info pointer + sync-block word + padding,
/// per invariant 3. Value types start their field layout at offset 0.
pub const OBJECT_HEADER_SIZE: u32 = 16;

impl<'ir> Type<'ir> {
    pub fn new_shell(managed_full_name: String, mangled_name: String, short_name: &'ir str, namespace: &'ir str) -> Self {
        Self {
            managed_full_name,
            mangled_name,
            short_name,
            namespace,
            base_type: Cell::new(None),
            interfaces: RefCell::new(Vec::new()),
            instance_fields: RefCell::new(Vec::new()),
            static_fields: RefCell::new(Vec::new()),
            methods: RefCell::new(Vec::new()),
            vtable: RefCell::new(Vec::new()),
            interface_maps: RefCell::new(Vec::new()),
            instance_size: Cell::new(0),
            flags: Cell::new(TypeFlags::empty()),
            generic_argument_names: Vec::new(),
        }
    }

    pub fn is_value_type(&self) -> bool {
        self.flags.get().contains(TypeFlags::VALUE_TYPE)
    }

    /// Assigns field offsets in declaration order per invariant 3: alignment
    /// is `min(field_size, 8)`, total size rounds up to 8, and reference
    /// types reserve [`OBJECT_HEADER_SIZE`] bytes before the first field.
    pub fn layout_fields(&self, field_sizes: impl Fn(&Field<'ir>) -> u32) {
        let mut offset = if self.is_value_type() { 0 } else { OBJECT_HEADER_SIZE };
        for field in self.instance_fields.borrow().iter() {
            let size = field_sizes(field);
            let align = size.min(8).max(1);
            offset = round_up(offset, align);
            field.offset.set(offset as i64);
            offset += size;
        }
        self.instance_size.set(round_up(offset, 8));
    }

    /// Generic-instantiation key per invariant 7: the open type's full name
    /// with angle-bracketed, comma-separated argument full names. Equal
    /// keys collapse to the same specialization.
    pub fn instantiation_key(open_full_name: &str, argument_full_names: &[String]) -> String {
        if argument_full_names.is_empty() {
            return open_full_name.to_string();
        }
        format!("{open_full_name}<{}>", argument_full_names.join(","))
    }
}

fn round_up(value: u32, multiple: u32) -> u32 {
    if multiple == 0 {
        return value;
    }
    value.div_ceil(multiple) * multiple
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_key_collapses_equal_args() {
        let a = Type::instantiation_key("List`1", &["Int32".to_string()]);
        let b = Type::instantiation_key("List`1", &["Int32".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a, "List`1<Int32>");
    }

    #[test]
    fn field_layout_rounds_up_and_reserves_header() {
        let bump = bumpalo::Bump::new();
        let ty = Type::new_shell("App.Point".into(), "App_Point".into(), "Point", "App");
        ty.flags.set(TypeFlags::empty());

        let f1 = bump.alloc(Field {
            name: "x",
            mangled_name: "x".into(),
            field_type_name: "Int32",
            field_type: Cell::new(None),
            is_static: false,
            visibility: Visibility::Public,
            attribute_bits: 0,
            offset: Cell::new(0),
            constant_value: None,
            owner: Cell::new(None),
        });
        ty.instance_fields.borrow_mut().push(f1);

        ty.layout_fields(|_| 4);
        assert_eq!(f1.offset.get(), OBJECT_HEADER_SIZE as i64);
        assert_eq!(ty.instance_size.get(), 24);
    }

    #[test]
    fn value_type_layout_starts_at_zero() {
        let bump = bumpalo::Bump::new();
        let ty = Type::new_shell("App.Point".into(), "App_Point".into(), "Point", "App");
        ty.flags.set(TypeFlags::VALUE_TYPE);

        let f1 = bump.alloc(Field {
            name: "x",
            mangled_name: "x".into(),
            field_type_name: "Int32",
            field_type: Cell::new(None),
            is_static: false,
            visibility: Visibility::Public,
            attribute_bits: 0,
            offset: Cell::new(0),
            constant_value: None,
            owner: Cell::new(None),
        });
        ty.instance_fields.borrow_mut().push(f1);

        ty.layout_fields(|_| 4);
        assert_eq!(f1.offset.get(), 0);
        assert_eq!(ty.instance_size.get(), 8);
    }
}
